// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory shape of one graph block: a node, its neighbor groups, its
//! features and its outgoing edges.
//!
//! The serde field names match the JSON keys of the input blocks. Every map is a
//! `BTreeMap`, so neighbors inside a group are emitted in ascending id order and
//! identical input always produces identical bytes.
//!
//! Feature ids and neighbor-group keys are kept as [`FeatureId`] (`i64`), so a
//! block with a negative or oversized key still decodes; the encoder only looks
//! at keys in `0..count` and drops the rest.

use std::collections::btree_map::Range;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::FeatureCounts;

/// Key of a feature slot or a neighbor group.
pub type FeatureId = i64;

/// Neighbor weights keyed by neighbor node id.
pub type NeighborGroup = BTreeMap<i64, f32>;

/// Entries whose key lies in the declared range `0..count`, in key order.
pub fn declared_entries<V>(map: &BTreeMap<FeatureId, V>, count: u32) -> Range<'_, FeatureId, V> {
    map.range(0..FeatureId::from(count))
}

/// Number of keys outside `0..count`.
pub fn undeclared_keys<V>(map: &BTreeMap<FeatureId, V>, count: u32) -> usize {
    map.len() - declared_entries(map, count).count()
}

/// One decoded graph block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeRecord {
    /// Node identifier; also selects the output partition.
    pub node_id: i64,
    /// Node type.
    pub node_type: i32,
    /// Node weight.
    pub node_weight: f32,
    /// Neighbor groups keyed by edge-group type.
    #[serde(rename = "neighbor")]
    pub neighbors: BTreeMap<FeatureId, NeighborGroup>,
    /// Integer feature sequences keyed by feature id.
    #[serde(rename = "uint64_feature")]
    pub uint64_features: BTreeMap<FeatureId, Vec<i64>>,
    /// Float feature sequences keyed by feature id.
    #[serde(rename = "float_feature")]
    pub float_features: BTreeMap<FeatureId, Vec<f32>>,
    /// Raw byte features keyed by feature id.
    #[serde(rename = "binary_feature", with = "binary_strings")]
    pub binary_features: BTreeMap<FeatureId, Vec<u8>>,
    /// Outgoing edges in emission order.
    #[serde(rename = "edge")]
    pub edges: Vec<EdgeRecord>,
}

/// One outgoing edge of a [`NodeRecord`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeRecord {
    /// Source node id.
    pub src_id: i64,
    /// Destination node id.
    pub dst_id: i64,
    /// Edge type.
    pub edge_type: i32,
    /// Edge weight.
    pub weight: f32,
    /// Integer feature sequences keyed by feature id.
    #[serde(rename = "uint64_feature")]
    pub uint64_features: BTreeMap<FeatureId, Vec<i64>>,
    /// Float feature sequences keyed by feature id.
    #[serde(rename = "float_feature")]
    pub float_features: BTreeMap<FeatureId, Vec<f32>>,
    /// Raw byte features keyed by feature id.
    #[serde(rename = "binary_feature", with = "binary_strings")]
    pub binary_features: BTreeMap<FeatureId, Vec<u8>>,
}

/// Borrowed view of the three feature maps shared by nodes and edges.
#[derive(Debug, Clone, Copy)]
pub struct FeatureMaps<'a> {
    /// Integer features.
    pub uint64: &'a BTreeMap<FeatureId, Vec<i64>>,
    /// Float features.
    pub float: &'a BTreeMap<FeatureId, Vec<f32>>,
    /// Byte features.
    pub binary: &'a BTreeMap<FeatureId, Vec<u8>>,
}

impl FeatureMaps<'_> {
    /// Counts feature ids outside the declared slot ranges (negative, or at or
    /// beyond the count).
    ///
    /// Such ids are dropped by the encoder.
    pub fn undeclared_ids(&self, counts: FeatureCounts) -> usize {
        undeclared_keys(self.uint64, counts.uint64)
            + undeclared_keys(self.float, counts.float)
            + undeclared_keys(self.binary, counts.binary)
    }
}

impl NodeRecord {
    /// Decodes one block of JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The node's feature maps.
    pub fn features(&self) -> FeatureMaps<'_> {
        FeatureMaps {
            uint64: &self.uint64_features,
            float: &self.float_features,
            binary: &self.binary_features,
        }
    }

    /// Total neighbors across groups `0..edge_type_count`.
    pub fn neighbor_count(&self, edge_type_count: u32) -> usize {
        declared_entries(&self.neighbors, edge_type_count)
            .map(|(_, group)| group.len())
            .sum()
    }

    /// Neighbor groups outside `0..edge_type_count`; the encoder drops them.
    pub fn undeclared_groups(&self, edge_type_count: u32) -> usize {
        undeclared_keys(&self.neighbors, edge_type_count)
    }
}

impl EdgeRecord {
    /// The edge's feature maps.
    pub fn features(&self) -> FeatureMaps<'_> {
        FeatureMaps {
            uint64: &self.uint64_features,
            float: &self.float_features,
            binary: &self.binary_features,
        }
    }
}

/// Binary features travel as JSON strings; in memory they are their UTF-8 bytes.
mod binary_strings {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::FeatureId;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<FeatureId, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            map.iter()
                .map(|(id, bytes)| (id, String::from_utf8_lossy(bytes))),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<FeatureId, Vec<u8>>, D::Error> {
        let strings = BTreeMap::<FeatureId, String>::deserialize(deserializer)?;
        Ok(strings
            .into_iter()
            .map(|(id, s)| (id, s.into_bytes()))
            .collect())
    }
}
