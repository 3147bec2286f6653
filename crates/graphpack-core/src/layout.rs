// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Size accounting for one encoded record (pass 1).
//!
//! [`BlockLayout::measure`] computes every size field of a record without
//! allocating output storage. Emission ([`crate::encode::emit`]) treats the
//! layout as the single source of truth and fails if it ever writes a
//! different number of bytes.
//!
//! # Record layout
//!
//! All integers and floats are little-endian; nothing is padded or aligned.
//!
//! ```text
//! block_bytes       i32   bytes that follow this field
//! node_info_bytes   i32
//! ── node section (node_info_bytes) ─────────────────────────────
//! node_id i64 | node_type i32 | node_weight f32 | edge_type_count i32
//! neighbor_count[edge_type_count]       i32
//! neighbor_weight_sum[edge_type_count]  f32
//! neighbor_id[Σ]                        i64
//! neighbor_weight[Σ]                    f32
//! uint64 block | float block | binary block
//! ── edges ───────────────────────────────────────────────────────
//! edge_count        i32
//! edge_info_bytes[edge_count]           i32
//! edge[edge_count]: src i64 | dst i64 | type i32 | weight f32
//!                   uint64 block | float block | binary block
//! ```
//!
//! A feature block is `id_count i32`, then one `i32` length per id, then the
//! flattened values (8 bytes per uint64, 4 per float, 1 per binary byte).

use std::collections::BTreeMap;

use crate::encode::EncodeError;
use crate::record::{declared_entries, FeatureId, FeatureMaps, NodeRecord};
use crate::schema::{FeatureCounts, Schema};

/// Node id, type, weight and the edge-type count field.
pub const NODE_HEADER_BYTES: u64 = 8 + 4 + 4 + 4;
/// Source id, destination id, type and weight.
pub const EDGE_HEADER_BYTES: u64 = 8 + 8 + 4 + 4;

/// Width of every size, count and length field.
const LEN_FIELD: u64 = 4;

/// Size of one feature-kind block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureBlockSize {
    /// Declared feature ids (one length field each).
    pub id_count: u32,
    /// Values across declared ids (elements, or bytes for binary features).
    pub value_count: u64,
    /// Bytes of the whole block including the id-count field.
    pub bytes: u64,
}

impl FeatureBlockSize {
    fn measure<T>(map: &BTreeMap<FeatureId, Vec<T>>, declared: u32, value_width: u64) -> Self {
        let value_count: u64 = declared_entries(map, declared)
            .map(|(_, values)| values.len() as u64)
            .sum();
        Self {
            id_count: declared,
            value_count,
            bytes: LEN_FIELD + LEN_FIELD * u64::from(declared) + value_width * value_count,
        }
    }
}

/// The three feature blocks of a node or an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureLayout {
    /// Integer feature block.
    pub uint64: FeatureBlockSize,
    /// Float feature block.
    pub float: FeatureBlockSize,
    /// Binary feature block.
    pub binary: FeatureBlockSize,
}

impl FeatureLayout {
    fn measure(features: FeatureMaps<'_>, counts: FeatureCounts) -> Self {
        Self {
            uint64: FeatureBlockSize::measure(features.uint64, counts.uint64, 8),
            float: FeatureBlockSize::measure(features.float, counts.float, 4),
            binary: FeatureBlockSize::measure(features.binary, counts.binary, 1),
        }
    }

    /// Bytes of all three blocks.
    pub fn bytes(&self) -> u64 {
        self.uint64.bytes + self.float.bytes + self.binary.bytes
    }
}

/// Every size field of one record, computed before any byte is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLayout {
    /// Schema the sizes were computed under.
    pub schema: Schema,
    /// Neighbors across declared groups.
    pub neighbor_count: u64,
    /// Node feature blocks.
    pub node_features: FeatureLayout,
    /// Value of the `node_info_bytes` field.
    pub node_info_bytes: i32,
    /// Value of each `edge_info_bytes[i]` field, in edge order.
    pub edge_info_bytes: Vec<i32>,
    /// Sum of `edge_info_bytes`.
    pub total_edge_info_bytes: i32,
    /// Value of the leading `block_bytes` field.
    pub block_bytes: i32,
}

impl BlockLayout {
    /// Pass 1: computes the layout of `record` under `schema`.
    ///
    /// Feature ids and neighbor groups beyond the schema counts are not
    /// counted, matching what emission writes.
    pub fn measure(schema: &Schema, record: &NodeRecord) -> Result<Self, EncodeError> {
        let groups = u64::from(schema.edge_type_count);
        let neighbor_count = record.neighbor_count(schema.edge_type_count) as u64;
        let node_features = FeatureLayout::measure(record.features(), schema.node_features);

        let node_info = NODE_HEADER_BYTES
            + LEN_FIELD * groups * 2
            + (8 + 4) * neighbor_count
            + node_features.bytes();
        let node_info_bytes = to_field("node_info_bytes", node_info)?;

        let mut edge_info_bytes = Vec::with_capacity(record.edges.len());
        let mut total_edges = 0u64;
        for edge in &record.edges {
            let bytes = EDGE_HEADER_BYTES
                + FeatureLayout::measure(edge.features(), schema.edge_features).bytes();
            edge_info_bytes.push(to_field("edge_info_bytes", bytes)?);
            total_edges += bytes;
        }
        let total_edge_info_bytes = to_field("total_edge_info_bytes", total_edges)?;

        let edge_count = record.edges.len() as u64;
        let block = LEN_FIELD + LEN_FIELD + LEN_FIELD * edge_count + node_info + total_edges;
        let block_bytes = to_field("block_bytes", block)?;

        Ok(Self {
            schema: *schema,
            neighbor_count,
            node_features,
            node_info_bytes,
            edge_info_bytes,
            total_edge_info_bytes,
            block_bytes,
        })
    }

    /// Bytes of the full record, including the `block_bytes` field itself.
    #[allow(clippy::cast_sign_loss)] // measure() only produces non-negative sizes
    pub fn encoded_len(&self) -> usize {
        LEN_FIELD as usize + self.block_bytes as usize
    }

    /// Number of edges described by this layout.
    pub fn edge_count(&self) -> usize {
        self.edge_info_bytes.len()
    }
}

fn to_field(section: &'static str, bytes: u64) -> Result<i32, EncodeError> {
    i32::try_from(bytes).map_err(|_| EncodeError::BlockTooLarge { section, bytes })
}
