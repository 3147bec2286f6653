// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Feature-slot counts that fix the binary layout of every record in a run.
//!
//! The schema arrives as a single JSON object (the "meta" document) with flat
//! `*_num` keys. It is loaded once, wrapped in an `Arc`, and handed explicitly
//! to the encoder and reader for every record.

use std::io::BufRead;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::{BlockExtractor, ExtractError, ScanMode};

/// Errors that can occur while loading a [`Schema`].
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The meta input contained no `{...}` object.
    #[error("meta input contains no schema object")]
    Missing,

    /// The meta input could not be scanned.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The schema object was not valid (bad JSON, negative or oversized counts).
    #[error("invalid schema document: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Number of feature ids declared for each feature kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureCounts {
    /// Slots holding sequences of 64-bit integers.
    pub uint64: u32,
    /// Slots holding sequences of 32-bit floats.
    pub float: u32,
    /// Slots holding raw byte strings.
    pub binary: u32,
}

impl FeatureCounts {
    /// Creates a count triple.
    pub const fn new(uint64: u32, float: u32, binary: u32) -> Self {
        Self {
            uint64,
            float,
            binary,
        }
    }
}

/// Immutable layout parameters for one conversion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Schema {
    /// Number of node types. Informational only; never written to records.
    pub node_type_count: u32,
    /// Number of edge groups a node's neighbors are partitioned into.
    pub edge_type_count: u32,
    /// Feature slots declared for nodes.
    pub node_features: FeatureCounts,
    /// Feature slots declared for edges.
    pub edge_features: FeatureCounts,
}

/// Wire shape of the meta document.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct MetaDocument {
    node_type_num: u32,
    edge_type_num: u32,
    node_uint64_feature_num: u32,
    node_float_feature_num: u32,
    node_binary_feature_num: u32,
    edge_uint64_feature_num: u32,
    edge_float_feature_num: u32,
    edge_binary_feature_num: u32,
}

impl From<MetaDocument> for Schema {
    fn from(doc: MetaDocument) -> Self {
        Self {
            node_type_count: doc.node_type_num,
            edge_type_count: doc.edge_type_num,
            node_features: FeatureCounts::new(
                doc.node_uint64_feature_num,
                doc.node_float_feature_num,
                doc.node_binary_feature_num,
            ),
            edge_features: FeatureCounts::new(
                doc.edge_uint64_feature_num,
                doc.edge_float_feature_num,
                doc.edge_binary_feature_num,
            ),
        }
    }
}

impl From<&Schema> for MetaDocument {
    fn from(schema: &Schema) -> Self {
        Self {
            node_type_num: schema.node_type_count,
            edge_type_num: schema.edge_type_count,
            node_uint64_feature_num: schema.node_features.uint64,
            node_float_feature_num: schema.node_features.float,
            node_binary_feature_num: schema.node_features.binary,
            edge_uint64_feature_num: schema.edge_features.uint64,
            edge_float_feature_num: schema.edge_features.float,
            edge_binary_feature_num: schema.edge_features.binary,
        }
    }
}

impl Schema {
    /// Parses a schema from the text of one meta object.
    ///
    /// Missing keys default to zero.
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let doc: MetaDocument = serde_json::from_str(text)?;
        Ok(doc.into())
    }

    /// Renders the schema as a meta object using the same keys it is read from.
    pub fn to_json(&self) -> Result<String, SchemaError> {
        Ok(serde_json::to_string(&MetaDocument::from(self))?)
    }

    /// Extracts the first `{...}` object from `reader` and parses it.
    ///
    /// Anything after the first object is ignored.
    pub fn load<R: BufRead>(reader: R, mode: ScanMode) -> Result<Self, SchemaError> {
        let mut extractor = BlockExtractor::new(reader).with_mode(mode);
        let text = extractor.next_block()?.ok_or(SchemaError::Missing)?;
        Self::from_json(&text)
    }
}
