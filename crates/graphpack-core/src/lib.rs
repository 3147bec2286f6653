// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! graphpack-core: converts JSON graph blocks into partitioned binary records.
//!
//! The pipeline is strictly sequential:
//!
//! ```text
//! lines ──▶ BlockExtractor ──▶ serde_json ──▶ NodeRecord
//!                                               │
//!                 Schema (Arc) ──▶ BlockLayout::measure ──▶ emit ──▶ Router ──▶ BlockSink[p]
//! ```
//!
//! # Writing
//!
//! ```rust
//! use std::sync::Arc;
//! use graphpack_core::{encode, NodeRecord, Schema};
//!
//! # fn main() -> Result<(), graphpack_core::EncodeError> {
//! let schema = Arc::new(Schema::default());
//! let record = NodeRecord { node_id: 5, ..NodeRecord::default() };
//! let bytes = encode(&schema, &record)?;
//! assert_eq!(bytes.len(), 4 + 40);
//! # Ok(())
//! # }
//! ```
//!
//! # Reading
//!
//! Partition files are a plain concatenation of records. [`BlockScanner`] walks
//! them one length prefix at a time and [`decode_block`] turns each frame back
//! into a [`NodeRecord`] under the same [`Schema`].
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

pub mod encode;
mod error;
pub mod extract;
pub mod layout;
pub mod pipeline;
pub mod read;
pub mod record;
pub mod route;
pub mod scan;
pub mod schema;
pub mod sink;

pub use encode::{emit, encode, EncodeError};
pub use error::ConvertError;
pub use extract::{BlockExtractor, ExtractError, ScanMode};
pub use layout::{BlockLayout, FeatureBlockSize};
pub use pipeline::{ConvertStats, Converter, PartitionStats};
pub use read::{decode_block, ReadError};
pub use record::{EdgeRecord, FeatureId, FeatureMaps, NeighborGroup, NodeRecord};
pub use route::{partition_for, RouteError, Router};
pub use scan::BlockScanner;
pub use schema::{FeatureCounts, Schema, SchemaError};
pub use sink::{BlockSink, LocalFileSink, MemorySink, SinkError};
