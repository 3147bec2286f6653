// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use thiserror::Error;

use crate::encode::EncodeError;
use crate::extract::ExtractError;
use crate::route::RouteError;
use crate::schema::SchemaError;

/// Any failure that aborts a conversion run.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The schema could not be loaded.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The data stream could not be scanned.
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// A block's text is not a valid record.
    #[error("block {block} is not a valid record: {source}")]
    DecodeFailure {
        /// Zero-based ordinal of the block.
        block: u64,
        /// JSON error.
        source: serde_json::Error,
    },

    /// A record could not be encoded.
    #[error("cannot encode node {node_id}: {source}")]
    Encode {
        /// Node being encoded.
        node_id: i64,
        /// Encoder error.
        source: EncodeError,
    },

    /// A record could not be delivered to its partition.
    #[error(transparent)]
    Route(#[from] RouteError),
}
