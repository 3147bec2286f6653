// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Partition selection and fan-out to sinks.

use thiserror::Error;

use crate::sink::{BlockSink, SinkError};

/// Routing failures.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Routing was attempted with zero partitions.
    #[error("partition count must be at least 1")]
    NoPartitions,

    /// A computed index has no sink behind it.
    #[error("partition index {index} is out of range for {partitions} partitions")]
    InvalidPartitionIndex {
        /// Computed index.
        index: usize,
        /// Configured partition count.
        partitions: usize,
    },

    /// The partition's sink failed.
    #[error("partition {partition} sink failed: {source}")]
    SinkUnavailable {
        /// Partition index.
        partition: usize,
        /// Sink error.
        source: SinkError,
    },
}

/// Maps a node id to its partition: the non-negative remainder of
/// `node_id / partition_count`.
///
/// Negative ids wrap into range, so `-1` goes to the last partition.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // 0 <= index < partition_count
pub fn partition_for(node_id: i64, partition_count: usize) -> Result<usize, RouteError> {
    if partition_count == 0 {
        return Err(RouteError::NoPartitions);
    }
    let index = i128::from(node_id).rem_euclid(partition_count as i128);
    Ok(index as usize)
}

/// Owns one sink per partition and appends each record to the sink its node
/// id selects.
#[derive(Debug)]
pub struct Router<S> {
    sinks: Vec<S>,
}

impl<S: BlockSink> Router<S> {
    /// Builds a router over `sinks`; partition `i` is `sinks[i]`.
    pub fn new(sinks: Vec<S>) -> Result<Self, RouteError> {
        if sinks.is_empty() {
            return Err(RouteError::NoPartitions);
        }
        Ok(Self { sinks })
    }

    /// Number of partitions.
    pub fn partition_count(&self) -> usize {
        self.sinks.len()
    }

    /// Sinks in partition order.
    pub fn sinks(&self) -> &[S] {
        &self.sinks
    }

    /// Appends `bytes` to the partition selected by `node_id`, then flushes it.
    ///
    /// Returns the partition index.
    pub fn route(&mut self, node_id: i64, bytes: &[u8]) -> Result<usize, RouteError> {
        let partitions = self.sinks.len();
        let index = partition_for(node_id, partitions)?;
        let sink = self
            .sinks
            .get_mut(index)
            .ok_or(RouteError::InvalidPartitionIndex { index, partitions })?;
        let unavailable = |source| RouteError::SinkUnavailable {
            partition: index,
            source,
        };
        sink.append(bytes).map_err(unavailable)?;
        sink.flush().map_err(unavailable)?;
        Ok(index)
    }

    /// Finishes every sink, stopping at the first failure.
    pub fn finish_all(&mut self) -> Result<(), RouteError> {
        for (partition, sink) in self.sinks.iter_mut().enumerate() {
            sink.finish()
                .map_err(|source| RouteError::SinkUnavailable { partition, source })?;
        }
        Ok(())
    }

    /// Releases the sinks.
    pub fn into_sinks(self) -> Vec<S> {
        self.sinks
    }
}
