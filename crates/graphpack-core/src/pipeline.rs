// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The conversion driver: extract, decode, encode, route, repeat.
//!
//! Runs are strictly sequential and stop at the first error. Bytes already
//! flushed to a sink stay there.

use std::io::BufRead;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::encode::emit;
use crate::error::ConvertError;
use crate::extract::BlockExtractor;
use crate::layout::BlockLayout;
use crate::record::NodeRecord;
use crate::route::Router;
use crate::schema::Schema;
use crate::sink::BlockSink;

/// Records and bytes delivered to one partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionStats {
    /// Records routed here.
    pub records: u64,
    /// Bytes routed here.
    pub bytes: u64,
}

/// Totals for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertStats {
    /// Blocks converted.
    pub blocks: u64,
    /// Edges across all blocks.
    pub edges: u64,
    /// Encoded bytes across all partitions.
    pub bytes: u64,
    /// Feature ids dropped because they were not declared by the schema.
    pub ignored_feature_ids: u64,
    /// Neighbor groups dropped because they lie outside `0..edge_type_count`.
    pub ignored_neighbor_groups: u64,
    /// Per-partition totals, indexed by partition.
    pub partitions: Vec<PartitionStats>,
}

/// Drives one conversion from a block stream into partition sinks.
pub struct Converter<R, S> {
    schema: Arc<Schema>,
    extractor: BlockExtractor<R>,
    router: Router<S>,
}

impl<R: BufRead, S: BlockSink> Converter<R, S> {
    /// Assembles a converter.
    pub fn new(schema: Arc<Schema>, extractor: BlockExtractor<R>, router: Router<S>) -> Self {
        Self {
            schema,
            extractor,
            router,
        }
    }

    /// Converts every remaining block, then finishes all sinks.
    pub fn run(&mut self) -> Result<ConvertStats, ConvertError> {
        let mut stats = ConvertStats {
            partitions: vec![PartitionStats::default(); self.router.partition_count()],
            ..ConvertStats::default()
        };
        info!(
            partitions = self.router.partition_count(),
            edge_types = self.schema.edge_type_count,
            "conversion started"
        );

        while let Some(text) = self.extractor.next_block()? {
            let block = self.extractor.blocks_read() - 1;
            let record = NodeRecord::from_json(&text)
                .map_err(|source| ConvertError::DecodeFailure { block, source })?;
            self.convert_record(block, &record, &mut stats)?;
        }

        self.router.finish_all()?;
        info!(
            blocks = stats.blocks,
            edges = stats.edges,
            bytes = stats.bytes,
            "conversion finished"
        );
        Ok(stats)
    }

    fn convert_record(
        &mut self,
        block: u64,
        record: &NodeRecord,
        stats: &mut ConvertStats,
    ) -> Result<(), ConvertError> {
        let encode_error = |source| ConvertError::Encode {
            node_id: record.node_id,
            source,
        };
        let layout = BlockLayout::measure(&self.schema, record).map_err(encode_error)?;
        let bytes = emit(&self.schema, record, &layout).map_err(encode_error)?;

        let ignored = record.features().undeclared_ids(self.schema.node_features)
            + record
                .edges
                .iter()
                .map(|edge| edge.features().undeclared_ids(self.schema.edge_features))
                .sum::<usize>();
        if ignored > 0 {
            warn!(
                block,
                node_id = record.node_id,
                ignored,
                "feature ids outside the schema counts were dropped"
            );
        }
        let ignored_groups = record.undeclared_groups(self.schema.edge_type_count);
        if ignored_groups > 0 {
            warn!(
                block,
                node_id = record.node_id,
                ignored = ignored_groups,
                "neighbor groups outside the edge type count were dropped"
            );
        }

        let partition = self.router.route(record.node_id, &bytes)?;
        debug!(
            block,
            node_id = record.node_id,
            partition,
            bytes = bytes.len(),
            edges = layout.edge_count(),
            "block routed"
        );

        let len = bytes.len() as u64;
        stats.blocks += 1;
        stats.edges += record.edges.len() as u64;
        stats.bytes += len;
        stats.ignored_feature_ids += ignored as u64;
        stats.ignored_neighbor_groups += ignored_groups as u64;
        if let Some(part) = stats.partitions.get_mut(partition) {
            part.records += 1;
            part.bytes += len;
        }
        Ok(())
    }

    /// Blocks pulled from the extractor so far.
    pub fn blocks_read(&self) -> u64 {
        self.extractor.blocks_read()
    }

    /// Releases the sinks.
    pub fn into_sinks(self) -> Vec<S> {
        self.router.into_sinks()
    }
}
