// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Table};
use graphpack_core::{
    BlockExtractor, BlockSink, ConvertStats, Converter, LocalFileSink, Router, Schema,
};
use graphpack_webhdfs::{WebHdfsConfig, WebHdfsSink};
use tracing::info;

use crate::cli::ConvertArgs;
use crate::config::ConvertConfig;

pub(crate) fn run(args: &ConvertArgs) -> Result<()> {
    let config = ConvertConfig::resolve(args)?;

    let meta_path = config.meta_path();
    let meta = File::open(&meta_path)
        .with_context(|| format!("failed to open meta file {}", meta_path.display()))?;
    let schema = Schema::load(BufReader::new(meta), config.scan_mode())
        .with_context(|| format!("failed to load schema from {}", meta_path.display()))?;
    info!(?schema, "schema loaded");

    let data_path = config.data_path();
    let data = File::open(&data_path)
        .with_context(|| format!("failed to open data file {}", data_path.display()))?;
    let extractor = BlockExtractor::new(BufReader::new(data)).with_mode(config.scan_mode());

    let router = Router::new(open_sinks(&config)?)?;
    let mut converter = Converter::new(Arc::new(schema), extractor, router);
    let stats = converter
        .run()
        .with_context(|| format!("conversion of {} failed", data_path.display()))?;

    println!("{}", summary(&config, &stats));
    Ok(())
}

fn open_sinks(config: &ConvertConfig) -> Result<Vec<Box<dyn BlockSink>>> {
    (0..config.partitions)
        .map(|index| -> Result<Box<dyn BlockSink>> {
            let name = config.partition_name(index);
            let sink: Box<dyn BlockSink> = if config.uses_hdfs() {
                let mut remote = WebHdfsConfig::new(&config.hdfs_endpoint);
                if !config.hdfs_user.is_empty() {
                    remote = remote.with_user(&config.hdfs_user);
                }
                Box::new(WebHdfsSink::create(remote, name.as_str())?)
            } else {
                Box::new(LocalFileSink::create(&name)?)
            };
            info!(partition = index, sink = sink.target(), "partition opened");
            Ok(sink)
        })
        .collect()
}

fn summary(config: &ConvertConfig, stats: &ConvertStats) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["partition", "output", "records", "bytes"]);
    for (index, part) in stats.partitions.iter().enumerate() {
        table.add_row(vec![
            index.to_string(),
            config.partition_name(index),
            part.records.to_string(),
            part.bytes.to_string(),
        ]);
    }
    table.add_row(vec![
        "total".to_owned(),
        format!("{} edges", stats.edges),
        stats.blocks.to_string(),
        stats.bytes.to_string(),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphpack_core::PartitionStats;

    #[test]
    fn summary_lists_every_partition_and_a_total() {
        let config = ConvertConfig {
            partitions: 2,
            output_prefix: "p".into(),
            ..ConvertConfig::default()
        };
        let stats = ConvertStats {
            blocks: 3,
            edges: 1,
            bytes: 120,
            ignored_feature_ids: 0,
            ignored_neighbor_groups: 0,
            partitions: vec![
                PartitionStats { records: 2, bytes: 80 },
                PartitionStats { records: 1, bytes: 40 },
            ],
        };
        let text = summary(&config, &stats).to_string();
        assert!(text.contains("p0.dat"));
        assert!(text.contains("p1.dat"));
        assert!(text.contains("1 edges"));
        assert!(text.contains("120"));
    }
}
