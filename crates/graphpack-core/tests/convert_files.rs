// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use graphpack_core::{
    decode_block, BlockExtractor, BlockScanner, Converter, LocalFileSink, Router, ScanMode,
    Schema,
};

const META: &str = r#"
{
    "node_type_num": 2,
    "edge_type_num": 2,
    "node_uint64_feature_num": 1,
    "node_float_feature_num": 1,
    "node_binary_feature_num": 1,
    "edge_uint64_feature_num": 1,
    "edge_float_feature_num": 0,
    "edge_binary_feature_num": 0
}
"#;

const DATA: &str = r#"
{"node_id": 5, "node_type": 0, "node_weight": 1.0,
 "neighbor": {"0": {"7": 0.5}, "1": {"9": 1.0, "8": 2.0}},
 "uint64_feature": {"0": [42]},
 "float_feature": {"0": [0.5, 0.25]},
 "binary_feature": {"0": "label}5"},
 "edge": [{"src_id": 5, "dst_id": 7, "edge_type": 0, "weight": 0.5, "uint64_feature": {"0": [1]}}]}
{"node_id": -1, "node_type": 1, "node_weight": 0.5}
{"node_id": 3, "node_type": 1, "node_weight": 2.0, "neighbor": {"1": {"5": 0.5}}}
{"node_id": 8}
"#;

fn write_inputs(dir: &std::path::Path) {
    std::fs::write(dir.join("meta.txt"), META).unwrap();
    std::fs::write(dir.join("test.txt"), DATA).unwrap();
}

fn read_partition(schema: &Schema, path: &std::path::Path) -> Vec<graphpack_core::NodeRecord> {
    BlockScanner::new(File::open(path).unwrap())
        .map(|frame| decode_block(schema, &frame.unwrap()).unwrap())
        .collect()
}

#[test]
fn converts_inputs_into_partition_files() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());

    let schema = Arc::new(
        Schema::load(
            BufReader::new(File::open(dir.path().join("meta.txt")).unwrap()),
            ScanMode::QuoteAware,
        )
        .unwrap(),
    );
    assert_eq!(schema.edge_type_count, 2);

    let prefix = dir.path().join("out/part-").display().to_string();
    let sinks = (0..3)
        .map(|i| LocalFileSink::create(LocalFileSink::partition_path(&prefix, i)).unwrap())
        .collect();
    let extractor = BlockExtractor::new(BufReader::new(
        File::open(dir.path().join("test.txt")).unwrap(),
    ))
    .with_mode(ScanMode::QuoteAware);
    let mut converter = Converter::new(Arc::clone(&schema), extractor, Router::new(sinks).unwrap());
    let stats = converter.run().unwrap();
    drop(converter);

    assert_eq!(stats.blocks, 4);
    assert_eq!(stats.edges, 1);
    assert_eq!(
        stats.partitions.iter().map(|p| p.records).collect::<Vec<_>>(),
        vec![1, 0, 3]
    );

    let p0 = read_partition(&schema, &LocalFileSink::partition_path(&prefix, 0));
    let p1 = read_partition(&schema, &LocalFileSink::partition_path(&prefix, 1));
    let p2 = read_partition(&schema, &LocalFileSink::partition_path(&prefix, 2));
    assert_eq!(p0.iter().map(|r| r.node_id).collect::<Vec<_>>(), vec![3]);
    assert!(p1.is_empty());
    assert_eq!(p2.iter().map(|r| r.node_id).collect::<Vec<_>>(), vec![5, -1, 8]);

    let first = &p2[0];
    assert_eq!(first.neighbors[&1].keys().copied().collect::<Vec<_>>(), vec![8, 9]);
    assert_eq!(first.binary_features[&0], b"label}5".to_vec());
    assert_eq!(first.edges[0].uint64_features[&0], vec![1]);

    let total: u64 = stats.partitions.iter().map(|p| p.bytes).sum();
    let on_disk: u64 = (0..3)
        .map(|i| {
            std::fs::metadata(LocalFileSink::partition_path(&prefix, i))
                .unwrap()
                .len()
        })
        .sum();
    assert_eq!(total, on_disk);
    assert_eq!(total, stats.bytes);
}

#[test]
fn brace_in_string_breaks_brace_count_mode() {
    let dir = tempfile::tempdir().unwrap();
    write_inputs(dir.path());

    let schema = Arc::new(Schema::from_json(META).unwrap());
    let sinks = vec![LocalFileSink::create(dir.path().join("0.dat")).unwrap()];
    let extractor = BlockExtractor::new(BufReader::new(
        File::open(dir.path().join("test.txt")).unwrap(),
    ));
    let mut converter = Converter::new(schema, extractor, Router::new(sinks).unwrap());
    assert!(converter.run().is_err());
}
