// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Record emission (pass 2).
//!
//! [`emit`] writes the fields of a record in layout order using the sizes
//! computed by [`BlockLayout::measure`]. Every section is checked against the
//! size it was declared with, so a record that encodes successfully always
//! satisfies `len == 4 + block_bytes` and `edge_info_bytes[i] == bytes of edge i`.

use std::collections::BTreeMap;

use bytes::BufMut;
use thiserror::Error;

use crate::layout::BlockLayout;
use crate::record::{declared_entries, FeatureId, FeatureMaps, NodeRecord};
use crate::schema::{FeatureCounts, Schema};

/// Errors that can occur while encoding a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Emission was asked to use a schema other than the one the layout was
    /// measured under.
    #[error("layout measured under {measured:?} cannot be emitted under {actual:?}")]
    SchemaMismatch {
        /// Schema recorded in the layout.
        measured: Schema,
        /// Schema passed to emission.
        actual: Schema,
    },

    /// A size field would not fit in its `i32`.
    #[error("{section} needs {bytes} bytes, more than an i32 size field can describe")]
    BlockTooLarge {
        /// Size field that overflowed.
        section: &'static str,
        /// Required byte count.
        bytes: u64,
    },

    /// Emission wrote a different number of bytes than pass 1 declared.
    #[error("{section}: layout declared {declared} bytes but {emitted} were written")]
    LayoutMismatch {
        /// Section whose size disagreed.
        section: &'static str,
        /// Size from the layout.
        declared: usize,
        /// Bytes actually written.
        emitted: usize,
    },
}

/// Measures and emits `record` under `schema`.
pub fn encode(schema: &Schema, record: &NodeRecord) -> Result<Vec<u8>, EncodeError> {
    let layout = BlockLayout::measure(schema, record)?;
    emit(schema, record, &layout)
}

/// Pass 2: writes `record` using a layout previously measured under `schema`.
///
/// # Errors
///
/// Returns [`EncodeError::SchemaMismatch`] if `layout` was measured under a
/// different schema, and [`EncodeError::LayoutMismatch`] if `layout` does not
/// describe `record`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)] // every length written here is bounded by the i32 sizes checked in measure()
pub fn emit(
    schema: &Schema,
    record: &NodeRecord,
    layout: &BlockLayout,
) -> Result<Vec<u8>, EncodeError> {
    if layout.schema != *schema {
        return Err(EncodeError::SchemaMismatch {
            measured: layout.schema,
            actual: *schema,
        });
    }
    if layout.edge_count() != record.edges.len() {
        return Err(EncodeError::LayoutMismatch {
            section: "edge_count",
            declared: layout.edge_count(),
            emitted: record.edges.len(),
        });
    }

    let mut buf: Vec<u8> = Vec::with_capacity(layout.encoded_len());
    buf.put_i32_le(layout.block_bytes);
    buf.put_i32_le(layout.node_info_bytes);

    // Node section
    let node_start = buf.len();
    buf.put_i64_le(record.node_id);
    buf.put_i32_le(record.node_type);
    buf.put_f32_le(record.node_weight);

    let groups = schema.edge_type_count;
    buf.put_i32_le(groups as i32);
    for group in 0..groups {
        let count = record
            .neighbors
            .get(&FeatureId::from(group))
            .map_or(0, BTreeMap::len);
        buf.put_i32_le(count as i32);
    }
    for group in 0..groups {
        let sum = record
            .neighbors
            .get(&FeatureId::from(group))
            .map_or(0.0, weight_sum);
        buf.put_f32_le(sum);
    }
    let declared_groups = declared_entries(&record.neighbors, groups);
    for (_, neighbors) in declared_groups.clone() {
        for id in neighbors.keys() {
            buf.put_i64_le(*id);
        }
    }
    for (_, neighbors) in declared_groups {
        for weight in neighbors.values() {
            buf.put_f32_le(*weight);
        }
    }
    put_features(&mut buf, record.features(), schema.node_features);
    check_section("node_info_bytes", layout.node_info_bytes, buf.len() - node_start)?;

    // Edge section
    buf.put_i32_le(record.edges.len() as i32);
    for size in &layout.edge_info_bytes {
        buf.put_i32_le(*size);
    }
    for (edge, declared) in record.edges.iter().zip(&layout.edge_info_bytes) {
        let edge_start = buf.len();
        buf.put_i64_le(edge.src_id);
        buf.put_i64_le(edge.dst_id);
        buf.put_i32_le(edge.edge_type);
        buf.put_f32_le(edge.weight);
        put_features(&mut buf, edge.features(), schema.edge_features);
        check_section("edge_info_bytes", *declared, buf.len() - edge_start)?;
    }

    check_section("block_bytes", layout.block_bytes, buf.len() - 4)?;
    Ok(buf)
}

/// Sum of a group's weights in emission order, starting from `+0.0`.
pub(crate) fn weight_sum(neighbors: &BTreeMap<i64, f32>) -> f32 {
    neighbors.values().fold(0.0, |acc, w| acc + w)
}

fn put_features(buf: &mut Vec<u8>, features: FeatureMaps<'_>, counts: FeatureCounts) {
    put_feature_block(buf, features.uint64, counts.uint64, |buf, values| {
        for v in values {
            buf.put_i64_le(*v);
        }
    });
    put_feature_block(buf, features.float, counts.float, |buf, values| {
        for v in values {
            buf.put_f32_le(*v);
        }
    });
    put_feature_block(buf, features.binary, counts.binary, |buf, bytes| {
        buf.put_slice(bytes);
    });
}

/// Writes `declared`, one length per id in `0..declared`, then the values.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn put_feature_block<T>(
    buf: &mut Vec<u8>,
    map: &BTreeMap<FeatureId, Vec<T>>,
    declared: u32,
    mut put_values: impl FnMut(&mut Vec<u8>, &[T]),
) {
    buf.put_i32_le(declared as i32);
    for id in 0..declared {
        let len = map.get(&FeatureId::from(id)).map_or(0, Vec::len);
        buf.put_i32_le(len as i32);
    }
    for (_, values) in declared_entries(map, declared) {
        put_values(&mut *buf, values.as_slice());
    }
}

#[allow(clippy::cast_sign_loss)]
fn check_section(section: &'static str, declared: i32, emitted: usize) -> Result<(), EncodeError> {
    let declared = declared as usize;
    if declared == emitted {
        Ok(())
    } else {
        Err(EncodeError::LayoutMismatch {
            section,
            declared,
            emitted,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::EdgeRecord;

    fn example_schema() -> Schema {
        Schema {
            edge_type_count: 1,
            node_features: FeatureCounts::new(1, 0, 0),
            ..Schema::default()
        }
    }

    fn example_record() -> NodeRecord {
        NodeRecord {
            node_id: 5,
            node_type: 0,
            node_weight: 1.0,
            neighbors: BTreeMap::from([(0, BTreeMap::from([(7, 0.5)]))]),
            uint64_features: BTreeMap::from([(0, vec![42])]),
            ..NodeRecord::default()
        }
    }

    fn le_i32(v: i32) -> [u8; 4] {
        v.to_le_bytes()
    }

    #[test]
    fn worked_example_bytes() {
        let bytes = encode(&example_schema(), &example_record()).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&le_i32(72)); // block_bytes
        expected.extend_from_slice(&le_i32(64)); // node_info_bytes
        expected.extend_from_slice(&5i64.to_le_bytes());
        expected.extend_from_slice(&le_i32(0));
        expected.extend_from_slice(&1.0f32.to_le_bytes());
        expected.extend_from_slice(&le_i32(1)); // edge_type_count
        expected.extend_from_slice(&le_i32(1)); // group 0 count
        expected.extend_from_slice(&0.5f32.to_le_bytes()); // group 0 weight sum
        expected.extend_from_slice(&7i64.to_le_bytes());
        expected.extend_from_slice(&0.5f32.to_le_bytes());
        expected.extend_from_slice(&le_i32(1)); // uint64 ids
        expected.extend_from_slice(&le_i32(1));
        expected.extend_from_slice(&42i64.to_le_bytes());
        expected.extend_from_slice(&le_i32(0)); // float ids
        expected.extend_from_slice(&le_i32(0)); // binary ids
        expected.extend_from_slice(&le_i32(0)); // edge_count

        assert_eq!(bytes, expected);
    }

    #[test]
    fn neighbors_are_flattened_ids_then_weights() {
        let schema = Schema {
            edge_type_count: 2,
            ..Schema::default()
        };
        let record = NodeRecord {
            neighbors: BTreeMap::from([
                (0, BTreeMap::from([(9, 1.0), (3, 2.0)])),
                (1, BTreeMap::from([(4, 0.25)])),
                (2, BTreeMap::from([(100, 8.0)])),
            ]),
            ..NodeRecord::default()
        };
        let bytes = encode(&schema, &record).unwrap();
        let groups = &bytes[28..];
        assert_eq!(&groups[0..4], &le_i32(2));
        assert_eq!(&groups[4..8], &le_i32(1));
        assert_eq!(&groups[8..12], &3.0f32.to_le_bytes());
        assert_eq!(&groups[12..16], &0.25f32.to_le_bytes());
        assert_eq!(&groups[16..24], &3i64.to_le_bytes());
        assert_eq!(&groups[24..32], &9i64.to_le_bytes());
        assert_eq!(&groups[32..40], &4i64.to_le_bytes());
        assert_eq!(&groups[40..44], &2.0f32.to_le_bytes());
        assert_eq!(&groups[44..48], &1.0f32.to_le_bytes());
        assert_eq!(&groups[48..52], &0.25f32.to_le_bytes());
    }

    #[test]
    fn edge_sizes_match_emitted_edges() {
        let schema = Schema {
            edge_features: FeatureCounts::new(0, 1, 1),
            ..Schema::default()
        };
        let record = NodeRecord {
            node_id: 1,
            edges: vec![
                EdgeRecord {
                    src_id: 1,
                    dst_id: 2,
                    float_features: BTreeMap::from([(0, vec![1.0, 2.0])]),
                    binary_features: BTreeMap::from([(0, b"hello".to_vec())]),
                    ..EdgeRecord::default()
                },
                EdgeRecord {
                    src_id: 1,
                    dst_id: 3,
                    ..EdgeRecord::default()
                },
            ],
            ..NodeRecord::default()
        };
        let layout = BlockLayout::measure(&schema, &record).unwrap();
        let bytes = emit(&schema, &record, &layout).unwrap();
        assert_eq!(bytes.len(), layout.encoded_len());

        let node_info = usize::try_from(layout.node_info_bytes).unwrap();
        let edges_at = 8 + node_info;
        assert_eq!(&bytes[edges_at..edges_at + 4], &le_i32(2));
        assert_eq!(
            &bytes[edges_at + 4..edges_at + 8],
            &le_i32(24 + 4 + (4 + 4 + 8) + (4 + 4 + 5))
        );
        assert_eq!(&bytes[edges_at + 8..edges_at + 12], &le_i32(24 + 4 + 8 + 8));
        let tail = &bytes[edges_at + 12..];
        assert_eq!(tail.len(), 57 + 44);
        assert_eq!(&tail[..8], &1i64.to_le_bytes());
        assert_eq!(&tail[8..16], &2i64.to_le_bytes());
    }

    #[test]
    fn undeclared_ids_and_groups_are_not_written() {
        let schema = example_schema();
        let mut record = example_record();
        let baseline = encode(&schema, &record).unwrap();
        record.uint64_features.insert(7, vec![1, 2, 3]);
        record.binary_features.insert(0, b"dropped".to_vec());
        record.uint64_features.insert(-1, vec![4]);
        record
            .neighbors
            .insert(3, BTreeMap::from([(11, 1.0)]));
        record
            .neighbors
            .insert(-1, BTreeMap::from([(12, 1.0)]));
        assert_eq!(encode(&schema, &record).unwrap(), baseline);
    }

    #[test]
    fn empty_group_sums_to_positive_zero() {
        let schema = Schema {
            edge_type_count: 1,
            ..Schema::default()
        };
        let record = NodeRecord {
            neighbors: BTreeMap::from([(0, BTreeMap::new())]),
            ..NodeRecord::default()
        };
        let bytes = encode(&schema, &record).unwrap();
        assert_eq!(&bytes[32..36], &0.0f32.to_le_bytes());
    }

    #[test]
    fn emit_rejects_layout_from_other_schema() {
        let record = example_record();
        let layout = BlockLayout::measure(&example_schema(), &record).unwrap();
        let other = Schema {
            edge_type_count: 2,
            ..example_schema()
        };
        let err = emit(&other, &record, &layout).unwrap_err();
        assert!(matches!(err, EncodeError::SchemaMismatch { .. }));
    }

    #[test]
    fn emit_rejects_layout_of_other_record() {
        let schema = example_schema();
        let layout = BlockLayout::measure(&schema, &example_record()).unwrap();
        let mut bigger = example_record();
        bigger.uint64_features.insert(0, vec![1, 2]);
        let err = emit(&schema, &bigger, &layout).unwrap_err();
        assert_eq!(
            err,
            EncodeError::LayoutMismatch {
                section: "node_info_bytes",
                declared: 64,
                emitted: 72,
            }
        );
    }
}
