// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Decoding and validation of encoded records.
//!
//! [`decode_block`] is the inverse of [`crate::encode::encode`]: given the same
//! [`Schema`] it rebuilds the [`NodeRecord`] and rejects any frame whose
//! declared sizes, counts or weight sums disagree with its contents.
//!
//! Zero-length features and empty neighbor groups are not materialized, since
//! the binary form cannot tell them apart from absent ones.

use std::collections::BTreeMap;
use std::io;

use bytes::Buf;
use thiserror::Error;

use crate::layout::{EDGE_HEADER_BYTES, NODE_HEADER_BYTES};
use crate::record::{EdgeRecord, FeatureId, NodeRecord};
use crate::schema::{FeatureCounts, Schema};

/// Errors that can occur when reading or validating encoded records.
#[derive(Debug, Error)]
pub enum ReadError {
    /// IO error while reading a partition stream.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The data ends before a field or section is complete.
    #[error("{section} truncated: needs {needed} bytes, {remaining} remain")]
    Truncated {
        /// Field or section being read.
        section: &'static str,
        /// Bytes required.
        needed: usize,
        /// Bytes available.
        remaining: usize,
    },

    /// A size, count or length field is negative.
    #[error("{section} has negative value {value}")]
    NegativeLength {
        /// Field that held the value.
        section: &'static str,
        /// The negative value.
        value: i32,
    },

    /// A size field disagrees with the bytes its section actually occupies.
    #[error("{section} declares {declared} bytes but its contents occupy {actual}")]
    SizeMismatch {
        /// Size field being checked.
        section: &'static str,
        /// Declared size.
        declared: usize,
        /// Bytes the section actually uses.
        actual: usize,
    },

    /// A count field disagrees with the schema.
    #[error("{field} is {actual} but the schema declares {expected}")]
    CountMismatch {
        /// Count field being checked.
        field: &'static str,
        /// Value from the schema.
        expected: u32,
        /// Value found in the record.
        actual: i32,
    },

    /// A stored neighbor weight sum disagrees with the stored weights.
    #[error("neighbor group {group} stores weight sum {stored} but its weights add up to {computed}")]
    WeightSumMismatch {
        /// Edge group.
        group: u32,
        /// Sum found in the group header.
        stored: f32,
        /// Sum of the group's weights.
        computed: f32,
    },
}

/// Little-endian field reader over one section.
struct Fields<'a> {
    buf: &'a [u8],
}

impl<'a> Fields<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn need(&self, section: &'static str, needed: usize) -> Result<(), ReadError> {
        if self.buf.remaining() < needed {
            return Err(ReadError::Truncated {
                section,
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn i32(&mut self, section: &'static str) -> Result<i32, ReadError> {
        self.need(section, 4)?;
        Ok(self.buf.get_i32_le())
    }

    fn i64(&mut self, section: &'static str) -> Result<i64, ReadError> {
        self.need(section, 8)?;
        Ok(self.buf.get_i64_le())
    }

    fn f32(&mut self, section: &'static str) -> Result<f32, ReadError> {
        self.need(section, 4)?;
        Ok(self.buf.get_f32_le())
    }

    fn len(&mut self, section: &'static str) -> Result<usize, ReadError> {
        let value = self.i32(section)?;
        usize::try_from(value).map_err(|_| ReadError::NegativeLength { section, value })
    }

    fn count(&mut self, field: &'static str, expected: u32) -> Result<(), ReadError> {
        let actual = self.i32(field)?;
        if i64::from(actual) != i64::from(expected) {
            return Err(ReadError::CountMismatch {
                field,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn take(&mut self, section: &'static str, n: usize) -> Result<&'a [u8], ReadError> {
        self.need(section, n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    /// Fails unless the section was consumed exactly.
    fn finish(self, section: &'static str, declared: usize) -> Result<(), ReadError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(ReadError::SizeMismatch {
                section,
                declared,
                actual: declared - self.buf.len(),
            })
        }
    }
}

/// Decodes one full record frame (starting at its `block_bytes` field).
pub fn decode_block(schema: &Schema, frame: &[u8]) -> Result<NodeRecord, ReadError> {
    let mut f = Fields::new(frame);
    let block_bytes = f.len("block_bytes")?;
    if f.remaining() != block_bytes {
        return Err(ReadError::SizeMismatch {
            section: "block_bytes",
            declared: block_bytes,
            actual: f.remaining(),
        });
    }

    let node_info_bytes = f.len("node_info_bytes")?;
    let node_section = f.take("node section", node_info_bytes)?;
    let mut record = decode_node(schema, node_section)?;

    let edge_count = f.len("edge_count")?;
    f.need("edge_info_bytes", edge_count.saturating_mul(4))?;
    let edge_sizes = (0..edge_count)
        .map(|_| f.len("edge_info_bytes"))
        .collect::<Result<Vec<_>, _>>()?;

    record.edges = Vec::with_capacity(edge_count);
    for size in edge_sizes {
        let edge_section = f.take("edge section", size)?;
        record.edges.push(decode_edge(schema, edge_section)?);
    }

    f.finish("block_bytes", block_bytes)?;
    Ok(record)
}

fn decode_node(schema: &Schema, section: &[u8]) -> Result<NodeRecord, ReadError> {
    let declared = section.len();
    let mut f = Fields::new(section);
    f.need("node header", NODE_HEADER_BYTES as usize)?;
    let node_id = f.i64("node_id")?;
    let node_type = f.i32("node_type")?;
    let node_weight = f.f32("node_weight")?;
    f.count("edge_type_count", schema.edge_type_count)?;

    let groups = schema.edge_type_count as usize;
    f.need("neighbor group header", groups.saturating_mul(8))?;
    let counts = (0..groups)
        .map(|_| f.len("neighbor_count"))
        .collect::<Result<Vec<_>, _>>()?;
    let sums = (0..groups)
        .map(|_| f.f32("neighbor_weight_sum"))
        .collect::<Result<Vec<_>, _>>()?;

    let total = counts.iter().fold(0usize, |acc, c| acc.saturating_add(*c));
    f.need("neighbors", total.saturating_mul(8 + 4))?;
    let ids = (0..total)
        .map(|_| f.i64("neighbor_id"))
        .collect::<Result<Vec<_>, _>>()?;
    let weights = (0..total)
        .map(|_| f.f32("neighbor_weight"))
        .collect::<Result<Vec<_>, _>>()?;

    let mut neighbors = BTreeMap::new();
    let mut at = 0;
    for (group, (&count, &stored)) in (0u32..).zip(counts.iter().zip(&sums)) {
        let span = at..at + count;
        at += count;
        let computed = weights[span.clone()].iter().fold(0.0f32, |acc, w| acc + w);
        if !same_f32(stored, computed) {
            return Err(ReadError::WeightSumMismatch {
                group,
                stored,
                computed,
            });
        }
        if count > 0 {
            let members: BTreeMap<i64, f32> = ids[span.clone()]
                .iter()
                .copied()
                .zip(weights[span].iter().copied())
                .collect();
            neighbors.insert(FeatureId::from(group), members);
        }
    }

    let features = read_features(&mut f, schema.node_features)?;
    f.finish("node_info_bytes", declared)?;

    Ok(NodeRecord {
        node_id,
        node_type,
        node_weight,
        neighbors,
        uint64_features: features.uint64,
        float_features: features.float,
        binary_features: features.binary,
        edges: Vec::new(),
    })
}

fn decode_edge(schema: &Schema, section: &[u8]) -> Result<EdgeRecord, ReadError> {
    let declared = section.len();
    let mut f = Fields::new(section);
    f.need("edge header", EDGE_HEADER_BYTES as usize)?;
    let src_id = f.i64("src_id")?;
    let dst_id = f.i64("dst_id")?;
    let edge_type = f.i32("edge_type")?;
    let weight = f.f32("edge_weight")?;
    let features = read_features(&mut f, schema.edge_features)?;
    f.finish("edge_info_bytes", declared)?;

    Ok(EdgeRecord {
        src_id,
        dst_id,
        edge_type,
        weight,
        uint64_features: features.uint64,
        float_features: features.float,
        binary_features: features.binary,
    })
}

struct DecodedFeatures {
    uint64: BTreeMap<FeatureId, Vec<i64>>,
    float: BTreeMap<FeatureId, Vec<f32>>,
    binary: BTreeMap<FeatureId, Vec<u8>>,
}

fn read_features(f: &mut Fields<'_>, counts: FeatureCounts) -> Result<DecodedFeatures, ReadError> {
    let uint64 = read_feature_block(f, "uint64 id count", counts.uint64, |f, n| {
        f.need("uint64 values", n.saturating_mul(8))?;
        (0..n).map(|_| f.i64("uint64 value")).collect()
    })?;
    let float = read_feature_block(f, "float id count", counts.float, |f, n| {
        f.need("float values", n.saturating_mul(4))?;
        (0..n).map(|_| f.f32("float value")).collect()
    })?;
    let binary = read_feature_block(f, "binary id count", counts.binary, |f, n| {
        Ok(f.take("binary bytes", n)?.to_vec())
    })?;
    Ok(DecodedFeatures {
        uint64,
        float,
        binary,
    })
}

fn read_feature_block<'a, T>(
    f: &mut Fields<'a>,
    field: &'static str,
    declared: u32,
    mut read_values: impl FnMut(&mut Fields<'a>, usize) -> Result<Vec<T>, ReadError>,
) -> Result<BTreeMap<FeatureId, Vec<T>>, ReadError> {
    f.count(field, declared)?;
    f.need("feature lengths", (declared as usize).saturating_mul(4))?;
    let lens = (0..declared)
        .map(|_| f.len("feature length"))
        .collect::<Result<Vec<_>, _>>()?;

    let mut map = BTreeMap::new();
    for (id, len) in (0..declared).zip(lens) {
        if len > 0 {
            map.insert(FeatureId::from(id), read_values(&mut *f, len)?);
        }
    }
    Ok(map)
}

fn same_f32(a: f32, b: f32) -> bool {
    a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::encode::encode;

    fn schema() -> Schema {
        Schema {
            edge_type_count: 2,
            node_features: FeatureCounts::new(1, 1, 1),
            edge_features: FeatureCounts::new(1, 0, 1),
            ..Schema::default()
        }
    }

    fn record() -> NodeRecord {
        NodeRecord {
            node_id: -12,
            node_type: 3,
            node_weight: 0.75,
            neighbors: BTreeMap::from([
                (0, BTreeMap::from([(1, 0.5), (2, 1.5)])),
                (1, BTreeMap::from([(-4, 2.0)])),
            ]),
            uint64_features: BTreeMap::from([(0, vec![1, i64::MAX, i64::MIN])]),
            float_features: BTreeMap::from([(0, vec![f32::MIN_POSITIVE, -3.5])]),
            binary_features: BTreeMap::from([(0, vec![0, 255, 10])]),
            edges: vec![EdgeRecord {
                src_id: -12,
                dst_id: 1,
                edge_type: 0,
                weight: 0.5,
                uint64_features: BTreeMap::from([(0, vec![7])]),
                float_features: BTreeMap::new(),
                binary_features: BTreeMap::from([(0, b"edge".to_vec())]),
            }],
        }
    }

    #[test]
    fn decodes_what_encode_wrote() {
        let bytes = encode(&schema(), &record()).unwrap();
        assert_eq!(decode_block(&schema(), &bytes).unwrap(), record());
    }

    #[test]
    fn rejects_truncated_frame() {
        let bytes = encode(&schema(), &record()).unwrap();
        let err = decode_block(&schema(), &bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(
            err,
            ReadError::SizeMismatch {
                section: "block_bytes",
                ..
            }
        ));
    }

    #[test]
    fn rejects_frame_read_under_other_schema() {
        let bytes = encode(&schema(), &record()).unwrap();
        let other = Schema {
            edge_type_count: 1,
            ..schema()
        };
        let err = decode_block(&other, &bytes).unwrap_err();
        assert!(matches!(
            err,
            ReadError::CountMismatch {
                field: "edge_type_count",
                expected: 1,
                actual: 2,
            }
        ));
    }

    #[test]
    fn rejects_corrupted_node_info_bytes() {
        let mut bytes = encode(&schema(), &record()).unwrap();
        let node_info = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
        bytes[4..8].copy_from_slice(&(node_info - 4).to_le_bytes());
        assert!(decode_block(&schema(), &bytes).is_err());
    }

    #[test]
    fn rejects_corrupted_weight_sum() {
        let mut bytes = encode(&schema(), &record()).unwrap();
        // block, node_info, id, type, weight, group count, 2 counts -> first sum
        let at = 4 + 4 + 8 + 4 + 4 + 4 + 8;
        bytes[at..at + 4].copy_from_slice(&9.0f32.to_le_bytes());
        let err = decode_block(&schema(), &bytes).unwrap_err();
        assert!(matches!(err, ReadError::WeightSumMismatch { group: 0, .. }));
    }

    #[test]
    fn rejects_negative_length() {
        let mut bytes = encode(&Schema::default(), &NodeRecord::default()).unwrap();
        bytes[0..4].copy_from_slice(&(-1i32).to_le_bytes());
        let err = decode_block(&Schema::default(), &bytes).unwrap_err();
        assert!(matches!(
            err,
            ReadError::NegativeLength {
                section: "block_bytes",
                value: -1
            }
        ));
    }

    #[test]
    fn empty_features_are_not_materialized() {
        let mut input = record();
        input.float_features.insert(0, Vec::new());
        input.neighbors.insert(1, BTreeMap::new());
        let decoded = decode_block(&schema(), &encode(&schema(), &input).unwrap()).unwrap();
        assert!(!decoded.float_features.contains_key(&0));
        assert!(!decoded.neighbors.contains_key(&1));
    }
}
