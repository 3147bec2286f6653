// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use comfy_table::{presets::UTF8_FULL, Table};
use graphpack_core::{decode_block, partition_for, BlockScanner, ScanMode, Schema};
use tracing::debug;

use crate::cli::InspectArgs;

#[derive(Debug, Default, PartialEq, Eq)]
struct FileSummary {
    records: u64,
    edges: u64,
    bytes: u64,
}

pub(crate) fn run(args: &InspectArgs) -> Result<()> {
    let mode = if args.quote_aware {
        ScanMode::QuoteAware
    } else {
        ScanMode::BraceCount
    };
    let meta = File::open(&args.schema)
        .with_context(|| format!("failed to open meta file {}", args.schema.display()))?;
    let schema = Schema::load(BufReader::new(meta), mode)
        .with_context(|| format!("failed to load schema from {}", args.schema.display()))?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["file", "records", "edges", "bytes"]);
    for path in &args.files {
        let expected = match args.partitions {
            Some(partitions) => Some((partitions, expected_index(args.index, path)?)),
            None => None,
        };
        let summary = inspect_file(&schema, path, expected)?;
        table.add_row(vec![
            path.display().to_string(),
            summary.records.to_string(),
            summary.edges.to_string(),
            summary.bytes.to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Explicit `--index`, else the trailing digits of the file stem (`part-3.dat` is 3).
fn expected_index(explicit: Option<usize>, path: &Path) -> Result<usize> {
    if let Some(index) = explicit {
        return Ok(index);
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let digits = stem.len() - stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        bail!(
            "cannot infer partition index from {}; pass --index",
            path.display()
        );
    }
    stem[stem.len() - digits..]
        .parse()
        .with_context(|| format!("bad partition index in {}", path.display()))
}

fn inspect_file(
    schema: &Schema,
    path: &Path,
    expected: Option<(usize, usize)>,
) -> Result<FileSummary> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut scanner = BlockScanner::new(BufReader::new(file));
    let mut summary = FileSummary::default();

    loop {
        let offset = scanner.offset();
        let frame = scanner
            .next_frame()
            .with_context(|| format!("{}: bad frame at byte {offset}", path.display()))?;
        let Some(frame) = frame else { break };
        let record = decode_block(schema, &frame)
            .with_context(|| format!("{}: bad record at byte {offset}", path.display()))?;

        if let Some((partitions, index)) = expected {
            let actual = partition_for(record.node_id, partitions)?;
            if actual != index {
                bail!(
                    "{}: node {} at byte {offset} belongs to partition {actual}, not {index}",
                    path.display(),
                    record.node_id
                );
            }
        }
        debug!(node_id = record.node_id, offset, "record ok");
        summary.records += 1;
        summary.edges += record.edges.len() as u64;
        summary.bytes += frame.len() as u64;
    }
    Ok(summary)
}
