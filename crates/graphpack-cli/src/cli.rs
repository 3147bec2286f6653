// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "graphpack", version)]
#[command(about = "Convert JSON graph blocks into partitioned binary records")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert a meta document and a block stream into partition files
    Convert(ConvertArgs),
    /// Validate partition files and summarize their contents
    Inspect(InspectArgs),
}

/// Flags for `convert`. Unset flags fall back to `--config`, then to defaults.
#[derive(Args, Debug, Default)]
pub struct ConvertArgs {
    /// JSON file with conversion settings
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Number of output partitions
    #[arg(long, short)]
    pub partitions: Option<usize>,
    /// Directory holding the meta and data files
    #[arg(long)]
    pub input_dir: Option<PathBuf>,
    /// Prefix of every output name; partition i is `<prefix><i>.dat`
    #[arg(long)]
    pub output_prefix: Option<String>,
    /// Meta (schema) file name inside the input directory
    #[arg(long)]
    pub meta_file: Option<String>,
    /// Block stream file name inside the input directory
    #[arg(long)]
    pub data_file: Option<String>,
    /// WebHDFS name node address; empty writes local files
    #[arg(long)]
    pub hdfs_endpoint: Option<String>,
    /// `user.name` for WebHDFS requests
    #[arg(long)]
    pub hdfs_user: Option<String>,
    /// Ignore braces inside JSON strings when splitting blocks
    #[arg(long)]
    pub quote_aware: bool,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Meta (schema) file the partitions were written under
    #[arg(long)]
    pub schema: PathBuf,
    /// Partition count the files were routed with
    #[arg(long)]
    pub partitions: Option<usize>,
    /// Expected partition index; inferred from the file name when omitted
    #[arg(long, requires = "partitions")]
    pub index: Option<usize>,
    /// Split the meta file with quote-aware scanning
    #[arg(long)]
    pub quote_aware: bool,
    /// Partition files to check
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}
