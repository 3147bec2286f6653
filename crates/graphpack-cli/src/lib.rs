// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! graphpack-cli: the `graphpack` binary.
//!
//! * `graphpack convert` reads `<input_dir>/meta.txt` and `<input_dir>/test.txt`
//!   (names configurable) and writes `<output_prefix><i>.dat` for every
//!   partition, locally or over WebHDFS.
//! * `graphpack inspect` re-reads partition files, validates every record and
//!   optionally checks that each node id routes to the file's partition.
//!
//! Logs go to stderr through `tracing-subscriber`; `RUST_LOG` overrides the
//! default level.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

mod cli;
pub mod config;
mod convert;
mod inspect;

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

/// Parses the command line and runs the selected command.
pub fn entrypoint() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match &cli.command {
        Commands::Convert(args) => convert::run(args),
        Commands::Inspect(args) => inspect::run(args),
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!(e))
}
