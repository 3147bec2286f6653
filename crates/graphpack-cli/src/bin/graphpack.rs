// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! CLI entry point for graphpack.

use anyhow::Result;
use graphpack_cli::entrypoint;

fn main() -> Result<()> {
    entrypoint()
}
