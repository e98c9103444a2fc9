// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! cad-lift command-line tool.
//!
//! - `extract` learns a template library from reference 3D data
//! - `convert` runs classification, z assignment, separation and clash
//!   prediction over a drawing and writes the results
//! - `clash` re-runs prediction over exported elements

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod args;
mod commands;

use args::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .with_context(|| format!("Invalid log level: {}", cli.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let threads = cli.threads.unwrap_or_else(num_cpus::get);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("Failed to initialize thread pool")?;
    tracing::debug!(threads, "Thread pool ready");

    match cli.command {
        Command::Extract {
            reference,
            config,
            output,
        } => commands::extract(&reference, config.as_deref(), &output),
        Command::Convert {
            entities,
            library,
            context,
            config,
            out_dir,
        } => commands::convert(
            &entities,
            &library,
            context.as_deref(),
            config.as_deref(),
            &out_dir,
        ),
        Command::Clash {
            elements,
            config,
            tolerance,
            output,
        } => commands::clash(&elements, config.as_deref(), tolerance, output.as_deref()),
    }
}
