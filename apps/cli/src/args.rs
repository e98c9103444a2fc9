// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command-line arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Lift 2D CAD entities into discipline-separated 3D elements
#[derive(Parser, Debug)]
#[command(name = "cad-lift", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log filter (off, error, warn, info, debug, trace, or a RUST_LOG directive)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Worker threads for classification and placement (defaults to CPU count)
    #[arg(long, global = true)]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Learn a template library from a reference 3D dataset
    Extract {
        /// Reference dataset (JSON: storeys and element records)
        #[arg(long)]
        reference: PathBuf,

        /// Pipeline configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where to write the template library
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Convert 2D drawing entities into positioned elements
    Convert {
        /// Drawing entities (JSON)
        #[arg(long)]
        entities: PathBuf,

        /// Template library produced by `extract`
        #[arg(long)]
        library: PathBuf,

        /// Building context with storeys (JSON)
        #[arg(long)]
        context: Option<PathBuf>,

        /// Pipeline configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output directory for elements, clash report, adjustments and summary
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
    },

    /// Predict clashes in an exported element set without moving anything
    Clash {
        /// Element dataset written by `convert`
        #[arg(long)]
        elements: PathBuf,

        /// Pipeline configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured clash tolerance (m)
        #[arg(long)]
        tolerance: Option<f64>,

        /// Write the report here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
