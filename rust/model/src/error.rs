// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fatal error types.
//!
//! Only setup defects and unreadable inputs are fatal. Per-entity problems are
//! reported as [`Issue`](crate::issue::Issue)s and never abort a run.

use thiserror::Error;

/// Result type for model and pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort an extraction or conversion run
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed clearance table, missing building profile, invalid patterns...
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The run was aborted between two stages.
    #[error("Run cancelled before stage '{stage}'")]
    Cancelled { stage: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error stems from configuration rather than data or I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_) | Error::Toml(_))
    }
}
