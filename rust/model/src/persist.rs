// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON persistence for template libraries, run outputs and inputs.
//!
//! Writes go to a temporary file in the destination directory and are then
//! renamed over the target, so an interrupted run never leaves a partially
//! written file behind.

use crate::error::Result;
use crate::template::TemplateLibrary;
use serde::{de::DeserializeOwned, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use xxhash_rust::xxh3::xxh3_64;

/// Read and deserialize a JSON file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn save_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&data)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    tracing::debug!(path = %path.display(), size = data.len(), "Wrote JSON");
    Ok(())
}

/// Hex xxh3 digest of a value's canonical JSON form.
pub fn json_digest<T: Serialize>(value: &T) -> Result<String> {
    let data = serde_json::to_vec(value)?;
    Ok(format!("{:016x}", xxh3_64(&data)))
}

impl TemplateLibrary {
    /// Load a library from JSON and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let library: TemplateLibrary = load_json(path)?;
        library.validate()?;
        tracing::info!(
            path = %path.display(),
            templates = library.len(),
            source_digest = %library.source_digest,
            "Loaded template library"
        );
        Ok(library)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json_atomic(path, self)
    }
}
