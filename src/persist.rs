// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::PersistError;

/// Suffix of the temporary file a write goes to before it is renamed into place
const PARTIAL_SUFFIX: &str = ".partial";

/// Serialize a value the way every JSON document of this crate is written
pub fn to_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, PersistError> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write a JSON document atomically (pretty-printed, trailing newline)
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let bytes = to_json_bytes(value)?;
    write_bytes_atomic(path, &bytes)
}

/// Read and deserialize a JSON document
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let content = std::fs::read_to_string(path).map_err(|e| PersistError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&content).map_err(|e| PersistError::JsonParseFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Replace `path` with `bytes`, or leave it untouched on failure.
///
/// The data goes to a `.partial` sibling first and is renamed over the
/// target only once it is completely on disk.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let partial = partial_path(path);
    if let Err(e) = std::fs::write(&partial, bytes) {
        let _ = std::fs::remove_file(&partial);
        return Err(PersistError::WriteFailed {
            path: partial,
            source: e,
        });
    }

    std::fs::rename(&partial, path).map_err(|e| {
        let _ = std::fs::remove_file(&partial);
        PersistError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

/// Create a directory and its parents if needed
pub fn ensure_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| PersistError::CreateDirectoryFailed {
        path: dir.to_path_buf(),
        source: e,
    })
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}
