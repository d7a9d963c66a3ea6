//! JSON persistence for conversation logs.
//!
//! A log is stored as an ordered array of `{"role", "content"}` objects.
//! Embeddings, ids and timestamps are not stored.

use crate::error::PersistenceError;
use crate::turn::TurnRecord;
use colloquy_ai::Role;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Writes `records` to `path`, replacing any existing file.
///
/// # Errors
///
/// Returns `PersistenceError::Io` if the file cannot be written.
pub fn write_log(path: &Path, records: &[TurnRecord]) -> colloquy_core::Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(records).map_err(|e| PersistenceError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    fs::write(path, json).map_err(|e| PersistenceError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    debug!(path = %path.display(), turns = records.len(), "wrote conversation log");
    Ok(())
}

/// Reads the records stored at `path`, in the order they were written.
///
/// # Errors
///
/// Returns `PersistenceError::Io` if the file cannot be read, and
/// `PersistenceError::Malformed` if it is not a log: invalid JSON, unknown
/// roles or fields, or a system record anywhere but first.
pub fn read_log(path: &Path) -> colloquy_core::Result<Vec<TurnRecord>, PersistenceError> {
    let raw = fs::read_to_string(path).map_err(|e| PersistenceError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let records: Vec<TurnRecord> =
        serde_json::from_str(&raw).map_err(|e| PersistenceError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if let Some(position) = records
        .iter()
        .skip(1)
        .position(|record| record.role == Role::System)
    {
        return Err(PersistenceError::Malformed {
            path: path.to_path_buf(),
            reason: format!("system turn at position {}, only position 0 allowed", position + 1),
        }
        .into());
    }

    debug!(path = %path.display(), turns = records.len(), "read conversation log");
    Ok(records)
}
