//! Loading of CLI inputs: tab snapshots, event logs and option files.

use std::path::{Path, PathBuf};

use fs_err as fs;
use tab_dedup_core::{load_stored_options, DedupError, StoredOptions};
use serde_json::Value;
use tab_dedup_protocol::{
    parse_event, parse_request, EventEnvelope, Request, TabSnapshot, MAX_REQUEST_BYTES,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid event on line {line} of {path}: {message}")]
    InvalidEvent {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid request in {path}: {code}: {message}")]
    InvalidRequest {
        path: PathBuf,
        code: String,
        message: String,
    },

    #[error("Request file {path} is {size} bytes; the limit is {limit}")]
    RequestTooLarge {
        path: PathBuf,
        size: u64,
        limit: usize,
    },

    #[error("Options file {0} is missing or unreadable")]
    OptionsUnreadable(PathBuf),

    #[error("No options path given and no home directory found")]
    NoOptionsPath,

    #[error(transparent)]
    Engine(#[from] DedupError),

    #[error("Failed to write output: {0}")]
    Output(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Reads a JSON array of tab snapshots.
pub fn load_tabs(path: &Path) -> Result<Vec<TabSnapshot>> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads one envelope per non-blank line. Every envelope is validated so a bad
/// line is reported with its line number instead of being skipped.
pub fn load_events(path: &Path) -> Result<Vec<EventEnvelope>> {
    let content = fs::read_to_string(path)?;
    let mut envelopes = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let invalid = |message: String| CliError::InvalidEvent {
            path: path.to_path_buf(),
            line: number + 1,
            message,
        };
        let payload: Value = serde_json::from_str(line).map_err(|err| invalid(err.to_string()))?;
        let envelope = parse_event(payload)
            .map_err(|info| invalid(format!("{}: {}", info.code, info.message)))?;
        envelopes.push(envelope);
    }
    Ok(envelopes)
}

/// Reads one UI request, rejecting oversized payloads before parsing.
pub fn load_request(path: &Path) -> Result<Request> {
    let size = fs::metadata(path)?.len();
    if size > MAX_REQUEST_BYTES as u64 {
        return Err(CliError::RequestTooLarge {
            path: path.to_path_buf(),
            size,
            limit: MAX_REQUEST_BYTES,
        });
    }
    let content = fs::read_to_string(path)?;
    let payload: Value = serde_json::from_str(&content).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    parse_request(payload).map_err(|info| CliError::InvalidRequest {
        path: path.to_path_buf(),
        code: info.code,
        message: info.message,
    })
}

/// Loads an options file for a one-off run. Unlike `options`, nothing is
/// written back; a missing path is an error rather than a silent default.
pub fn load_options(path: Option<&Path>) -> Result<StoredOptions> {
    let Some(path) = path else {
        return Ok(StoredOptions::default());
    };
    if !path.is_file() {
        return Err(CliError::OptionsUnreadable(path.to_path_buf()));
    }
    let (stored, changed) = load_stored_options(path);
    if changed {
        tracing::debug!(path = %path.display(), "Options reconciled against current schema");
    }
    Ok(stored)
}

pub fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).map_err(CliError::Output)?;
    println!("{rendered}");
    Ok(())
}
