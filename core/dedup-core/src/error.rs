//! Error types for tab-dedup-core operations.
//!
//! Nothing here is fatal to the engine: host failures are absorbed where they
//! happen and the next lifecycle event re-triggers detection.

use std::path::PathBuf;

use tab_dedup_protocol::TabId;

// ═══════════════════════════════════════════════════════════════════════════════
// Host Errors (returned by TabHost implementations)
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure reported by the host's tab primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("Tab not found: {0}")]
    TabNotFound(TabId),

    #[error("Host rejected operation on {tab_id}: {reason}")]
    Rejected { tab_id: TabId, reason: String },

    #[error("Host unavailable: {0}")]
    Unavailable(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Engine Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Options file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Options write failed: {path}: {source}")]
    ConfigWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Options directory not found")]
    ConfigDirNotFound,

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Invalid value for option {name}: {details}")]
    InvalidOptionValue { name: String, details: String },

    #[error("Invalid whitelist pattern {pattern:?}: {source}")]
    InvalidWhitelistPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Host Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Host call failed: {op}: {source}")]
    Host {
        op: &'static str,
        #[source]
        source: HostError,
    },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using DedupError.
pub type Result<T> = std::result::Result<T, DedupError>;

impl From<DedupError> for String {
    fn from(err: DedupError) -> String {
        err.to_string()
    }
}
