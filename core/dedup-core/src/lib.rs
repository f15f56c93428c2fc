//! # tab-dedup-core
//!
//! Duplicate-tab detection and retention engine. Given a stream of browser tab
//! lifecycle events, it decides which tabs duplicate each other, which one of
//! each pair survives, and asks the host to close the rest.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Debounced work runs from
//!   [`DedupEngine::tick`] against an injected [`Clock`].
//! - **Pure decisions**: Normalization, bucketing and arbitration are plain
//!   functions of their inputs; only the engine talks to the host.
//! - **Fail safe**: Unknown tab ids are no-ops and host failures are logged and
//!   absorbed. The next lifecycle event re-triggers detection.
//! - **Immutable options**: Every scan reads one [`DedupOptions`] snapshot;
//!   changes swap the whole snapshot.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tab_dedup_core::{DedupEngine, MemoryHost, SystemClock};
//!
//! let mut engine = DedupEngine::with_defaults(MemoryHost::with_tabs(tabs), SystemClock);
//! engine.start();
//! let report = engine.scan(None)?;
//! println!("{} duplicates", report.duplicate_count());
//! ```

// Public modules
pub mod arbiter;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod host;
pub mod normalizer;
pub mod patterns;
pub mod scheduler;
pub mod state;
pub mod types;

// Re-export commonly used items at crate root
pub use arbiter::{decide, determine_retained_tab_id, ArbiterContext, Contender};
pub use config::*;
pub use detector::{
    find_duplicates_of_observed, group_duplicates, observed_query, plan_sweep, report_query,
    ObservedScan,
};
pub use engine::DedupEngine;
pub use error::{DedupError, HostError, Result};
pub use host::{MemoryHost, TabHost, TabQuery};
pub use normalizer::*;
pub use patterns::Whitelist;
pub use scheduler::{Clock, Debouncer, ManualClock, SystemClock};
pub use state::{TabStateStore, TrackedTab};
pub use types::*;
