//! `tab-dedup scan`: one-shot duplicate report over a tab snapshot file.

use std::path::Path;

use serde::Serialize;
use tab_dedup_core::{DedupEngine, DuplicateReport, MemoryHost, StoredOptions, SystemClock};
use tab_dedup_protocol::{TabSnapshot, WindowId};

use crate::input::{self, Result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanOutput<'a> {
    #[serde(flatten)]
    report: &'a DuplicateReport,
    duplicate_count: usize,
}

pub fn run(tabs: &Path, window: Option<i64>, options: Option<&Path>) -> Result<()> {
    let tabs = input::load_tabs(tabs)?;
    let stored = input::load_options(options)?;
    tracing::debug!(tabs = tabs.len(), "Scanning tab snapshot");

    let report = scan_tabs(tabs, window.map(WindowId), stored)?;
    input::print_json(&ScanOutput {
        report: &report,
        duplicate_count: report.duplicate_count(),
    })
}

fn scan_tabs(
    tabs: Vec<TabSnapshot>,
    window: Option<WindowId>,
    stored: StoredOptions,
) -> Result<DuplicateReport> {
    let mut engine = DedupEngine::new(MemoryHost::with_tabs(tabs), SystemClock, stored)?;
    engine.start();
    Ok(engine.scan(window)?)
}
