//! In-memory tab lifecycle store.
//!
//! Every accessor fails safe on an unknown tab id: mutators become no-ops and
//! [`TabStateStore::is_ignored`] answers `true`, so a tab the store never saw
//! (or already forgot) is never processed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tab_dedup_protocol::{TabId, TabSnapshot, WindowId};

use super::types::TrackedTab;

const NO_DUPLICATES: &str = "0";

#[derive(Debug, Default)]
pub struct TabStateStore {
    tabs: HashMap<TabId, TrackedTab>,
    /// Last computed duplicate count per window, kept as display text so
    /// "never computed" (absent) differs from "computed zero" ("0").
    duplicate_counts: HashMap<WindowId, String>,
}

impl TabStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a tab the host just created.
    pub fn track_new(&mut self, tab_id: TabId) {
        self.tabs.insert(tab_id, TrackedTab::default());
    }

    /// Seeds a tab that was already open when the engine started.
    pub fn track_opened(&mut self, tab: &TabSnapshot, now: DateTime<Utc>) {
        self.tabs.insert(tab.id, TrackedTab::observed(&tab.url, now));
    }

    /// Returns false when the tab is unknown.
    pub fn mark_ignored(&mut self, tab_id: TabId, ignored: bool) -> bool {
        match self.tabs.get_mut(&tab_id) {
            Some(tab) => {
                tab.ignored = ignored;
                true
            }
            None => false,
        }
    }

    pub fn is_ignored(&self, tab_id: TabId) -> bool {
        self.tabs.get(&tab_id).map_or(true, |tab| tab.ignored)
    }

    pub fn last_complete_at(&self, tab_id: TabId) -> Option<DateTime<Utc>> {
        self.tabs.get(&tab_id).and_then(|tab| tab.last_complete_at)
    }

    /// Stores the tab's current URL and stamps its completion time.
    pub fn record_complete(&mut self, tab: &TabSnapshot, now: DateTime<Utc>) -> bool {
        match self.tabs.get_mut(&tab.id) {
            Some(tracked) => {
                tracked.url = Some(tab.url.clone());
                tracked.last_complete_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Returns the tab to its freshly-created state (used when it starts a new
    /// navigation so the previous URL no longer takes part in matching).
    pub fn reset(&mut self, tab_id: TabId) -> bool {
        match self.tabs.get_mut(&tab_id) {
            Some(tracked) => {
                *tracked = TrackedTab::default();
                true
            }
            None => false,
        }
    }

    pub fn url_changed(&self, tab: &TabSnapshot) -> bool {
        self.tabs
            .get(&tab.id)
            .map_or(false, |tracked| tracked.url.as_deref() != Some(tab.url.as_str()))
    }

    pub fn forget(&mut self, tab_id: TabId) -> Option<TrackedTab> {
        self.tabs.remove(&tab_id)
    }

    pub fn exists(&self, tab_id: TabId) -> bool {
        self.tabs.contains_key(&tab_id)
    }

    pub fn get(&self, tab_id: TabId) -> Option<&TrackedTab> {
        self.tabs.get(&tab_id)
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Per-window duplicate counts
    // ─────────────────────────────────────────────────────────────────────

    pub fn set_duplicate_count(&mut self, window_id: WindowId, count: usize) {
        self.duplicate_counts.insert(window_id, count.to_string());
    }

    pub fn get_duplicate_count(&self, window_id: WindowId) -> &str {
        self.duplicate_counts
            .get(&window_id)
            .map_or(NO_DUPLICATES, String::as_str)
    }

    /// True unless the window is known to hold no duplicates. A window that
    /// was never counted answers true so the first refresh always runs.
    pub fn has_duplicates(&self, window_id: WindowId) -> bool {
        self.duplicate_counts.get(&window_id).map(String::as_str) != Some(NO_DUPLICATES)
    }

    pub fn clear_window(&mut self, window_id: WindowId) {
        self.duplicate_counts.remove(&window_id);
    }
}
