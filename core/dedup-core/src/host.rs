//! The browser seam: tab inventory, tab mutations and display surfaces.
//!
//! The engine owns no tabs. Everything it knows about the browser comes
//! through [`TabHost`], and every mutation it wants goes back through it.

mod memory;

pub use memory::MemoryHost;

use tab_dedup_protocol::{DuplicateTabEntry, TabId, TabSnapshot, TabStatus, WindowId};

use crate::error::HostError;
use crate::normalizer::MatchPattern;

/// Filter for [`TabHost::enumerate_tabs`]. `None` fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabQuery {
    pub window_id: Option<WindowId>,
    pub status: Option<TabStatus>,
    pub url: Option<MatchPattern>,
    pub container_id: Option<String>,
}

impl TabQuery {
    pub fn matches(&self, tab: &TabSnapshot) -> bool {
        if self.window_id.is_some_and(|window_id| window_id != tab.window_id) {
            return false;
        }
        if self.status.is_some_and(|status| status != tab.status) {
            return false;
        }
        if let Some(container_id) = &self.container_id {
            if container_id != &tab.container_id {
                return false;
            }
        }
        match &self.url {
            Some(pattern) => pattern.matches(&tab.url),
            None => true,
        }
    }
}

pub trait TabHost {
    fn enumerate_tabs(&self, query: &TabQuery) -> Result<Vec<TabSnapshot>, HostError>;

    fn get_tab(&self, tab_id: TabId) -> Option<TabSnapshot>;

    fn close_tab(&mut self, tab_id: TabId) -> Result<(), HostError>;

    fn move_tab(&mut self, tab_id: TabId, index: u32) -> Result<(), HostError>;

    fn activate_tab(&mut self, tab_id: TabId) -> Result<(), HostError>;

    /// Activates the tab and brings its window to the front.
    fn focus_tab(&mut self, tab_id: TabId, window_id: WindowId) -> Result<(), HostError>;

    fn get_active_window_id(&self) -> Option<WindowId>;

    fn list_windows(&self) -> Vec<WindowId>;

    /// Badge surface. The count is display text ("0", "3").
    fn publish_duplicate_count(&mut self, _window_id: WindowId, _count: &str) {}

    /// Panel surface. `None` means the rows cover every window.
    fn publish_report(&mut self, _window_id: Option<WindowId>, _rows: &[DuplicateTabEntry]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tab_dedup_protocol::DEFAULT_CONTAINER_ID;

    fn tab(id: i64, url: &str, window: i64) -> TabSnapshot {
        TabSnapshot {
            id: TabId(id),
            url: url.to_string(),
            title: String::new(),
            pinned: false,
            active: false,
            window_id: WindowId(window),
            container_id: DEFAULT_CONTAINER_ID.to_string(),
            index: 0,
            fav_icon_url: None,
            incognito: false,
            status: TabStatus::Complete,
        }
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(TabQuery::default().matches(&tab(1, "about:blank", 9)));
    }

    #[test]
    fn query_constrains_each_field() {
        let query = TabQuery {
            window_id: Some(WindowId(1)),
            status: Some(TabStatus::Complete),
            url: Some(MatchPattern::Single("*://a.com/*".to_string())),
            container_id: Some(DEFAULT_CONTAINER_ID.to_string()),
        };
        assert!(query.matches(&tab(1, "https://a.com/x", 1)));
        assert!(!query.matches(&tab(1, "https://a.com/x", 2)));
        assert!(!query.matches(&tab(1, "https://b.com/x", 1)));

        let mut loading = tab(1, "https://a.com/x", 1);
        loading.status = TabStatus::Loading;
        assert!(!query.matches(&loading));

        let mut other_container = tab(1, "https://a.com/x", 1);
        other_container.container_id = "work".to_string();
        assert!(!query.matches(&other_container));
    }
}
