//! Result types shared by the detector, the arbiter and the engine.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use tab_dedup_protocol::{DuplicateTabEntry, TabId, TabSnapshot, WindowId};

/// Icon shown in the panel for tabs that report no favicon.
pub const DEFAULT_FAVICON: &str = "images/default-favicon.png";

const TITLE_KEY_PREFIX: &str = "title=";

/// Duplicate-equality key. URL keys and title keys never collide because
/// title keys carry a `title=` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MatchingKey(String);

impl MatchingKey {
    pub fn for_url(matching_url: &str, container_id: Option<&str>) -> Self {
        Self(format!("{}{}", matching_url, container_id.unwrap_or_default()))
    }

    pub fn for_title(title: &str, container_id: Option<&str>) -> Self {
        Self(format!(
            "{}{}{}",
            TITLE_KEY_PREFIX,
            title,
            container_id.unwrap_or_default()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_title(&self) -> bool {
        self.0.starts_with(TITLE_KEY_PREFIX)
    }
}

impl fmt::Display for MatchingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tabs sharing a key, in the order they were met. The first one is the
/// bucket reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DuplicateCluster {
    tabs: Vec<TabSnapshot>,
}

impl DuplicateCluster {
    pub fn new(reference: TabSnapshot, duplicate: TabSnapshot) -> Self {
        Self {
            tabs: vec![reference, duplicate],
        }
    }

    /// Adds a tab unless a tab with the same id is already a member.
    pub fn push(&mut self, tab: TabSnapshot) {
        if !self.contains(tab.id) {
            self.tabs.push(tab);
        }
    }

    pub fn contains(&self, tab_id: TabId) -> bool {
        self.tabs.iter().any(|tab| tab.id == tab_id)
    }

    pub fn tabs(&self) -> &[TabSnapshot] {
        &self.tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Tabs that would go away if only one member were kept.
    pub fn surplus(&self) -> usize {
        self.tabs.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub key: MatchingKey,
    pub tabs: DuplicateCluster,
}

/// Output of a report-mode scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateReport {
    #[serde(rename = "duplicateTabsGroups")]
    pub groups: Vec<DuplicateGroup>,
    pub active_window_id: Option<WindowId>,
}

impl DuplicateReport {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of tabs a full cleanup would close.
    pub fn duplicate_count(&self) -> usize {
        self.groups.iter().map(|group| group.tabs.surplus()).sum()
    }

    /// Flattens clusters into panel rows, one per tab id, in cluster order.
    pub fn to_panel_rows(&self) -> Vec<DuplicateTabEntry> {
        let mut seen = HashSet::new();
        self.groups
            .iter()
            .flat_map(|group| group.tabs.tabs())
            .filter(|tab| seen.insert(tab.id))
            .map(panel_row)
            .collect()
    }
}

fn panel_row(tab: &TabSnapshot) -> DuplicateTabEntry {
    let title = if tab.title.is_empty() {
        tab.url.clone()
    } else {
        tab.title.clone()
    };
    let icon = tab
        .fav_icon_url
        .as_deref()
        .filter(|icon| !icon.is_empty())
        .unwrap_or(DEFAULT_FAVICON)
        .to_string();
    DuplicateTabEntry {
        id: tab.id,
        url: tab.url.clone(),
        title,
        window_id: tab.window_id,
        container_id: tab.container_id.clone(),
        icon,
    }
}

/// How to restore the surviving tab once its duplicate is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemainingTab {
    /// True when the tab that triggered the scan was the one closed.
    pub observed_tab_closed: bool,
    /// Whether the closed tab was active.
    pub active: bool,
    /// Index the closed tab occupied.
    pub tab_index: u32,
    /// The survivor.
    pub tab_id: TabId,
    pub window_id: WindowId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionDecision {
    pub retained: TabId,
    pub closed: TabId,
    pub remaining: RemainingTab,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tab_dedup_protocol::{TabStatus, DEFAULT_CONTAINER_ID};

    fn tab(id: i64, url: &str, title: &str) -> TabSnapshot {
        TabSnapshot {
            id: TabId(id),
            url: url.to_string(),
            title: title.to_string(),
            pinned: false,
            active: false,
            window_id: WindowId(1),
            container_id: DEFAULT_CONTAINER_ID.to_string(),
            index: 0,
            fav_icon_url: None,
            incognito: false,
            status: TabStatus::Complete,
        }
    }

    #[test]
    fn title_and_url_keys_do_not_collide() {
        let url_key = MatchingKey::for_url("https://a.com", None);
        let title_key = MatchingKey::for_title("https://a.com", None);
        assert_ne!(url_key, title_key);
        assert!(title_key.is_title());
        assert!(!url_key.is_title());
    }

    #[test]
    fn container_is_appended_to_keys() {
        let key = MatchingKey::for_url("https://a.com", Some("work"));
        assert_eq!(key.as_str(), "https://a.comwork");
        let title = MatchingKey::for_title("Inbox", Some("work"));
        assert_eq!(title.as_str(), "title=Inboxwork");
    }

    #[test]
    fn duplicate_count_sums_cluster_surplus() {
        let mut first = DuplicateCluster::new(tab(1, "https://a.com", ""), tab(2, "https://a.com", ""));
        first.push(tab(3, "https://a.com", ""));
        let second = DuplicateCluster::new(tab(4, "https://b.com", ""), tab(5, "https://b.com", ""));
        let report = DuplicateReport {
            groups: vec![
                DuplicateGroup {
                    key: MatchingKey::for_url("https://a.com", None),
                    tabs: first,
                },
                DuplicateGroup {
                    key: MatchingKey::for_url("https://b.com", None),
                    tabs: second,
                },
            ],
            active_window_id: None,
        };
        assert_eq!(report.duplicate_count(), 3);
    }

    #[test]
    fn cluster_ignores_repeated_members() {
        let mut cluster = DuplicateCluster::new(tab(1, "https://a.com", ""), tab(2, "https://a.com", ""));
        cluster.push(tab(2, "https://a.com", ""));
        assert_eq!(cluster.len(), 2);
    }

    #[test]
    fn panel_rows_fall_back_and_dedupe() {
        let mut with_icon = tab(2, "https://a.com", "A");
        with_icon.fav_icon_url = Some("https://a.com/favicon.ico".to_string());
        let report = DuplicateReport {
            groups: vec![
                DuplicateGroup {
                    key: MatchingKey::for_url("https://a.com", None),
                    tabs: DuplicateCluster::new(tab(1, "https://a.com", ""), with_icon.clone()),
                },
                DuplicateGroup {
                    key: MatchingKey::for_title("A", None),
                    tabs: DuplicateCluster::new(with_icon, tab(3, "https://b.com", "A")),
                },
            ],
            active_window_id: Some(WindowId(1)),
        };

        let rows = report.to_panel_rows();
        let ids: Vec<TabId> = rows.iter().map(|row| row.id).collect();
        assert_eq!(ids, vec![TabId(1), TabId(2), TabId(3)]);
        assert_eq!(rows[0].title, "https://a.com");
        assert_eq!(rows[0].icon, DEFAULT_FAVICON);
        assert_eq!(rows[1].icon, "https://a.com/favicon.ico");
    }

    #[test]
    fn report_serializes_with_host_field_names() {
        let report = DuplicateReport {
            groups: Vec::new(),
            active_window_id: Some(WindowId(4)),
        };
        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(value["activeWindowId"], 4);
        assert!(value["duplicateTabsGroups"].as_array().expect("array").is_empty());
    }
}
