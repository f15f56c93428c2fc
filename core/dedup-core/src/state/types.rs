use chrono::{DateTime, Utc};
use serde::Serialize;

/// What the engine remembers about one open tab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackedTab {
    /// Last URL observed; `None` until the first observation.
    pub url: Option<String>,
    /// Time of the last "load complete" notification.
    pub last_complete_at: Option<DateTime<Utc>>,
    /// Set while a close is in flight so the tab is not processed again.
    pub ignored: bool,
}

impl TrackedTab {
    pub fn observed(url: &str, at: DateTime<Utc>) -> Self {
        Self {
            url: Some(url.to_string()),
            last_complete_at: Some(at),
            ignored: false,
        }
    }
}
