//! Host event and UI request types for the tab-dedup engine.
//!
//! This crate is shared by the engine and the collaborators that feed it (the
//! browser host adapter and the UI panel) to prevent schema drift. The engine
//! remains the authority on validation, but collaborators can reuse the same
//! types to construct valid payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB

pub const BLANK_URL: &str = "about:blank";
pub const DEFAULT_CONTAINER_ID: &str = "default";
/// Frame id of a tab's top-level document.
pub const TOP_FRAME_ID: i64 = 0;

const MAX_EVENT_ID_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

impl TabId {
    /// Id the host uses for tabs that are not real (prerender, devtools).
    pub const NONE: TabId = TabId(-1);

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl Display for TabId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "tab:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub i64);

impl Display for WindowId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "window:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabStatus {
    #[default]
    Loading,
    Complete,
}

/// Point-in-time view of a host tab. The engine never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSnapshot {
    pub id: TabId,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub active: bool,
    pub window_id: WindowId,
    #[serde(default = "default_container_id")]
    pub container_id: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub fav_icon_url: Option<String>,
    #[serde(default)]
    pub incognito: bool,
    #[serde(default)]
    pub status: TabStatus,
}

fn default_container_id() -> String {
    DEFAULT_CONTAINER_ID.to_string()
}

impl TabSnapshot {
    pub fn is_complete(&self) -> bool {
        self.status == TabStatus::Complete
    }

    pub fn is_blank(&self) -> bool {
        self.url == BLANK_URL
    }
}

/// Fields reported as changed by a tab-updated notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeInfo {
    #[serde(default)]
    pub status: Option<TabStatus>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TabEvent {
    Created {
        tab: TabSnapshot,
    },
    BeforeNavigate {
        tab_id: TabId,
        frame_id: i64,
        url: String,
    },
    Completed {
        tab_id: TabId,
        frame_id: i64,
    },
    Updated {
        tab_id: TabId,
        change: ChangeInfo,
        tab: TabSnapshot,
    },
    Attached {
        tab_id: TabId,
    },
    Detached {
        tab_id: TabId,
        old_window_id: WindowId,
    },
    Removed {
        tab_id: TabId,
        window_id: WindowId,
        is_window_closing: bool,
    },
    Activated {
        tab_id: TabId,
        window_id: WindowId,
    },
}

impl TabEvent {
    pub fn tab_id(&self) -> TabId {
        match self {
            TabEvent::Created { tab } => tab.id,
            TabEvent::BeforeNavigate { tab_id, .. }
            | TabEvent::Completed { tab_id, .. }
            | TabEvent::Updated { tab_id, .. }
            | TabEvent::Attached { tab_id }
            | TabEvent::Detached { tab_id, .. }
            | TabEvent::Removed { tab_id, .. }
            | TabEvent::Activated { tab_id, .. } => *tab_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TabEvent::Created { .. } => "created",
            TabEvent::BeforeNavigate { .. } => "before_navigate",
            TabEvent::Completed { .. } => "completed",
            TabEvent::Updated { .. } => "updated",
            TabEvent::Attached { .. } => "attached",
            TabEvent::Detached { .. } => "detached",
            TabEvent::Removed { .. } => "removed",
            TabEvent::Activated { .. } => "activated",
        }
    }

    fn is_navigation(&self) -> bool {
        matches!(
            self,
            TabEvent::BeforeNavigate { .. } | TabEvent::Completed { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventEnvelope {
    pub event_id: String,
    pub recorded_at: String,
    pub event: TabEvent,
}

impl EventEnvelope {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.event_id.trim().is_empty() {
            return Err(ErrorInfo::new("invalid_event_id", "event_id is required"));
        }
        if self.event_id.len() > MAX_EVENT_ID_LEN {
            return Err(ErrorInfo::new(
                "invalid_event_id",
                "event_id must be 128 characters or fewer",
            ));
        }

        if DateTime::parse_from_rfc3339(&self.recorded_at).is_err() {
            return Err(ErrorInfo::new(
                "invalid_timestamp",
                "recorded_at must be RFC3339",
            ));
        }

        // Navigation notifications may legitimately carry the "no tab" id;
        // the engine filters those out itself.
        if !self.event.is_navigation() && !self.event.tab_id().is_valid() {
            return Err(ErrorInfo::new("invalid_tab_id", "tab_id must be >= 0"));
        }

        match &self.event {
            TabEvent::BeforeNavigate { url, .. } => require_string(url, "url")?,
            TabEvent::Updated { tab_id, tab, .. } if *tab_id != tab.id => {
                return Err(ErrorInfo::new(
                    "invalid_tab_id",
                    "tab_id must match tab.id",
                ));
            }
            _ => {}
        }

        Ok(())
    }

    pub fn recorded_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.recorded_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

pub fn parse_event(params: Value) -> Result<EventEnvelope, ErrorInfo> {
    let envelope: EventEnvelope = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("event payload is invalid JSON: {}", err),
        )
    })?;
    envelope.validate()?;
    Ok(envelope)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    GetDuplicateTabs,
    CloseDuplicateTabs,
    GetStoredOptions,
    SetStoredOption,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize)]
pub struct WindowParams {
    #[serde(default)]
    pub window_id: Option<WindowId>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SetStoredOptionParams {
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub refresh: bool,
}

impl Request {
    pub fn window_params(&self) -> Result<WindowParams, ErrorInfo> {
        match &self.params {
            None => Ok(WindowParams::default()),
            Some(params) => serde_json::from_value(params.clone()).map_err(|err| {
                ErrorInfo::new("invalid_params", format!("invalid window params: {}", err))
            }),
        }
    }

    pub fn set_option_params(&self) -> Result<SetStoredOptionParams, ErrorInfo> {
        let params = self
            .params
            .clone()
            .ok_or_else(|| ErrorInfo::new("missing_field", "params is required"))?;
        let parsed: SetStoredOptionParams = serde_json::from_value(params).map_err(|err| {
            ErrorInfo::new("invalid_params", format!("invalid option params: {}", err))
        })?;
        require_string(&parsed.name, "name")?;
        Ok(parsed)
    }
}

pub fn parse_request(payload: Value) -> Result<Request, ErrorInfo> {
    let request: Request = serde_json::from_value(payload).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("request payload is invalid JSON: {}", err),
        )
    })?;
    if request.protocol_version != PROTOCOL_VERSION {
        return Err(ErrorInfo::new(
            "unsupported_version",
            format!(
                "protocol_version {} is not supported (expected {})",
                request.protocol_version, PROTOCOL_VERSION
            ),
        ));
    }
    Ok(request)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

/// One row of the duplicate-tabs panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateTabEntry {
    pub id: TabId,
    pub url: String,
    pub title: String,
    pub window_id: WindowId,
    pub container_id: String,
    pub icon: String,
}

fn require_string(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(
            "missing_field",
            format!("{} is required", field),
        ));
    }
    Ok(())
}
