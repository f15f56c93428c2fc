//! DedupEngine - the single entry point hosts talk to.
//!
//! The engine is:
//! - **Synchronous**: host calls block and nothing runs in the background
//! - **Single-writer**: every mutation of the tab store happens inside one of
//!   its methods, so no locking is needed
//! - **Clock-driven**: debounced work and close verification only run from
//!   [`DedupEngine::tick`], which reads the injected [`Clock`]
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use tab_dedup_core::{DedupEngine, MemoryHost, SystemClock};
//!
//! let mut engine = DedupEngine::with_defaults(MemoryHost::with_tabs(tabs), SystemClock);
//! engine.start();
//! engine.handle_event(&event);
//! engine.tick();
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tab_dedup_protocol::{
    ChangeInfo, ErrorInfo, EventEnvelope, Method, Request, Response, TabEvent, TabId, TabSnapshot,
    TabStatus, WindowId, PROTOCOL_VERSION, TOP_FRAME_ID,
};
use tracing::{debug, info, warn};

use crate::config::{DedupOptions, RemainingTabAction, StoredOptions};
use crate::detector::{
    find_duplicates_of_observed, group_duplicates, observed_query, plan_sweep, report_query,
    ObservedScan,
};
use crate::error::{DedupError, Result};
use crate::host::{TabHost, TabQuery};
use crate::normalizer::is_chrome_url;
use crate::scheduler::{
    Clock, Debouncer, CLOSE_GRACE_MS, REFRESH_QUIET_MS, REMAINING_TAB_QUIET_MS,
};
use crate::state::TabStateStore;
use crate::types::{DuplicateReport, RemainingTab};

/// A close request waiting out the grace window.
#[derive(Debug, Clone)]
struct PendingClose {
    tab_id: TabId,
    remaining: Option<RemainingTab>,
    /// Window refreshed if the close turns out not to have happened.
    window_id: WindowId,
    due_at: DateTime<Utc>,
}

pub struct DedupEngine<H: TabHost, C: Clock> {
    host: H,
    clock: C,
    store: TabStateStore,
    stored: StoredOptions,
    options: Arc<DedupOptions>,
    refresh: Debouncer<Option<WindowId>>,
    remaining: Debouncer<RemainingTab>,
    verifications: Vec<PendingClose>,
}

impl<H: TabHost, C: Clock> DedupEngine<H, C> {
    /// Creates an engine from stored options, reconciling them first.
    pub fn new(host: H, clock: C, mut stored: StoredOptions) -> Result<Self> {
        stored.reconcile();
        let options = stored.to_options()?;
        Ok(Self {
            host,
            clock,
            store: TabStateStore::new(),
            stored,
            options: Arc::new(options),
            refresh: Debouncer::with_millis(REFRESH_QUIET_MS),
            remaining: Debouncer::with_millis(REMAINING_TAB_QUIET_MS),
            verifications: Vec::new(),
        })
    }

    pub fn with_defaults(host: H, clock: C) -> Self {
        Self {
            host,
            clock,
            store: TabStateStore::new(),
            stored: StoredOptions::default(),
            options: Arc::new(DedupOptions::default()),
            refresh: Debouncer::with_millis(REFRESH_QUIET_MS),
            remaining: Debouncer::with_millis(REMAINING_TAB_QUIET_MS),
            verifications: Vec::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn store(&self) -> &TabStateStore {
        &self.store
    }

    /// Current options snapshot. Holders keep their copy across later swaps.
    pub fn options(&self) -> Arc<DedupOptions> {
        Arc::clone(&self.options)
    }

    pub fn stored_options(&self) -> &StoredOptions {
        &self.stored
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// Seeds the store from the tabs already open, then refreshes every window.
    pub fn start(&mut self) {
        let now = self.clock.now();
        match self.host.enumerate_tabs(&TabQuery::default()) {
            Ok(tabs) => {
                for tab in &tabs {
                    self.store.track_opened(tab, now);
                }
                info!(tabs = tabs.len(), "Engine started");
            }
            Err(err) => warn!(error = %err, "Failed to enumerate tabs at startup"),
        }
        self.refresh_global();
    }

    /// Earliest time at which [`DedupEngine::tick`] has work to do.
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        self.verifications
            .iter()
            .map(|pending| pending.due_at)
            .chain(self.remaining.due_at())
            .chain(self.refresh.due_at())
            .min()
    }

    /// Runs whatever is due: expired close verifications first, then the
    /// remaining-tab action, then the refresh.
    pub fn tick(&mut self) {
        let now = self.clock.now();

        let (due, waiting): (Vec<PendingClose>, Vec<PendingClose>) = self
            .verifications
            .drain(..)
            .partition(|pending| pending.due_at <= now);
        self.verifications = waiting;
        for pending in due {
            self.verify_close(pending);
        }

        if let Some(remaining) = self.remaining.take_due(now) {
            self.handle_remaining_tab(remaining);
        }
        if let Some(window_id) = self.refresh.take_due(now) {
            self.refresh_duplicate_tabs_info(window_id);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Options
    // ─────────────────────────────────────────────────────────────────────────────

    /// Validates and applies one option. The snapshot is only swapped when the
    /// new set of options is fully valid.
    pub fn set_stored_option(&mut self, name: &str, value: Value, refresh: bool) -> Result<()> {
        let mut next = self.stored.clone();
        next.set(name, value)?;
        let options = next.to_options()?;
        self.stored = next;
        self.options = Arc::new(options);
        info!(option = name, "Option updated");
        if refresh {
            self.refresh_global();
        }
        Ok(())
    }

    pub fn replace_stored_options(&mut self, mut stored: StoredOptions) -> Result<()> {
        stored.reconcile();
        let options = stored.to_options()?;
        self.stored = stored;
        self.options = Arc::new(options);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Host Events
    // ─────────────────────────────────────────────────────────────────────────────

    /// Validates an envelope and dispatches its event.
    pub fn handle_envelope(&mut self, envelope: &EventEnvelope) -> std::result::Result<(), ErrorInfo> {
        envelope.validate()?;
        self.handle_event(&envelope.event);
        Ok(())
    }

    pub fn handle_event(&mut self, event: &TabEvent) {
        debug!(kind = event.kind(), tab_id = %event.tab_id(), "Tab event");
        match event {
            TabEvent::Created { tab } => self.on_created(tab),
            TabEvent::BeforeNavigate {
                tab_id,
                frame_id,
                url,
            } => self.on_before_navigate(*tab_id, *frame_id, url),
            TabEvent::Completed { tab_id, frame_id } => self.on_completed(*tab_id, *frame_id),
            TabEvent::Updated { tab_id, change, tab } => self.on_updated(*tab_id, change, tab),
            TabEvent::Attached { tab_id } => self.on_attached(*tab_id),
            TabEvent::Detached { old_window_id, .. } => self.on_detached(*old_window_id),
            TabEvent::Removed {
                tab_id,
                window_id,
                is_window_closing,
            } => self.on_removed(*tab_id, *window_id, *is_window_closing),
            TabEvent::Activated { tab_id, window_id } => self.on_activated(*tab_id, *window_id),
        }
    }

    fn on_created(&mut self, tab: &TabSnapshot) {
        self.store.track_new(tab.id);
        if tab.is_complete() && !tab.is_blank() {
            self.search_or_refresh(tab, true, None);
        }
    }

    fn on_before_navigate(&mut self, tab_id: TabId, frame_id: i64, url: &str) {
        if !self.options.auto_close()
            || frame_id != TOP_FRAME_ID
            || !tab_id.is_valid()
            || url == tab_dedup_protocol::BLANK_URL
        {
            return;
        }
        if self.store.is_ignored(tab_id) {
            return;
        }
        let Some(tab) = self.host.get_tab(tab_id) else {
            return;
        };
        self.store.reset(tab.id);
        self.search_for_duplicate_tabs_to_close(&tab, true, Some(url));
    }

    fn on_completed(&mut self, tab_id: TabId, frame_id: i64) {
        if frame_id != TOP_FRAME_ID || !tab_id.is_valid() || self.store.is_ignored(tab_id) {
            return;
        }
        let Some(tab) = self.host.get_tab(tab_id) else {
            return;
        };
        self.store.record_complete(&tab, self.clock.now());
        self.search_or_refresh(&tab, false, None);
    }

    fn on_updated(&mut self, tab_id: TabId, change: &ChangeInfo, tab: &TabSnapshot) {
        if self.store.is_ignored(tab_id) || change.status != Some(TabStatus::Complete) {
            return;
        }
        match &change.url {
            Some(url) if url != &tab.url => {
                if tab.is_blank() || tab.fav_icon_url.is_none() || !self.store.url_changed(tab) {
                    return;
                }
            }
            _ if is_chrome_url(&tab.url) => {}
            _ => return,
        }
        self.store.record_complete(tab, self.clock.now());
        self.search_or_refresh(tab, false, None);
    }

    fn on_attached(&mut self, tab_id: TabId) {
        if let Some(tab) = self.host.get_tab(tab_id) {
            self.search_or_refresh(&tab, false, None);
        }
    }

    fn on_detached(&mut self, old_window_id: WindowId) {
        if self.store.has_duplicates(old_window_id) {
            self.schedule_refresh(Some(old_window_id));
        }
    }

    fn on_removed(&mut self, tab_id: TabId, window_id: WindowId, is_window_closing: bool) {
        self.store.forget(tab_id);
        if is_window_closing {
            if self.options.scope.all_windows && self.store.has_duplicates(window_id) {
                self.schedule_refresh(None);
            }
            self.store.clear_window(window_id);
        } else if self.store.has_duplicates(window_id) {
            self.schedule_refresh(Some(window_id));
        }
    }

    fn on_activated(&mut self, tab_id: TabId, window_id: WindowId) {
        if self.store.is_ignored(tab_id) {
            return;
        }
        let count = self.store.get_duplicate_count(window_id).to_string();
        self.host.publish_duplicate_count(window_id, &count);
    }

    fn search_or_refresh(&mut self, tab: &TabSnapshot, complete_only: bool, loading_url: Option<&str>) {
        if self.options.auto_close() {
            self.search_for_duplicate_tabs_to_close(tab, complete_only, loading_url);
        } else {
            self.schedule_refresh(Some(tab.window_id));
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Elimination
    // ─────────────────────────────────────────────────────────────────────────────

    fn search_for_duplicate_tabs_to_close(
        &mut self,
        observed: &TabSnapshot,
        complete_only: bool,
        loading_url: Option<&str>,
    ) {
        let options = Arc::clone(&self.options);
        let url = loading_url.unwrap_or(&observed.url);
        let window_id = observed.window_id;

        if options.whitelist.matches(url) {
            debug!(tab_id = %observed.id, "Whitelisted URL; skipping detection");
            if observed.is_complete() {
                self.schedule_refresh(Some(window_id));
            }
            return;
        }

        let query = observed_query(observed, url, &options, complete_only);
        let candidates = match self.host.enumerate_tabs(&query) {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(tab_id = %observed.id, error = %err, "Failed to query tabs; skipping detection");
                return;
            }
        };

        // Pairwise elimination leaves the focus rule out; only sweeps use it.
        match find_duplicates_of_observed(observed, url, &candidates, &self.store, &options, None) {
            ObservedScan::Alone => {}
            ObservedScan::NoMatch => {
                if self.store.has_duplicates(window_id) {
                    self.schedule_refresh(Some(window_id));
                } else if observed.active {
                    let count = self.store.get_duplicate_count(window_id).to_string();
                    self.host.publish_duplicate_count(window_id, &count);
                }
            }
            ObservedScan::Matched(decisions) => {
                for decision in decisions {
                    let remaining = decision.remaining;
                    self.close_duplicate_tab(decision.closed, Some(remaining), remaining.window_id);
                }
            }
        }
    }

    /// Requests a close. Returns false when the host refused outright.
    fn close_duplicate_tab(
        &mut self,
        tab_id: TabId,
        remaining: Option<RemainingTab>,
        window_id: WindowId,
    ) -> bool {
        self.store.mark_ignored(tab_id, true);
        if let Err(err) = self.host.close_tab(tab_id) {
            warn!(tab_id = %tab_id, error = %err, "Close request failed");
            self.store.mark_ignored(tab_id, false);
            return false;
        }
        info!(tab_id = %tab_id, kept = ?remaining.map(|r| r.tab_id), "Closed duplicate tab");

        if self.store.exists(tab_id) {
            let due_at = self.clock.now() + Duration::milliseconds(CLOSE_GRACE_MS);
            self.verifications.push(PendingClose {
                tab_id,
                remaining,
                window_id,
                due_at,
            });
        } else if let Some(remaining) = remaining {
            self.schedule_remaining_tab(remaining);
        }
        true
    }

    fn verify_close(&mut self, pending: PendingClose) {
        if self.store.exists(pending.tab_id) {
            warn!(tab_id = %pending.tab_id, "Tab still open after close; resuming tracking");
            self.store.mark_ignored(pending.tab_id, false);
            self.schedule_refresh(Some(pending.window_id));
        } else if let Some(remaining) = pending.remaining {
            self.schedule_remaining_tab(remaining);
        }
    }

    fn schedule_remaining_tab(&mut self, remaining: RemainingTab) {
        let now = self.clock.now();
        if self.remaining.schedule(remaining, now) {
            debug!(tab_id = %remaining.tab_id, "Superseded pending remaining-tab action");
        }
    }

    fn handle_remaining_tab(&mut self, remaining: RemainingTab) {
        if !self.store.exists(remaining.tab_id) {
            return;
        }
        let action = self.options.on_remaining_tab;
        let result = match action {
            RemainingTabAction::Reposition if remaining.observed_tab_closed => {
                let mut result = Ok(());
                if remaining.tab_index > 0 {
                    result = self.host.move_tab(remaining.tab_id, remaining.tab_index);
                }
                if remaining.active {
                    result = result.and(self.host.activate_tab(remaining.tab_id));
                }
                result
            }
            RemainingTabAction::Reposition => Ok(()),
            RemainingTabAction::Activate => {
                self.host.focus_tab(remaining.tab_id, remaining.window_id)
            }
        };
        if let Err(err) = result {
            warn!(tab_id = %remaining.tab_id, error = %err, "Failed to restore remaining tab");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reporting
    // ─────────────────────────────────────────────────────────────────────────────

    /// Report-mode scan of one window (or every window in all-window scope).
    pub fn scan(&self, window_id: Option<WindowId>) -> Result<DuplicateReport> {
        let query = report_query(window_id, &self.options);
        let tabs = self
            .host
            .enumerate_tabs(&query)
            .map_err(|source| DedupError::Host {
                op: "enumerate_tabs",
                source,
            })?;
        let active_window_id = self.host.get_active_window_id();
        Ok(group_duplicates(
            &tabs,
            &self.store,
            &self.options,
            active_window_id,
        ))
    }

    /// Closes every duplicate in scope, keeping one tab per cluster.
    pub fn close_duplicate_tabs(&mut self, window_id: Option<WindowId>) -> Result<Vec<TabId>> {
        let options = Arc::clone(&self.options);
        let query = report_query(window_id, &options);
        let tabs = self
            .host
            .enumerate_tabs(&query)
            .map_err(|source| DedupError::Host {
                op: "enumerate_tabs",
                source,
            })?;
        let active_window_id = self.host.get_active_window_id();

        let mut closed = Vec::new();
        for tab_id in plan_sweep(&tabs, &self.store, &options, active_window_id) {
            let Some(window_id) = tabs.iter().find(|tab| tab.id == tab_id).map(|tab| tab.window_id)
            else {
                continue;
            };
            if self.close_duplicate_tab(tab_id, None, window_id) {
                closed.push(tab_id);
            }
        }
        info!(closed = closed.len(), "Duplicate sweep finished");
        Ok(closed)
    }

    fn schedule_refresh(&mut self, window_id: Option<WindowId>) {
        let now = self.clock.now();
        if self.refresh.schedule(window_id, now) {
            debug!("Superseded pending refresh");
        }
    }

    /// Refreshes every window's count. Outside all-window scope each window
    /// schedules its own refresh and the debouncer keeps only the last one.
    pub fn refresh_global(&mut self) {
        if self.options.scope.all_windows {
            self.schedule_refresh(None);
        } else {
            for window_id in self.host.list_windows() {
                self.schedule_refresh(Some(window_id));
            }
        }
    }

    fn refresh_duplicate_tabs_info(&mut self, window_id: Option<WindowId>) {
        let report = match self.scan(window_id) {
            Ok(report) => report,
            Err(err) => {
                warn!(error = %err, "Failed to refresh duplicate tabs");
                return;
            }
        };
        let count = report.duplicate_count();
        let all_windows = self.options.scope.all_windows;

        let windows = if all_windows {
            self.host.list_windows()
        } else {
            window_id.into_iter().collect()
        };
        for window in windows {
            self.store.set_duplicate_count(window, count);
            let text = self.store.get_duplicate_count(window).to_string();
            self.host.publish_duplicate_count(window, &text);
        }

        if all_windows || (window_id.is_some() && window_id == report.active_window_id) {
            let rows = report.to_panel_rows();
            let target = if all_windows { None } else { window_id };
            self.host.publish_report(target, &rows);
        }
        info!(window_id = ?window_id, duplicates = count, "Refreshed duplicate tabs");
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // UI Requests
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn handle_request(&mut self, request: Request) -> Response {
        if request.protocol_version != PROTOCOL_VERSION {
            return Response::error(
                request.id,
                "unsupported_version",
                "unsupported protocol version",
            );
        }

        match request.method {
            Method::GetDuplicateTabs => {
                let params = match request.window_params() {
                    Ok(params) => params,
                    Err(err) => return Response::error_with_info(request.id, err),
                };
                let window_id = params.window_id.or_else(|| self.host.get_active_window_id());
                match self.scan(window_id) {
                    Ok(report) => {
                        let rows = report.to_panel_rows();
                        self.host.publish_report(window_id, &rows);
                        debug!(rows = rows.len(), "Duplicate tabs requested");
                        Response::ok(
                            request.id,
                            json!({
                                "duplicateTabs": rows,
                                "activeWindowId": report.active_window_id,
                            }),
                        )
                    }
                    Err(err) => Response::error(request.id, "host_error", err.to_string()),
                }
            }
            Method::CloseDuplicateTabs => {
                let params = match request.window_params() {
                    Ok(params) => params,
                    Err(err) => return Response::error_with_info(request.id, err),
                };
                let window_id = params.window_id.or_else(|| self.host.get_active_window_id());
                match self.close_duplicate_tabs(window_id) {
                    Ok(closed) => Response::ok(request.id, json!({ "closed": closed })),
                    Err(err) => Response::error(request.id, "host_error", err.to_string()),
                }
            }
            Method::GetStoredOptions => match serde_json::to_value(&self.stored) {
                Ok(value) => Response::ok(request.id, value),
                Err(err) => Response::error(
                    request.id,
                    "serialization_error",
                    format!("Failed to serialize options: {}", err),
                ),
            },
            Method::SetStoredOption => {
                let params = match request.set_option_params() {
                    Ok(params) => params,
                    Err(err) => return Response::error_with_info(request.id, err),
                };
                match self.set_stored_option(&params.name, params.value, params.refresh) {
                    Ok(()) => Response::ok(request.id, json!({ "name": params.name })),
                    Err(err) => {
                        let code = match err {
                            DedupError::UnknownOption(_) => "unknown_option",
                            DedupError::InvalidOptionValue { .. }
                            | DedupError::InvalidWhitelistPattern { .. } => "invalid_option_value",
                            _ => "options_error",
                        };
                        Response::error(request.id, code, err.to_string())
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::scheduler::ManualClock;
    use tab_dedup_protocol::DEFAULT_CONTAINER_ID;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-31T00:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    fn tab(id: i64, url: &str) -> TabSnapshot {
        TabSnapshot {
            id: TabId(id),
            url: url.to_string(),
            title: String::new(),
            pinned: false,
            active: false,
            window_id: WindowId(1),
            container_id: DEFAULT_CONTAINER_ID.to_string(),
            index: id as u32,
            fav_icon_url: Some("https://icon".to_string()),
            incognito: false,
            status: TabStatus::Complete,
        }
    }

    #[test]
    fn start_seeds_store_and_schedules_refresh() {
        let host = MemoryHost::with_tabs(vec![tab(1, "https://a.com"), tab(2, "https://b.com")]);
        let clock = ManualClock::new(t0());
        let mut engine = DedupEngine::with_defaults(host, clock.clone());

        engine.start();
        assert_eq!(engine.store().len(), 2);
        assert_eq!(engine.store().last_complete_at(TabId(1)), Some(t0()));
        assert_eq!(
            engine.next_due_at(),
            Some(t0() + Duration::milliseconds(REFRESH_QUIET_MS))
        );
    }

    #[test]
    fn tick_before_deadline_does_nothing() {
        let host = MemoryHost::with_tabs(vec![tab(1, "https://a.com"), tab(2, "https://a.com")]);
        let clock = ManualClock::new(t0());
        let mut engine = DedupEngine::with_defaults(host, clock.clone());
        engine.start();

        clock.advance(Duration::milliseconds(REFRESH_QUIET_MS - 1));
        engine.tick();
        assert_eq!(engine.host().badge(WindowId(1)), None);

        clock.advance(Duration::milliseconds(1));
        engine.tick();
        assert_eq!(engine.host().badge(WindowId(1)), Some("1"));
        assert_eq!(engine.next_due_at(), None);
    }

    #[test]
    fn invalid_option_leaves_snapshot_untouched() {
        let clock = ManualClock::new(t0());
        let mut engine = DedupEngine::with_defaults(MemoryHost::new(), clock);
        let before = engine.options();

        let err = engine
            .set_stored_option("scope", json!("everywhere"), false)
            .expect_err("invalid scope");
        assert!(matches!(err, DedupError::InvalidOptionValue { .. }));
        assert!(Arc::ptr_eq(&before, &engine.options()));

        engine
            .set_stored_option("scope", json!("A"), false)
            .expect("valid scope");
        assert!(engine.options().scope.all_windows);
        assert!(!before.scope.all_windows);
    }

    #[test]
    fn wrong_protocol_version_is_rejected() {
        let clock = ManualClock::new(t0());
        let mut engine = DedupEngine::with_defaults(MemoryHost::new(), clock);
        let response = engine.handle_request(Request {
            protocol_version: 99,
            method: Method::GetStoredOptions,
            id: Some("r1".to_string()),
            params: None,
        });
        assert!(!response.ok);
        assert_eq!(
            response.error.map(|err| err.code),
            Some("unsupported_version".to_string())
        );
    }
}
