//! End-to-end engine tests against the in-memory host and a manual clock.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tab_dedup_core::{Clock, DedupEngine, ManualClock, MemoryHost, TabHost};
use tab_dedup_protocol::{
    EventEnvelope, Method, Request, TabEvent, TabId, TabSnapshot, TabStatus, WindowId,
    DEFAULT_CONTAINER_ID, PROTOCOL_VERSION,
};

const W1: WindowId = WindowId(1);

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-31T09:00:00Z")
        .expect("timestamp")
        .with_timezone(&Utc)
}

fn tab(id: i64, url: &str, index: u32) -> TabSnapshot {
    TabSnapshot {
        id: TabId(id),
        url: url.to_string(),
        title: format!("Tab {}", id),
        pinned: false,
        active: false,
        window_id: W1,
        container_id: DEFAULT_CONTAINER_ID.to_string(),
        index,
        fav_icon_url: Some(format!("https://icons.test/{}.png", id)),
        incognito: false,
        status: TabStatus::Complete,
    }
}

fn active(mut tab: TabSnapshot) -> TabSnapshot {
    tab.active = true;
    tab
}

struct Harness {
    engine: DedupEngine<MemoryHost, ManualClock>,
    clock: ManualClock,
}

impl Harness {
    fn new(tabs: Vec<TabSnapshot>, options: &[(&str, Value)]) -> Self {
        let clock = ManualClock::new(t0());
        let mut engine = DedupEngine::with_defaults(MemoryHost::with_tabs(tabs), clock.clone());
        for (name, value) in options {
            engine
                .set_stored_option(name, value.clone(), false)
                .expect("option");
        }
        engine.start();
        let mut harness = Self { engine, clock };
        harness.settle();
        harness
    }

    fn host(&self) -> &MemoryHost {
        self.engine.host()
    }

    fn send(&mut self, event: TabEvent) {
        self.engine.handle_event(&event);
    }

    /// Opens a tab the way a browser does: created while loading, then
    /// completed a second later.
    fn open(&mut self, tab: TabSnapshot) {
        self.clock.advance(Duration::seconds(1));
        let mut loading = tab.clone();
        loading.status = TabStatus::Loading;
        self.engine.host_mut().upsert_tab(loading.clone());
        self.send(TabEvent::Created { tab: loading });
        self.engine.host_mut().upsert_tab(tab.clone());
        self.send(TabEvent::Completed {
            tab_id: tab.id,
            frame_id: 0,
        });
    }

    /// Feeds host notifications back and runs timers until nothing is pending.
    fn settle(&mut self) {
        for _ in 0..64 {
            for event in self.engine.host_mut().drain_events() {
                self.engine.handle_event(&event);
            }
            let Some(due_at) = self.engine.next_due_at() else {
                return;
            };
            if due_at > self.clock.now() {
                self.clock.set(due_at);
            }
            self.engine.tick();
        }
        panic!("engine never went idle");
    }

    fn request(&mut self, method: Method, params: Option<Value>) -> tab_dedup_protocol::Response {
        self.engine.handle_request(Request {
            protocol_version: PROTOCOL_VERSION,
            method,
            id: Some("req-1".to_string()),
            params,
        })
    }
}

#[test]
fn test_new_duplicate_is_closed_and_survivor_focused() {
    let mut harness = Harness::new(vec![active(tab(1, "https://a.com", 0))], &[]);
    assert_eq!(harness.host().badge(W1), Some("0"));

    harness.open(tab(2, "https://a.com/", 1));
    assert_eq!(harness.host().closed(), &[TabId(2)]);
    assert!(harness.engine.store().is_ignored(TabId(2)));

    harness.settle();
    assert!(!harness.engine.store().exists(TabId(2)));
    assert_eq!(harness.host().focused(), &[(TabId(1), W1)]);
    assert!(harness.host().moved().is_empty());
}

#[test]
fn test_reposition_mode_moves_and_activates_survivor() {
    let mut harness = Harness::new(
        vec![tab(1, "https://a.com", 0), active(tab(3, "https://b.com", 1))],
        &[("onRemainingTab", json!("B"))],
    );

    harness.open(active(tab(2, "https://a.com", 2)));
    harness.settle();

    assert_eq!(harness.host().closed(), &[TabId(2)]);
    assert_eq!(harness.host().moved(), &[(TabId(1), 2)]);
    assert_eq!(harness.host().activated(), &[TabId(1)]);
    assert!(harness.host().focused().is_empty());
    assert_eq!(harness.host().tab(TabId(1)).map(|t| t.active), Some(true));
}

#[test]
fn test_failed_close_reverts_ignored_flag() {
    let mut harness = Harness::new(vec![active(tab(1, "https://a.com", 0))], &[]);
    harness.engine.host_mut().reject_close(TabId(2));

    harness.open(tab(2, "https://a.com", 1));

    assert!(harness.host().closed().is_empty());
    assert!(harness.engine.store().exists(TabId(2)));
    assert!(!harness.engine.store().is_ignored(TabId(2)));
    assert!(harness.host().tab(TabId(1)).is_some());
    assert!(harness.host().tab(TabId(2)).is_some());
    assert_eq!(harness.engine.next_due_at(), None);
}

#[test]
fn test_close_that_never_happens_resumes_tracking() {
    let mut harness = Harness::new(vec![active(tab(1, "https://a.com", 0))], &[]);
    harness.engine.host_mut().keep_open_on_close(TabId(2));

    harness.open(tab(2, "https://a.com", 1));
    assert!(harness.engine.store().is_ignored(TabId(2)));

    harness.clock.advance(Duration::milliseconds(10));
    harness.engine.tick();
    assert!(!harness.engine.store().is_ignored(TabId(2)));

    harness.settle();
    // The refresh that follows sees both tabs again.
    assert_eq!(harness.host().badge(W1), Some("1"));
    assert!(harness.host().focused().is_empty());
}

#[test]
fn test_winning_observed_tab_closes_every_duplicate() {
    let mut harness = Harness::new(
        vec![active(tab(1, "https://a.com", 0)), tab(2, "https://a.com", 1)],
        &[],
    );

    let mut pinned = tab(3, "https://a.com", 2);
    pinned.pinned = true;
    harness.open(pinned);
    assert_eq!(harness.host().closed(), &[TabId(1), TabId(2)]);

    harness.settle();
    // Two remaining-tab actions collapsed into one.
    assert_eq!(harness.host().focused(), &[(TabId(3), W1)]);
    assert_eq!(harness.host().tabs().len(), 1);
}

#[test]
fn test_three_identical_tabs_sweep_closes_two() {
    let mut harness = Harness::new(
        vec![
            tab(1, "https://a.com", 0),
            tab(2, "https://a.com", 1),
            tab(3, "https://www.a.com/", 2),
        ],
        &[("onDuplicateTabDetected", json!("M"))],
    );
    assert_eq!(harness.host().badge(W1), Some("2"));

    let response = harness.request(Method::CloseDuplicateTabs, Some(json!({ "window_id": 1 })));
    assert!(response.ok);
    assert_eq!(response.data, Some(json!({ "closed": [2, 3] })));

    harness.settle();
    let remaining: Vec<TabId> = harness.host().tabs().iter().map(|t| t.id).collect();
    assert_eq!(remaining, vec![TabId(1)]);
    assert!(harness.host().focused().is_empty());
}

#[test]
fn test_whitelisted_duplicates_are_left_open() {
    let mut harness = Harness::new(
        vec![active(tab(1, "https://a.com/page", 0))],
        &[("whiteList", json!("https://a.com/*"))],
    );

    harness.open(tab(2, "https://a.com/page", 1));
    harness.settle();

    assert!(harness.host().closed().is_empty());
    assert_eq!(harness.host().badge(W1), Some("0"));
    let report = harness.engine.scan(Some(W1)).expect("scan");
    assert!(report.is_empty());
}

#[test]
fn test_manual_mode_only_refreshes_counts() {
    let mut harness = Harness::new(
        vec![active(tab(1, "https://a.com", 0))],
        &[("onDuplicateTabDetected", json!("M"))],
    );
    assert_eq!(harness.host().badge(W1), Some("0"));

    harness.open(tab(2, "https://a.com", 1));
    harness.settle();

    assert!(harness.host().closed().is_empty());
    assert_eq!(harness.host().badge(W1), Some("1"));
    let (window, rows) = harness.host().reports().last().expect("report");
    assert_eq!(*window, Some(W1));
    let ids: Vec<TabId> = rows.iter().map(|row| row.id).collect();
    assert_eq!(ids, vec![TabId(1), TabId(2)]);
}

#[test]
fn test_refresh_burst_collapses_to_single_run() {
    let mut harness = Harness::new(
        vec![
            active(tab(1, "https://a.com", 0)),
            tab(2, "https://a.com", 1),
            tab(3, "https://b.com", 2),
        ],
        &[("onDuplicateTabDetected", json!("M"))],
    );
    let before = harness.host().reports().len();

    for id in 1..=3 {
        harness.clock.advance(Duration::milliseconds(100));
        harness.send(TabEvent::Completed {
            tab_id: TabId(id),
            frame_id: 0,
        });
    }
    harness.clock.advance(Duration::milliseconds(299));
    harness.engine.tick();
    assert_eq!(harness.host().reports().len(), before);

    harness.settle();
    assert_eq!(harness.host().reports().len(), before + 1);
}

#[test]
fn test_navigation_into_duplicate_closes_navigating_tab_when_keeping_newer() {
    let mut harness = Harness::new(
        vec![
            active(tab(1, "https://a.com", 0)),
            tab(2, "https://b.com", 1),
            tab(3, "https://a.com", 2),
        ],
        &[("keepTabBasedOnAge", json!("N"))],
    );

    harness.send(TabEvent::BeforeNavigate {
        tab_id: TabId(2),
        frame_id: 0,
        url: "https://a.com/".to_string(),
    });

    // Tab 2 has no completion time after the reset and loses in newer mode.
    // Tabs 1 and 3 then tie on age and the later-listed tab is kept.
    assert_eq!(harness.host().closed(), &[TabId(2), TabId(1)]);
}

#[test]
fn test_subframe_and_unknown_tab_events_are_ignored() {
    let mut harness = Harness::new(
        vec![active(tab(1, "https://a.com", 0)), tab(2, "https://b.com", 1)],
        &[],
    );

    harness.send(TabEvent::BeforeNavigate {
        tab_id: TabId(2),
        frame_id: 3,
        url: "https://a.com".to_string(),
    });
    harness.send(TabEvent::Completed {
        tab_id: TabId(99),
        frame_id: 0,
    });
    harness.send(TabEvent::BeforeNavigate {
        tab_id: TabId::NONE,
        frame_id: 0,
        url: "https://a.com".to_string(),
    });

    assert!(harness.host().closed().is_empty());
    assert_eq!(harness.engine.next_due_at(), None);
}

#[test]
fn test_activated_tab_republishes_cached_count() {
    let mut harness = Harness::new(
        vec![active(tab(1, "https://a.com", 0)), tab(2, "https://a.com", 1)],
        &[("onDuplicateTabDetected", json!("M"))],
    );
    harness.engine.host_mut().publish_duplicate_count(W1, "stale");

    harness.send(TabEvent::Activated {
        tab_id: TabId(2),
        window_id: W1,
    });
    assert_eq!(harness.host().badge(W1), Some("1"));
}

#[test]
fn test_get_duplicate_tabs_request_returns_panel_rows() {
    let mut harness = Harness::new(
        vec![
            active(tab(1, "https://a.com", 0)),
            tab(2, "https://a.com", 1),
            tab(3, "https://b.com", 2),
        ],
        &[("onDuplicateTabDetected", json!("M"))],
    );

    let response = harness.request(Method::GetDuplicateTabs, None);
    assert!(response.ok);
    let data = response.data.expect("data");
    assert_eq!(data["activeWindowId"], json!(1));
    let rows = data["duplicateTabs"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["icon"], json!("https://icons.test/1.png"));
}

#[test]
fn test_set_stored_option_requests() {
    let mut harness = Harness::new(vec![active(tab(1, "https://a.com", 0))], &[]);

    let response = harness.request(
        Method::SetStoredOption,
        Some(json!({ "name": "badgeColor", "value": "#fff" })),
    );
    assert!(!response.ok);
    assert_eq!(
        response.error.map(|err| err.code),
        Some("unknown_option".to_string())
    );

    let response = harness.request(
        Method::SetStoredOption,
        Some(json!({ "name": "scope", "value": "A", "refresh": true })),
    );
    assert!(response.ok);
    assert!(harness.engine.options().scope.all_windows);
    assert!(harness.engine.next_due_at().is_some());

    let response = harness.request(Method::GetStoredOptions, None);
    let data = response.data.expect("data");
    assert_eq!(data["scope"]["value"], json!("A"));
}

#[test]
fn test_all_window_scope_spans_windows() {
    let mut other = tab(2, "https://a.com", 0);
    other.window_id = WindowId(2);
    let mut harness = Harness::new(
        vec![active(tab(1, "https://a.com", 0)), other],
        &[("scope", json!("A")), ("onDuplicateTabDetected", json!("M"))],
    );

    assert_eq!(harness.host().badge(W1), Some("1"));
    assert_eq!(harness.host().badge(WindowId(2)), Some("1"));

    harness.send(TabEvent::Removed {
        tab_id: TabId(2),
        window_id: WindowId(2),
        is_window_closing: true,
    });
    harness.engine.host_mut().close_tab(TabId(2)).expect("close");
    harness.engine.host_mut().drain_events();
    harness.settle();
    assert_eq!(harness.host().badge(W1), Some("0"));
}

#[test]
fn test_invalid_envelope_is_rejected_before_dispatch() {
    let mut harness = Harness::new(vec![active(tab(1, "https://a.com", 0))], &[]);
    let envelope = EventEnvelope {
        event_id: String::new(),
        recorded_at: "2026-01-31T09:00:00Z".to_string(),
        event: TabEvent::Attached { tab_id: TabId(1) },
    };
    let err = harness
        .engine
        .handle_envelope(&envelope)
        .expect_err("invalid envelope");
    assert_eq!(err.code, "invalid_event_id");
}

#[test]
fn test_third_identical_tab_leaves_one_survivor() {
    let mut harness = Harness::new(
        vec![tab(1, "https://a.com", 0), tab(2, "https://a.com", 1)],
        &[],
    );

    harness.open(tab(3, "https://a.com", 2));
    harness.settle();

    assert_eq!(harness.host().closed().len(), 2);
    assert_eq!(harness.host().closed()[0], TabId(3));
    assert_eq!(harness.host().tabs().len(), 1);
}

#[test]
fn test_whitelisted_tab_does_not_eliminate_duplicate() {
    let mut harness = Harness::new(
        vec![active(tab(1, "https://a.com/page", 0))],
        &[("whiteList", json!("https://a.com/page"))],
    );

    harness.open(tab(2, "http://a.com/page", 1));
    harness.settle();

    assert!(harness.host().closed().is_empty());
    let report = harness.engine.scan(Some(W1)).expect("scan");
    assert!(report.is_empty());
}

#[test]
fn test_same_title_on_other_path_closes_only_when_path_is_ignored() {
    let mut first = tab(1, "https://a.com/one", 0);
    first.title = "Inbox".to_string();
    let mut second = tab(2, "https://a.com/two", 1);
    second.title = "Inbox".to_string();

    let mut harness = Harness::new(
        vec![first.clone()],
        &[
            ("compareWithTitle", json!(true)),
            ("ignorePathPart", json!(true)),
        ],
    );
    harness.open(second.clone());
    harness.settle();
    assert_eq!(harness.host().closed(), &[TabId(2)]);

    // With the path kept the host query never returns the other tab.
    let mut harness = Harness::new(vec![first], &[("compareWithTitle", json!(true))]);
    harness.open(second);
    harness.settle();
    assert!(harness.host().closed().is_empty());
}

#[test]
fn test_container_scope_spares_tab_in_other_container() {
    let mut work = tab(1, "https://a.com", 0);
    work.container_id = "work".to_string();
    let mut harness = Harness::new(
        vec![work, tab(3, "https://a.com", 1)],
        &[("scope", json!("CC"))],
    );

    harness.open(tab(2, "https://a.com", 2));
    harness.settle();

    assert_eq!(harness.host().closed(), &[TabId(2)]);
    assert!(harness.host().tab(TabId(1)).is_some());
    assert!(harness.host().tab(TabId(3)).is_some());
}
