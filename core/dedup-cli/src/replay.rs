//! `tab-dedup replay`: drives the engine through a recorded event log.
//!
//! The clock follows each envelope's `recorded_at`. Debounced work that falls
//! due between two envelopes runs before the later one, and removals produced
//! by the engine's own closes are fed back the way a browser would deliver
//! them.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tab_dedup_core::{DedupEngine, DuplicateReport, ManualClock, MemoryHost, StoredOptions};
use tab_dedup_protocol::{EventEnvelope, TabId, TabSnapshot};

use crate::input::{self, Result};

/// Upper bound on feedback rounds after one envelope. Each round either closes
/// a tab or drains the schedulers, so a live engine settles well before this.
const MAX_SETTLE_ROUNDS: usize = 256;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    pub events: usize,
    pub closed: Vec<TabId>,
    pub remaining_tabs: usize,
    pub report: DuplicateReport,
}

pub fn run(tabs: &Path, events: &Path, options: Option<&Path>) -> Result<()> {
    let tabs = input::load_tabs(tabs)?;
    let envelopes = input::load_events(events)?;
    let stored = input::load_options(options)?;

    let outcome = replay(tabs, &envelopes, stored)?;
    tracing::info!(
        events = outcome.events,
        closed = outcome.closed.len(),
        "Replay finished"
    );
    input::print_json(&outcome)
}

pub fn replay(
    tabs: Vec<TabSnapshot>,
    envelopes: &[EventEnvelope],
    stored: StoredOptions,
) -> Result<ReplayOutcome> {
    let start = envelopes
        .iter()
        .find_map(EventEnvelope::recorded_at_utc)
        .unwrap_or_else(Utc::now);
    let clock = ManualClock::new(start);
    let mut engine = DedupEngine::new(MemoryHost::with_tabs(tabs), clock.clone(), stored)?;
    engine.start();

    for envelope in envelopes {
        let at = envelope.recorded_at_utc().unwrap_or(start);
        run_due_until(&mut engine, &clock, Some(at));
        clock.set(at);

        engine.host_mut().apply_event(&envelope.event);
        if let Err(info) = engine.handle_envelope(envelope) {
            tracing::warn!(
                event_id = %envelope.event_id,
                code = %info.code,
                "Skipping rejected event"
            );
            continue;
        }
        feed_back(&mut engine);
    }
    run_due_until(&mut engine, &clock, None);

    let report = engine.scan(None)?;
    Ok(ReplayOutcome {
        events: envelopes.len(),
        closed: engine.host().closed().to_vec(),
        remaining_tabs: engine.host().tabs().len(),
        report,
    })
}

/// Runs scheduled work due at or before `until` (everything when `None`),
/// advancing the clock to each deadline in turn.
fn run_due_until(
    engine: &mut DedupEngine<MemoryHost, ManualClock>,
    clock: &ManualClock,
    until: Option<DateTime<Utc>>,
) {
    for _ in 0..MAX_SETTLE_ROUNDS {
        let Some(due) = engine.next_due_at() else {
            return;
        };
        if until.is_some_and(|until| due > until) {
            return;
        }
        clock.set(due);
        engine.tick();
        feed_back(engine);
    }
    tracing::warn!("Scheduled work did not settle; stopping replay flush");
}

fn feed_back(engine: &mut DedupEngine<MemoryHost, ManualClock>) {
    for _ in 0..MAX_SETTLE_ROUNDS {
        let events = engine.host_mut().drain_events();
        if events.is_empty() {
            return;
        }
        for event in &events {
            engine.handle_event(event);
        }
    }
}
