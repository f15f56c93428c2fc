//! Trailing-edge debouncing and the clock that drives it.
//!
//! A [`Debouncer`] owns one pending slot. Scheduling while a call is pending
//! replaces its arguments and pushes the deadline out, so a burst collapses
//! into a single execution carrying the last arguments. Nothing runs on its
//! own: the owner polls [`Debouncer::take_due`] with the current time, which
//! keeps tests fully deterministic.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Quiet window before a duplicate-count refresh runs.
pub const REFRESH_QUIET_MS: i64 = 300;
/// Quiet window before the surviving tab is refocused/repositioned.
pub const REMAINING_TAB_QUIET_MS: i64 = 500;
/// How long a requested close may take before it is considered abandoned.
pub const CLOSE_GRACE_MS: i64 = 10;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .lock()
            .map(|now| *now)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

#[derive(Debug)]
struct Pending<A> {
    args: A,
    due_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Debouncer<A> {
    quiet: Duration,
    pending: Option<Pending<A>>,
}

impl<A> Debouncer<A> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    pub fn with_millis(quiet_ms: i64) -> Self {
        Self::new(Duration::milliseconds(quiet_ms))
    }

    pub fn quiet(&self) -> Duration {
        self.quiet
    }

    /// Schedules a call; returns true when it superseded a pending one.
    pub fn schedule(&mut self, args: A, now: DateTime<Utc>) -> bool {
        let superseded = self.pending.is_some();
        self.pending = Some(Pending {
            args,
            due_at: now + self.quiet,
        });
        superseded
    }

    pub fn cancel_pending(&mut self) -> Option<A> {
        self.pending.take().map(|pending| pending.args)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.pending.as_ref().map(|pending| pending.due_at)
    }

    /// Hands out the pending arguments once the quiet window has elapsed.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Option<A> {
        match &self.pending {
            Some(pending) if now >= pending.due_at => self.pending.take().map(|p| p.args),
            _ => None,
        }
    }
}
