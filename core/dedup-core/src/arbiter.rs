//! Retention arbitration between two duplicate tabs.
//!
//! Rules run in order and the first one with an opinion decides:
//!
//! ```text
//! pinned   (keepPinnedTab)     pinned beats unpinned
//! scheme   (keepTabWithHttps)  https beats anything else
//! recency  (always)            older or newer completion time wins
//! focus    (after recency)     active tab of the active window may override recency
//! ```
//!
//! The outcome is a pure function of the two contenders and the context.

use chrono::{DateTime, Utc};
use tab_dedup_protocol::{TabId, TabSnapshot, WindowId};

use crate::config::DedupOptions;
use crate::normalizer::is_https_url;
use crate::types::{RemainingTab, RetentionDecision};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArbiterContext {
    pub keep_pinned_tab: bool,
    pub keep_tab_with_https: bool,
    pub keep_newer_tab: bool,
    pub active_window_id: Option<WindowId>,
}

impl ArbiterContext {
    pub fn from_options(options: &DedupOptions, active_window_id: Option<WindowId>) -> Self {
        Self {
            keep_pinned_tab: options.keep_pinned_tab,
            keep_tab_with_https: options.keep_tab_with_https,
            keep_newer_tab: options.keep_newer_tab,
            active_window_id,
        }
    }
}

/// One side of a comparison: the host snapshot plus what the engine knows.
#[derive(Debug, Clone, Copy)]
pub struct Contender<'a> {
    pub tab: &'a TabSnapshot,
    /// URL used for the scheme rule. For a tab that is about to navigate this
    /// is the destination rather than `tab.url`.
    pub url: &'a str,
    pub last_complete_at: Option<DateTime<Utc>>,
}

impl<'a> Contender<'a> {
    pub fn new(tab: &'a TabSnapshot, last_complete_at: Option<DateTime<Utc>>) -> Self {
        Self {
            tab,
            url: &tab.url,
            last_complete_at,
        }
    }

    pub fn with_url(mut self, url: &'a str) -> Self {
        self.url = url;
        self
    }
}

pub fn determine_retained_tab_id(
    observed: &Contender<'_>,
    candidate: &Contender<'_>,
    context: &ArbiterContext,
) -> TabId {
    if let Some(retained) = choose_by_pinned(observed, candidate, context.keep_pinned_tab) {
        return retained;
    }
    if let Some(retained) = choose_by_https(observed, candidate, context.keep_tab_with_https) {
        return retained;
    }
    let retained = choose_by_recency(observed, candidate, context.keep_newer_tab);
    choose_by_focus(observed, candidate, context.active_window_id, retained)
}

/// Arbitrates and describes the tab to close plus how to restore the survivor.
pub fn decide(
    observed: &Contender<'_>,
    candidate: &Contender<'_>,
    context: &ArbiterContext,
) -> RetentionDecision {
    let retained = determine_retained_tab_id(observed, candidate, context);
    if retained == observed.tab.id {
        RetentionDecision {
            retained,
            closed: candidate.tab.id,
            remaining: RemainingTab {
                observed_tab_closed: false,
                active: candidate.tab.active,
                tab_index: candidate.tab.index,
                tab_id: observed.tab.id,
                window_id: observed.tab.window_id,
            },
        }
    } else {
        RetentionDecision {
            retained,
            closed: observed.tab.id,
            remaining: RemainingTab {
                observed_tab_closed: true,
                active: observed.tab.active,
                tab_index: observed.tab.index,
                tab_id: candidate.tab.id,
                window_id: candidate.tab.window_id,
            },
        }
    }
}

fn choose_by_pinned(
    observed: &Contender<'_>,
    candidate: &Contender<'_>,
    keep_pinned_tab: bool,
) -> Option<TabId> {
    if !keep_pinned_tab || observed.tab.pinned == candidate.tab.pinned {
        return None;
    }
    Some(if observed.tab.pinned {
        observed.tab.id
    } else {
        candidate.tab.id
    })
}

fn choose_by_https(
    observed: &Contender<'_>,
    candidate: &Contender<'_>,
    keep_tab_with_https: bool,
) -> Option<TabId> {
    if !keep_tab_with_https {
        return None;
    }
    let observed_https = is_https_url(observed.url);
    if observed_https == is_https_url(candidate.url) {
        return None;
    }
    Some(if observed_https {
        observed.tab.id
    } else {
        candidate.tab.id
    })
}

fn choose_by_recency(
    observed: &Contender<'_>,
    candidate: &Contender<'_>,
    keep_newer_tab: bool,
) -> TabId {
    let (observed_id, candidate_id) = (observed.tab.id, candidate.tab.id);
    match (observed.last_complete_at, candidate.last_complete_at) {
        (None, None) => observed_id,
        // Newer mode: a tab that never completed loses. Older mode: it counts
        // as the older one and wins.
        (None, Some(_)) if keep_newer_tab => candidate_id,
        (None, Some(_)) => observed_id,
        (Some(_), None) if keep_newer_tab => observed_id,
        (Some(_), None) => candidate_id,
        (Some(observed_at), Some(candidate_at)) => {
            let observed_wins = if keep_newer_tab {
                observed_at > candidate_at
            } else {
                observed_at < candidate_at
            };
            if observed_wins {
                observed_id
            } else {
                candidate_id
            }
        }
    }
}

fn choose_by_focus(
    observed: &Contender<'_>,
    candidate: &Contender<'_>,
    active_window_id: Option<WindowId>,
    retained: TabId,
) -> TabId {
    let Some(active_window_id) = active_window_id else {
        return retained;
    };
    let observed_in_active_window = observed.tab.window_id == active_window_id;
    let candidate_in_active_window = candidate.tab.window_id == active_window_id;

    if retained == observed.tab.id {
        if candidate_in_active_window && (candidate.tab.active || !observed_in_active_window) {
            return candidate.tab.id;
        }
        return observed.tab.id;
    }

    if observed_in_active_window && (observed.tab.active || !candidate_in_active_window) {
        return observed.tab.id;
    }
    candidate.tab.id
}
