//! Duplicate detection over a scope of host tabs.
//!
//! Report mode ([`group_duplicates`]) and the bulk sweep ([`plan_sweep`]) are
//! two pure folds over the same [`Bucketer`]. Eliminate mode
//! ([`find_duplicates_of_observed`]) compares one freshly changed tab against
//! the tabs a narrowed host query returned.

use std::collections::HashMap;

use tab_dedup_protocol::{TabId, TabSnapshot, TabStatus, WindowId};
use tracing::debug;

use crate::arbiter::{decide, ArbiterContext, Contender};
use crate::config::DedupOptions;
use crate::host::TabQuery;
use crate::normalizer::{get_match_pattern_url, get_matching_url};
use crate::state::TabStateStore;
use crate::types::{DuplicateCluster, DuplicateGroup, DuplicateReport, MatchingKey, RetentionDecision};

// ═══════════════════════════════════════════════════════════════════════════════
// Keys
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabKeys {
    pub url: MatchingKey,
    /// Present only when title matching is on and the tab finished loading.
    pub title: Option<MatchingKey>,
}

pub fn tab_keys(tab: &TabSnapshot, options: &DedupOptions) -> TabKeys {
    let container = options
        .scope
        .per_container
        .then_some(tab.container_id.as_str());
    let url = MatchingKey::for_url(&get_matching_url(&tab.url, &options.url_matching()), container);
    let title = (options.compare_with_title && tab.is_complete())
        .then(|| MatchingKey::for_title(&tab.title, container));
    TabKeys { url, title }
}

/// Tabs that are still loading `about:blank` carry no information yet.
fn is_placeholder(tab: &TabSnapshot) -> bool {
    tab.is_blank() && !tab.is_complete()
}

fn titles_match(a: &TabSnapshot, b: &TabSnapshot, options: &DedupOptions) -> bool {
    options.compare_with_title && a.is_complete() && b.is_complete() && a.title == b.title
}

// ═══════════════════════════════════════════════════════════════════════════════
// Bucketing
// ═══════════════════════════════════════════════════════════════════════════════

/// A tab landed in a bucket that already had a reference.
#[derive(Debug)]
pub struct Collision<'a> {
    pub key: MatchingKey,
    pub reference: &'a TabSnapshot,
}

/// First-seen-wins index from key to bucket reference.
///
/// A tab that is still loading never becomes a URL reference, but it can still
/// collide with one.
#[derive(Debug)]
pub struct Bucketer<'a> {
    options: &'a DedupOptions,
    references: HashMap<MatchingKey, &'a TabSnapshot>,
}

impl<'a> Bucketer<'a> {
    pub fn new(options: &'a DedupOptions) -> Self {
        Self {
            options,
            references: HashMap::new(),
        }
    }

    pub fn place(&mut self, tab: &'a TabSnapshot) -> Option<Collision<'a>> {
        let keys = tab_keys(tab, self.options);

        if let Some(reference) = self.references.get(&keys.url).copied() {
            return Some(Collision {
                key: keys.url,
                reference,
            });
        }
        if tab.is_complete() {
            self.references.insert(keys.url, tab);
        }

        let title_key = keys.title?;
        if let Some(reference) = self.references.get(&title_key).copied() {
            return Some(Collision {
                key: title_key,
                reference,
            });
        }
        self.references.insert(title_key, tab);
        None
    }

    /// Makes `tab` the reference of `key` (a sweep replaced the old one).
    pub fn replace(&mut self, key: MatchingKey, tab: &'a TabSnapshot) {
        self.references.insert(key, tab);
    }
}

/// Whether a tab may take part in any duplicate comparison. Placeholders,
/// tabs being closed or untracked, and whitelisted URLs never do.
fn is_eligible(tab: &TabSnapshot, store: &TabStateStore, options: &DedupOptions) -> bool {
    !is_placeholder(tab) && !store.is_ignored(tab.id) && !options.whitelist.matches(&tab.url)
}

fn eligible<'t>(
    tabs: &'t [TabSnapshot],
    store: &'t TabStateStore,
    options: &'t DedupOptions,
) -> impl Iterator<Item = &'t TabSnapshot> + 't {
    tabs.iter()
        .filter(move |tab| is_eligible(tab, store, options))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Report Mode
// ═══════════════════════════════════════════════════════════════════════════════

/// Groups the scope into clusters. Groups appear in the order their second
/// member was met; members keep enumeration order.
pub fn group_duplicates(
    tabs: &[TabSnapshot],
    store: &TabStateStore,
    options: &DedupOptions,
    active_window_id: Option<WindowId>,
) -> DuplicateReport {
    let mut bucketer = Bucketer::new(options);
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    let mut group_index: HashMap<MatchingKey, usize> = HashMap::new();

    for tab in eligible(tabs, store, options) {
        let Some(collision) = bucketer.place(tab) else {
            continue;
        };
        match group_index.get(&collision.key) {
            Some(&index) => groups[index].tabs.push(tab.clone()),
            None => {
                group_index.insert(collision.key.clone(), groups.len());
                groups.push(DuplicateGroup {
                    key: collision.key,
                    tabs: DuplicateCluster::new(collision.reference.clone(), tab.clone()),
                });
            }
        }
    }

    DuplicateReport {
        groups,
        active_window_id,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Bulk Sweep
// ═══════════════════════════════════════════════════════════════════════════════

/// Decides which tabs a "close all duplicates" pass closes: every collision
/// is arbitrated against the bucket reference and the loser goes. A losing
/// reference hands its bucket to the survivor, so a cluster of n tabs always
/// yields n - 1 closes.
pub fn plan_sweep(
    tabs: &[TabSnapshot],
    store: &TabStateStore,
    options: &DedupOptions,
    active_window_id: Option<WindowId>,
) -> Vec<TabId> {
    let context = ArbiterContext::from_options(options, active_window_id);
    let mut bucketer = Bucketer::new(options);
    let mut closes = Vec::new();

    for tab in eligible(tabs, store, options) {
        let Some(collision) = bucketer.place(tab) else {
            continue;
        };
        let observed = Contender::new(tab, store.last_complete_at(tab.id));
        let candidate = Contender::new(
            collision.reference,
            store.last_complete_at(collision.reference.id),
        );
        let decision = decide(&observed, &candidate, &context);
        debug!(
            key = %collision.key,
            retained = %decision.retained,
            closed = %decision.closed,
            "Sweep resolved duplicate"
        );
        if !decision.remaining.observed_tab_closed {
            bucketer.replace(collision.key, tab);
        }
        closes.push(decision.closed);
    }

    closes
}

// ═══════════════════════════════════════════════════════════════════════════════
// Eliminate Mode
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of comparing one observed tab with its scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedScan {
    /// The host query returned the observed tab alone (or nothing).
    Alone,
    /// Other tabs were in scope but none duplicated the observed tab.
    NoMatch,
    /// One decision per duplicate, in enumeration order. Once the observed
    /// tab loses, the tab that beat it is compared with the rest, so a
    /// cluster of n tabs always yields n - 1 decisions.
    Matched(Vec<RetentionDecision>),
}

/// Scope query for eliminate mode. `url` is the URL the observed tab is
/// (about to be) showing.
pub fn observed_query(
    observed: &TabSnapshot,
    url: &str,
    options: &DedupOptions,
    complete_only: bool,
) -> TabQuery {
    TabQuery {
        window_id: (!options.scope.all_windows).then_some(observed.window_id),
        status: complete_only.then_some(TabStatus::Complete),
        url: Some(get_match_pattern_url(url, &options.url_matching())),
        container_id: options
            .scope
            .per_container
            .then(|| observed.container_id.clone()),
    }
}

/// Scope query for report mode and sweeps. In-flight tabs are included.
pub fn report_query(window_id: Option<WindowId>, options: &DedupOptions) -> TabQuery {
    TabQuery {
        window_id: window_id.filter(|_| !options.scope.all_windows),
        ..TabQuery::default()
    }
}

/// Finds duplicates of `observed` among `candidates` and arbitrates each pair.
///
/// `url` overrides the observed tab's URL when it is about to navigate; in
/// that case `observed_last_complete` is normally `None`.
pub fn find_duplicates_of_observed(
    observed: &TabSnapshot,
    url: &str,
    candidates: &[TabSnapshot],
    store: &TabStateStore,
    options: &DedupOptions,
    active_window_id: Option<WindowId>,
) -> ObservedScan {
    if candidates.len() <= 1 {
        return ObservedScan::Alone;
    }

    let matching = options.url_matching();
    let observed_key = get_matching_url(url, &matching);
    let context = ArbiterContext::from_options(options, active_window_id);
    // The tab every further duplicate is arbitrated against. It starts as the
    // observed tab and moves to whichever tab beats the current one.
    let mut reference =
        Contender::new(observed, store.last_complete_at(observed.id)).with_url(url);
    let mut decisions = Vec::new();

    for candidate in candidates
        .iter()
        .filter(|candidate| candidate.id != observed.id && is_eligible(candidate, store, options))
    {
        let same_url = get_matching_url(&candidate.url, &matching) == observed_key;
        if !same_url && !titles_match(candidate, observed, options) {
            continue;
        }

        let contender = Contender::new(candidate, store.last_complete_at(candidate.id));
        let decision = decide(&reference, &contender, &context);
        debug!(
            observed = %observed.id,
            reference = %reference.tab.id,
            candidate = %candidate.id,
            retained = %decision.retained,
            "Duplicate found"
        );
        if decision.remaining.observed_tab_closed {
            reference = contender;
        }
        decisions.push(decision);
    }

    if decisions.is_empty() {
        ObservedScan::NoMatch
    } else {
        ObservedScan::Matched(decisions)
    }
}
