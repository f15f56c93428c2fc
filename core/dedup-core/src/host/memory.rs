//! In-memory [`TabHost`] used by tests and the offline CLI.
//!
//! Closing a tab removes it and queues the matching `Removed` event instead of
//! delivering it, the same way a real browser reports removal asynchronously.
//! Drivers pull queued events with [`MemoryHost::drain_events`] and feed them
//! back into the engine.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tab_dedup_protocol::{
    DuplicateTabEntry, TabEvent, TabId, TabSnapshot, TabStatus, WindowId, TOP_FRAME_ID,
};

use super::{TabHost, TabQuery};
use crate::error::HostError;

#[derive(Debug, Default)]
pub struct MemoryHost {
    tabs: Vec<TabSnapshot>,
    active_window_id: Option<WindowId>,
    events: VecDeque<TabEvent>,
    /// Close requests for these tabs fail outright.
    rejected_closes: HashSet<TabId>,
    /// Close requests for these tabs succeed but the tab stays open, like a
    /// page holding a "leave site?" prompt.
    sticky_tabs: HashSet<TabId>,
    closed: Vec<TabId>,
    moved: Vec<(TabId, u32)>,
    activated: Vec<TabId>,
    focused: Vec<(TabId, WindowId)>,
    badges: HashMap<WindowId, String>,
    reports: Vec<(Option<WindowId>, Vec<DuplicateTabEntry>)>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the host. The active window defaults to the window of the first
    /// active tab.
    pub fn with_tabs(tabs: Vec<TabSnapshot>) -> Self {
        let active_window_id = tabs.iter().find(|tab| tab.active).map(|tab| tab.window_id);
        Self {
            tabs,
            active_window_id,
            ..Self::default()
        }
    }

    pub fn set_active_window(&mut self, window_id: Option<WindowId>) {
        self.active_window_id = window_id;
    }

    /// Adds or replaces a tab without emitting any event.
    pub fn upsert_tab(&mut self, tab: TabSnapshot) {
        match self.tabs.iter_mut().find(|existing| existing.id == tab.id) {
            Some(existing) => *existing = tab,
            None => self.tabs.push(tab),
        }
    }

    /// Mirrors an externally recorded event into host state without queuing
    /// anything. Replays use this so enumeration sees what the browser saw.
    pub fn apply_event(&mut self, event: &TabEvent) {
        match event {
            TabEvent::Created { tab } | TabEvent::Updated { tab, .. } => {
                self.upsert_tab(tab.clone())
            }
            TabEvent::Completed { tab_id, frame_id } if *frame_id == TOP_FRAME_ID => {
                if let Some(tab) = self.tabs.iter_mut().find(|tab| tab.id == *tab_id) {
                    tab.status = TabStatus::Complete;
                }
            }
            TabEvent::Removed { tab_id, .. } => {
                if let Some(position) = self.tabs.iter().position(|tab| tab.id == *tab_id) {
                    let removed = self.tabs.remove(position);
                    self.reindex_window(removed.window_id);
                }
            }
            TabEvent::Activated { tab_id, window_id } => {
                for tab in self.tabs.iter_mut().filter(|tab| tab.window_id == *window_id) {
                    tab.active = tab.id == *tab_id;
                }
                self.active_window_id = Some(*window_id);
            }
            _ => {}
        }
    }

    pub fn reject_close(&mut self, tab_id: TabId) {
        self.rejected_closes.insert(tab_id);
    }

    pub fn keep_open_on_close(&mut self, tab_id: TabId) {
        self.sticky_tabs.insert(tab_id);
    }

    pub fn drain_events(&mut self) -> Vec<TabEvent> {
        self.events.drain(..).collect()
    }

    pub fn tabs(&self) -> &[TabSnapshot] {
        &self.tabs
    }

    pub fn tab(&self, tab_id: TabId) -> Option<&TabSnapshot> {
        self.tabs.iter().find(|tab| tab.id == tab_id)
    }

    pub fn closed(&self) -> &[TabId] {
        &self.closed
    }

    pub fn moved(&self) -> &[(TabId, u32)] {
        &self.moved
    }

    pub fn activated(&self) -> &[TabId] {
        &self.activated
    }

    pub fn focused(&self) -> &[(TabId, WindowId)] {
        &self.focused
    }

    pub fn badge(&self, window_id: WindowId) -> Option<&str> {
        self.badges.get(&window_id).map(String::as_str)
    }

    pub fn reports(&self) -> &[(Option<WindowId>, Vec<DuplicateTabEntry>)] {
        &self.reports
    }

    fn reindex_window(&mut self, window_id: WindowId) {
        let mut order: Vec<usize> = (0..self.tabs.len())
            .filter(|&i| self.tabs[i].window_id == window_id)
            .collect();
        order.sort_by_key(|&i| self.tabs[i].index);
        for (index, i) in order.into_iter().enumerate() {
            self.tabs[i].index = index as u32;
        }
    }
}

impl TabHost for MemoryHost {
    fn enumerate_tabs(&self, query: &TabQuery) -> Result<Vec<TabSnapshot>, HostError> {
        Ok(self
            .tabs
            .iter()
            .filter(|tab| query.matches(tab))
            .cloned()
            .collect())
    }

    fn get_tab(&self, tab_id: TabId) -> Option<TabSnapshot> {
        self.tab(tab_id).cloned()
    }

    fn close_tab(&mut self, tab_id: TabId) -> Result<(), HostError> {
        if self.rejected_closes.contains(&tab_id) {
            return Err(HostError::Rejected {
                tab_id,
                reason: "close blocked".to_string(),
            });
        }
        let position = self
            .tabs
            .iter()
            .position(|tab| tab.id == tab_id)
            .ok_or(HostError::TabNotFound(tab_id))?;
        self.closed.push(tab_id);
        if self.sticky_tabs.contains(&tab_id) {
            return Ok(());
        }

        let removed = self.tabs.remove(position);
        self.reindex_window(removed.window_id);
        let is_window_closing = !self.tabs.iter().any(|tab| tab.window_id == removed.window_id);
        self.events.push_back(TabEvent::Removed {
            tab_id,
            window_id: removed.window_id,
            is_window_closing,
        });
        Ok(())
    }

    fn move_tab(&mut self, tab_id: TabId, index: u32) -> Result<(), HostError> {
        let window_id = self.tab(tab_id).ok_or(HostError::TabNotFound(tab_id))?.window_id;
        let mut order: Vec<TabId> = {
            let mut window_tabs: Vec<&TabSnapshot> = self
                .tabs
                .iter()
                .filter(|tab| tab.window_id == window_id)
                .collect();
            window_tabs.sort_by_key(|tab| tab.index);
            window_tabs.into_iter().map(|tab| tab.id).collect()
        };
        order.retain(|id| *id != tab_id);
        let target = (index as usize).min(order.len());
        order.insert(target, tab_id);
        for tab in self.tabs.iter_mut().filter(|tab| tab.window_id == window_id) {
            if let Some(position) = order.iter().position(|id| *id == tab.id) {
                tab.index = position as u32;
            }
        }
        self.moved.push((tab_id, index));
        Ok(())
    }

    fn activate_tab(&mut self, tab_id: TabId) -> Result<(), HostError> {
        let window_id = self.tab(tab_id).ok_or(HostError::TabNotFound(tab_id))?.window_id;
        for tab in self.tabs.iter_mut().filter(|tab| tab.window_id == window_id) {
            tab.active = tab.id == tab_id;
        }
        self.activated.push(tab_id);
        Ok(())
    }

    fn focus_tab(&mut self, tab_id: TabId, window_id: WindowId) -> Result<(), HostError> {
        self.activate_tab(tab_id)?;
        self.active_window_id = Some(window_id);
        self.focused.push((tab_id, window_id));
        Ok(())
    }

    fn get_active_window_id(&self) -> Option<WindowId> {
        self.active_window_id
    }

    fn list_windows(&self) -> Vec<WindowId> {
        self.tabs
            .iter()
            .map(|tab| tab.window_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn publish_duplicate_count(&mut self, window_id: WindowId, count: &str) {
        self.badges.insert(window_id, count.to_string());
    }

    fn publish_report(&mut self, window_id: Option<WindowId>, rows: &[DuplicateTabEntry]) {
        self.reports.push((window_id, rows.to_vec()));
    }
}
