// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undo/redo history of performed actions.
//!
//! Actions are grouped: every action enacted while an [`UndoScope`] is open
//! joins the scope's group. Anything else is folded into the most recent
//! action when that action accepts it, and forms a group of its own otherwise.
//! A history with a maximum depth of zero records nothing, so actions run
//! without being undoable.

use crate::action::ActionEntry;
use crate::graph::Graph;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default maximum undo history depth
pub const DEFAULT_HISTORY_DEPTH: usize = 100;

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Actions that are undone/redone together
#[derive(Debug)]
pub struct ActionGroup {
    /// Group ID
    pub id: u64,
    /// Human-readable description
    pub description: String,
    /// Consecutive groups with the same merge group collapse into one
    pub merge_group: Option<String>,
    /// Actions in the order they were performed
    pub(crate) actions: Vec<ActionEntry>,
    /// Timestamp
    pub timestamp: u64,
}

impl ActionGroup {
    fn new(id: u64, description: String, merge_group: Option<String>) -> Self {
        Self {
            id,
            description,
            merge_group,
            actions: Vec::new(),
            timestamp: now(),
        }
    }

    /// Add an action, folding it into the previous one when possible
    fn add(&mut self, entry: ActionEntry) {
        let merged = self
            .actions
            .last_mut()
            .is_some_and(|last| last.try_merge(&entry));
        if !merged {
            self.actions.push(entry);
        }
    }

    /// Number of actions
    pub fn count(&self) -> usize {
        self.actions.len()
    }
}

/// History statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    /// Groups in the undo stack
    pub undo_count: usize,
    /// Groups in the redo stack
    pub redo_count: usize,
    /// Maximum history depth
    pub max_depth: usize,
}

struct OpenScope {
    group: ActionGroup,
    depth: usize,
}

/// Undo/redo history manager
pub struct History {
    undo_stack: VecDeque<ActionGroup>,
    redo_stack: VecDeque<ActionGroup>,
    next_id: u64,
    max_depth: usize,
    open: Option<OpenScope>,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl History {
    /// Create a history with the default depth
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_HISTORY_DEPTH)
    }

    /// Create with custom maximum depth
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            next_id: 1,
            max_depth,
            open: None,
        }
    }

    /// True if performed actions are recorded
    pub fn is_tracking(&self) -> bool {
        self.max_depth > 0
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn open_scope(&mut self, description: &str, merge_group: Option<String>) {
        match &mut self.open {
            Some(open) => open.depth += 1,
            None => {
                let id = self.next_id();
                self.open = Some(OpenScope {
                    group: ActionGroup::new(id, description.to_string(), merge_group),
                    depth: 1,
                });
            }
        }
    }

    pub(crate) fn close_scope(&mut self) {
        let Some(open) = &mut self.open else {
            tracing::warn!("Closing an undo scope that was never opened");
            return;
        };
        open.depth -= 1;
        if open.depth == 0 {
            if let Some(open) = self.open.take() {
                self.commit(open.group);
            }
        }
    }

    /// Record a performed action
    pub(crate) fn record(&mut self, entry: ActionEntry) {
        if !self.is_tracking() {
            return;
        }
        match &mut self.open {
            Some(open) => open.group.add(entry),
            None => {
                let merged = self
                    .undo_stack
                    .back_mut()
                    .and_then(|top| top.actions.last_mut())
                    .is_some_and(|last| last.try_merge(&entry));
                if merged {
                    self.redo_stack.clear();
                    return;
                }
                let id = self.next_id();
                let mut group = ActionGroup::new(id, entry.description(), None);
                group.add(entry);
                self.commit(group);
            }
        }
    }

    fn commit(&mut self, group: ActionGroup) {
        if group.actions.is_empty() {
            return;
        }

        self.redo_stack.clear();

        let merge_group = group.merge_group.clone();
        if let (Some(merge_group), Some(top)) = (merge_group, self.undo_stack.back_mut()) {
            if top.merge_group.as_deref() == Some(merge_group.as_str()) {
                for entry in group.actions {
                    top.add(entry);
                }
                return;
            }
        }

        self.undo_stack.push_back(group);
        while self.undo_stack.len() > self.max_depth {
            if let Some(old) = self.undo_stack.pop_front() {
                tracing::debug!("Evicted undo group '{}'", old.description);
            }
        }
    }

    pub(crate) fn take_undo(&mut self) -> Option<ActionGroup> {
        self.undo_stack.pop_back()
    }

    pub(crate) fn take_redo(&mut self) -> Option<ActionGroup> {
        self.redo_stack.pop_back()
    }

    pub(crate) fn push_undo(&mut self, group: ActionGroup) {
        self.undo_stack.push_back(group);
    }

    pub(crate) fn push_redo(&mut self, group: ActionGroup) {
        self.redo_stack.push_back(group);
    }

    /// Check if undo is available
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Check if redo is available
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Description of the next undo
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|g| g.description.as_str())
    }

    /// Description of the next redo
    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|g| g.description.as_str())
    }

    /// Clear all history
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Get history statistics
    pub fn stats(&self) -> HistoryStats {
        HistoryStats {
            undo_count: self.undo_stack.len(),
            redo_count: self.redo_stack.len(),
            max_depth: self.max_depth,
        }
    }
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History").field("stats", &self.stats()).finish()
    }
}

/// Groups the actions enacted on a graph while it lives
pub struct UndoScope<'g> {
    graph: &'g Graph,
}

impl<'g> UndoScope<'g> {
    pub(crate) fn new(graph: &'g Graph, description: &str, merge_group: Option<String>) -> Self {
        graph.shared.history.lock().open_scope(description, merge_group);
        Self { graph }
    }
}

impl Drop for UndoScope<'_> {
    fn drop(&mut self) {
        self.graph.shared.history.lock().close_scope();
    }
}
