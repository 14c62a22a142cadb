// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undoable actions applied against the graph state.
//!
//! An [`ActionEntry`] tracks whether its action is done. Performing a done
//! action or reverting a pending one is a programming error reported as
//! `InvalidState`. Before either transition, background tasks reading the
//! action's subject are cancelled and awaited.

use crate::error::{GraphError, Result};
use crate::graph::{DetachedNode, DetachedPlug, Graph, GraphState};
use crate::node::{NodeBehavior, NodeId};
use crate::plug::{PlugId, PlugSpec};
use crate::value::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// What an action mutates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// The whole graph
    Graph,
    /// A single node
    Node(NodeId),
}

/// A do/undo pair
pub trait Action: Send + Sync + 'static {
    /// What the action mutates
    fn subject(&self) -> Subject;

    /// Human-readable description
    fn description(&self) -> String;

    /// Apply the change
    fn apply(&mut self, state: &mut GraphState) -> Result<()>;

    /// Revert the change
    fn revert(&mut self, state: &mut GraphState) -> Result<()>;

    /// True if background tasks reading the subject must stop first
    fn cancels_background_tasks(&self) -> bool {
        true
    }

    /// True if `other`, performed right after this action, can be folded
    /// into it
    fn can_merge(&self, other: &dyn Action) -> bool {
        let _ = other;
        false
    }

    /// Fold `other` into this action
    fn merge(&mut self, other: &dyn Action) {
        let _ = other;
    }

    /// Downcasting support for merging
    fn as_any(&self) -> &dyn Any;
}

/// An action and its done state
pub struct ActionEntry {
    action: Box<dyn Action>,
    done: bool,
}

impl ActionEntry {
    /// Wrap a pending action
    pub fn new(action: Box<dyn Action>) -> Self {
        Self { action, done: false }
    }

    /// True once performed
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Wrapped action
    pub fn action(&self) -> &dyn Action {
        self.action.as_ref()
    }

    /// Description of the wrapped action
    pub fn description(&self) -> String {
        self.action.description()
    }

    /// Pending to done
    pub fn perform(&mut self, graph: &Graph) -> Result<()> {
        if self.done {
            return Err(GraphError::InvalidState(format!(
                "'{}' is already done",
                self.action.description()
            )));
        }
        if self.action.cancels_background_tasks() {
            graph.cancel_affected_tasks(self.action.subject());
        }
        let mut state = graph.write();
        self.action.apply(&mut state)?;
        self.done = true;
        Ok(())
    }

    /// Done to pending
    pub fn revert(&mut self, graph: &Graph) -> Result<()> {
        if !self.done {
            return Err(GraphError::InvalidState(format!(
                "'{}' has not been done",
                self.action.description()
            )));
        }
        if self.action.cancels_background_tasks() {
            graph.cancel_affected_tasks(self.action.subject());
        }
        let mut state = graph.write();
        self.action.revert(&mut state)?;
        self.done = false;
        Ok(())
    }

    /// Fold a later, already performed entry into this one
    pub(crate) fn try_merge(&mut self, other: &ActionEntry) -> bool {
        if self.done && other.done && self.action.can_merge(other.action.as_ref()) {
            self.action.merge(other.action.as_ref());
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for ActionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionEntry")
            .field("description", &self.action.description())
            .field("done", &self.done)
            .finish()
    }
}

/// Set the literal value of an input
pub struct SetValueAction {
    node: NodeId,
    plug: PlugId,
    value: Value,
    previous: Option<Value>,
}

impl SetValueAction {
    /// Create the action
    pub fn new(node: NodeId, plug: PlugId, value: Value) -> Self {
        Self {
            node,
            plug,
            value,
            previous: None,
        }
    }
}

impl Action for SetValueAction {
    fn subject(&self) -> Subject {
        Subject::Node(self.node)
    }

    fn description(&self) -> String {
        "Set value".to_string()
    }

    fn apply(&mut self, state: &mut GraphState) -> Result<()> {
        let previous = state.set_value(self.plug, self.value.clone())?;
        if self.previous.is_none() {
            self.previous = Some(previous);
        }
        Ok(())
    }

    fn revert(&mut self, state: &mut GraphState) -> Result<()> {
        let previous = self
            .previous
            .clone()
            .ok_or_else(|| GraphError::InvalidState("no previous value recorded".into()))?;
        state.set_value(self.plug, previous)?;
        Ok(())
    }

    fn can_merge(&self, other: &dyn Action) -> bool {
        other
            .as_any()
            .downcast_ref::<SetValueAction>()
            .is_some_and(|other| other.plug == self.plug)
    }

    fn merge(&mut self, other: &dyn Action) {
        if let Some(other) = other.as_any().downcast_ref::<SetValueAction>() {
            self.value = other.value.clone();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Connect or disconnect an input
pub struct SetInputAction {
    node: NodeId,
    input: PlugId,
    source: Option<PlugId>,
    previous: Option<Option<PlugId>>,
}

impl SetInputAction {
    /// Create the action; `None` disconnects
    pub fn new(node: NodeId, input: PlugId, source: Option<PlugId>) -> Self {
        Self {
            node,
            input,
            source,
            previous: None,
        }
    }
}

impl Action for SetInputAction {
    fn subject(&self) -> Subject {
        Subject::Node(self.node)
    }

    fn description(&self) -> String {
        match self.source {
            Some(_) => "Connect".to_string(),
            None => "Disconnect".to_string(),
        }
    }

    fn apply(&mut self, state: &mut GraphState) -> Result<()> {
        let previous = match self.source {
            Some(source) => state.connect(self.input, source)?,
            None => state.disconnect(self.input)?,
        };
        if self.previous.is_none() {
            self.previous = Some(previous);
        }
        Ok(())
    }

    fn revert(&mut self, state: &mut GraphState) -> Result<()> {
        match self.previous {
            Some(Some(previous)) => {
                state.connect(self.input, previous)?;
            }
            Some(None) => {
                state.disconnect(self.input)?;
            }
            None => return Err(GraphError::InvalidState("no previous input recorded".into())),
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Add a node
pub struct AddNodeAction {
    id: NodeId,
    name: String,
    behavior: Arc<dyn NodeBehavior>,
    detached: Option<DetachedNode>,
}

impl AddNodeAction {
    /// Create the action
    pub fn new(id: NodeId, name: &str, behavior: Arc<dyn NodeBehavior>) -> Self {
        Self {
            id,
            name: name.to_string(),
            behavior,
            detached: None,
        }
    }
}

impl Action for AddNodeAction {
    fn subject(&self) -> Subject {
        Subject::Node(self.id)
    }

    fn description(&self) -> String {
        format!("Add node '{}'", self.name)
    }

    fn apply(&mut self, state: &mut GraphState) -> Result<()> {
        match self.detached.take() {
            Some(detached) => state.restore_node(detached),
            None => state.insert_node(self.id, &self.name, self.behavior.clone()).map(|_| ()),
        }
    }

    fn revert(&mut self, state: &mut GraphState) -> Result<()> {
        self.detached = Some(state.detach_node(self.id)?);
        Ok(())
    }

    fn cancels_background_tasks(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Remove a node
pub struct RemoveNodeAction {
    id: NodeId,
    detached: Option<DetachedNode>,
}

impl RemoveNodeAction {
    /// Create the action
    pub fn new(id: NodeId) -> Self {
        Self { id, detached: None }
    }
}

impl Action for RemoveNodeAction {
    fn subject(&self) -> Subject {
        Subject::Node(self.id)
    }

    fn description(&self) -> String {
        "Remove node".to_string()
    }

    fn apply(&mut self, state: &mut GraphState) -> Result<()> {
        self.detached = Some(state.detach_node(self.id)?);
        Ok(())
    }

    fn revert(&mut self, state: &mut GraphState) -> Result<()> {
        let detached = self
            .detached
            .take()
            .ok_or_else(|| GraphError::InvalidState("node was never removed".into()))?;
        state.restore_node(detached)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Add a plug to a node
pub struct AddPlugAction {
    node: NodeId,
    spec: PlugSpec,
    plug: Option<PlugId>,
    detached: Option<DetachedPlug>,
}

impl AddPlugAction {
    /// Create the action
    pub fn new(node: NodeId, spec: PlugSpec) -> Self {
        Self {
            node,
            spec,
            plug: None,
            detached: None,
        }
    }
}

impl Action for AddPlugAction {
    fn subject(&self) -> Subject {
        Subject::Node(self.node)
    }

    fn description(&self) -> String {
        format!("Add plug '{}'", self.spec.name)
    }

    fn apply(&mut self, state: &mut GraphState) -> Result<()> {
        let plug = match self.detached.take() {
            Some(detached) => state.restore_plug(detached)?,
            None => state.insert_plug(self.node, &self.spec)?,
        };
        self.plug = Some(plug);
        Ok(())
    }

    fn revert(&mut self, state: &mut GraphState) -> Result<()> {
        let plug = self
            .plug
            .ok_or_else(|| GraphError::InvalidState("plug was never added".into()))?;
        self.detached = Some(state.detach_plug(plug)?);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Remove a top-level plug from a node
pub struct RemovePlugAction {
    node: NodeId,
    plug: PlugId,
    detached: Option<DetachedPlug>,
}

impl RemovePlugAction {
    /// Create the action
    pub fn new(node: NodeId, plug: PlugId) -> Self {
        Self {
            node,
            plug,
            detached: None,
        }
    }
}

impl Action for RemovePlugAction {
    fn subject(&self) -> Subject {
        Subject::Node(self.node)
    }

    fn description(&self) -> String {
        "Remove plug".to_string()
    }

    fn apply(&mut self, state: &mut GraphState) -> Result<()> {
        self.detached = Some(state.detach_plug(self.plug)?);
        Ok(())
    }

    fn revert(&mut self, state: &mut GraphState) -> Result<()> {
        let detached = self
            .detached
            .take()
            .ok_or_else(|| GraphError::InvalidState("plug was never removed".into()))?;
        state.restore_plug(detached)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type StateFn = Box<dyn FnMut(&mut GraphState) -> Result<()> + Send + Sync>;

/// Action built from a pair of closures
pub struct SimpleAction {
    subject: Subject,
    description: String,
    apply: StateFn,
    revert: StateFn,
}

impl SimpleAction {
    /// Create the action
    pub fn new<D, U>(subject: Subject, description: impl Into<String>, apply: D, revert: U) -> Self
    where
        D: FnMut(&mut GraphState) -> Result<()> + Send + Sync + 'static,
        U: FnMut(&mut GraphState) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            subject,
            description: description.into(),
            apply: Box::new(apply),
            revert: Box::new(revert),
        }
    }
}

impl Action for SimpleAction {
    fn subject(&self) -> Subject {
        self.subject
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn apply(&mut self, state: &mut GraphState) -> Result<()> {
        (self.apply)(state)
    }

    fn revert(&mut self, state: &mut GraphState) -> Result<()> {
        (self.revert)(state)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
