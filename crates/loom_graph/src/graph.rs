// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph topology, dirty propagation and the shared graph handle.
//!
//! [`GraphState`] is the arena that owns nodes, plugs and connections.
//! [`Graph`] wraps it behind a read/write lock together with the caches,
//! the undo history and the background task registry. Every mutation made
//! through [`Graph`] is wrapped in an [`Action`] so it can be undone.

use crate::action::{
    Action, ActionEntry, AddNodeAction, AddPlugAction, RemoveNodeAction, RemovePlugAction, SetInputAction,
    SetValueAction, Subject,
};
use crate::cache::{ComputeCache, HashCache};
use crate::config::EngineConfig;
use crate::connection::Connection;
use crate::context::Context;
use crate::error::{GraphError, Result};
use crate::evaluation::Evaluation;
use crate::fingerprint::Fingerprint;
use crate::history::{History, HistoryStats, UndoScope};
use crate::node::{create_node_behavior, NodeBehavior, NodeEntry, NodeId};
use crate::plug::{Direction, Plug, PlugId, PlugSpec};
use crate::task::{BackgroundTask, Canceller, TaskRegistry};
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};

/// A node removed from a graph, kept so that it can be restored
#[derive(Debug, Clone)]
pub struct DetachedNode {
    entry: NodeEntry,
    plugs: Vec<Plug>,
    connections: Vec<Connection>,
}

impl DetachedNode {
    /// ID of the removed node
    pub fn id(&self) -> NodeId {
        self.entry.id
    }
}

/// A plug removed from a node, with its children and connections
#[derive(Debug, Clone)]
pub struct DetachedPlug {
    node: NodeId,
    plugs: Vec<Plug>,
    connections: Vec<Connection>,
}

/// Arena owning the nodes, plugs and connections of a graph
#[derive(Default)]
pub struct GraphState {
    nodes: IndexMap<NodeId, NodeEntry>,
    plugs: HashMap<PlugId, Plug>,
    /// Keyed by destination input
    connections: IndexMap<PlugId, Connection>,
    destinations: HashMap<PlugId, Vec<PlugId>>,
}

impl GraphState {
    /// Create an empty graph state
    pub fn new() -> Self {
        Self::default()
    }

    /// All nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeEntry> {
        self.nodes.values()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node by ID
    pub fn node(&self, id: NodeId) -> Result<&NodeEntry> {
        self.nodes
            .get(&id)
            .ok_or_else(|| GraphError::NodeNotFound(id.0.to_string()))
    }

    /// Node by name
    pub fn node_by_name(&self, name: &str) -> Option<&NodeEntry> {
        self.nodes.values().find(|node| node.name == name)
    }

    /// Plug by ID
    pub fn plug(&self, id: PlugId) -> Result<&Plug> {
        self.plugs
            .get(&id)
            .ok_or_else(|| GraphError::PlugNotFound(id.0.to_string()))
    }

    /// Plug of a node by full name
    pub fn find_plug(&self, node: NodeId, name: &str) -> Result<PlugId> {
        let entry = self.node(node)?;
        entry
            .plug(name)
            .ok_or_else(|| GraphError::PlugNotFound(format!("{}.{}", entry.name, name)))
    }

    /// `node.plug` label used in messages
    pub fn plug_label(&self, id: PlugId) -> String {
        match self.plugs.get(&id) {
            Some(plug) => match self.nodes.get(&plug.node) {
                Some(node) => format!("{}.{}", node.name, plug.name),
                None => plug.name.clone(),
            },
            None => id.0.to_string(),
        }
    }

    /// Source driving an input
    pub fn source(&self, input: PlugId) -> Option<PlugId> {
        self.connections.get(&input).map(|c| c.source)
    }

    /// Inputs driven by a plug
    pub fn destinations(&self, plug: PlugId) -> &[PlugId] {
        self.destinations.get(&plug).map_or(&[], Vec::as_slice)
    }

    /// All connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// The node and every node it reads from, transitively
    pub fn upstream_nodes(&self, node: NodeId) -> HashSet<NodeId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([node]);
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let Some(entry) = self.nodes.get(&current) else {
                continue;
            };
            for (_, plug) in entry.plugs() {
                if let Some(connection) = self.connections.get(&plug) {
                    queue.push_back(connection.source_node);
                }
            }
        }
        visited
    }

    /// True if `to` can be reached downstream of `from`
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            let Some(entry) = self.nodes.get(&current) else {
                continue;
            };
            for (_, plug) in entry.plugs() {
                for destination in self.destinations(plug) {
                    if let Some(p) = self.plugs.get(destination) {
                        queue.push_back(p.node);
                    }
                }
            }
        }
        false
    }

    fn unique_name(&self, base: &str) -> String {
        let base = if base.is_empty() { "node" } else { base };
        if self.node_by_name(base).is_none() {
            return base.to_string();
        }
        let stem = base.trim_end_matches(|c: char| c.is_ascii_digit());
        (1..)
            .map(|i| format!("{stem}{i}"))
            .find(|candidate| self.node_by_name(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    /// Insert a node and create its declared plugs
    pub fn insert_node(&mut self, id: NodeId, name: &str, behavior: Arc<dyn NodeBehavior>) -> Result<NodeId> {
        if self.nodes.contains_key(&id) {
            return Err(GraphError::InvalidState(format!("node {} already exists", id.0)));
        }
        let name = self.unique_name(name);
        let type_name = behavior.type_name().to_string();
        self.nodes
            .insert(id, NodeEntry::new(id, name.clone(), behavior.clone()));
        for spec in behavior.declare() {
            self.create_plugs(id, &spec, None, "")?;
        }
        if let Some(entry) = self.nodes.get_mut(&id) {
            entry.constructed = true;
        }
        tracing::debug!("Added node '{}' ({})", name, type_name);
        Ok(id)
    }

    fn create_plugs(&mut self, node: NodeId, spec: &PlugSpec, parent: Option<PlugId>, prefix: &str) -> Result<PlugId> {
        let full_name = if prefix.is_empty() {
            spec.name.clone()
        } else {
            format!("{prefix}.{}", spec.name)
        };
        let entry = self
            .nodes
            .get_mut(&node)
            .ok_or_else(|| GraphError::NodeNotFound(node.0.to_string()))?;
        if entry.plugs.contains_key(&full_name) {
            return Err(GraphError::InvalidState(format!(
                "plug '{}.{}' already exists",
                entry.name, full_name
            )));
        }
        let id = PlugId::new();
        entry.plugs.insert(full_name.clone(), id);
        self.plugs.insert(
            id,
            Plug {
                id,
                node,
                name: full_name.clone(),
                direction: spec.direction,
                plug_type: spec.plug_type,
                default: spec.default.clone(),
                value: None,
                parent,
                children: Vec::new(),
                dirty_count: 0,
            },
        );
        let mut children = Vec::with_capacity(spec.children.len());
        for child in &spec.children {
            children.push(self.create_plugs(node, child, Some(id), &full_name)?);
        }
        if let Some(plug) = self.plugs.get_mut(&id) {
            plug.children = children;
        }
        Ok(id)
    }

    /// Plug and all of its descendants, parent first
    fn plug_tree(&self, root: PlugId) -> Vec<PlugId> {
        let mut out = vec![root];
        let mut i = 0;
        while i < out.len() {
            if let Some(plug) = self.plugs.get(&out[i]) {
                out.extend(plug.children.iter().copied());
            }
            i += 1;
        }
        out
    }

    /// Connections touching any of the plugs
    fn connections_touching(&self, plugs: &[PlugId]) -> Vec<Connection> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        for plug in plugs {
            if let Some(c) = self.connections.get(plug) {
                if seen.insert(c.destination) {
                    found.push(*c);
                }
            }
            for destination in self.destinations(*plug) {
                if let Some(c) = self.connections.get(destination) {
                    if seen.insert(c.destination) {
                        found.push(*c);
                    }
                }
            }
        }
        found
    }

    /// Remove a node, its plugs and its connections
    pub fn detach_node(&mut self, id: NodeId) -> Result<DetachedNode> {
        let plug_ids: Vec<PlugId> = self.node(id)?.plugs.values().copied().collect();
        let connections = self.connections_touching(&plug_ids);
        for connection in &connections {
            self.remove_connection(connection.destination);
            if connection.destination_node != id {
                self.dirty(connection.destination);
            }
        }
        let plugs = plug_ids.iter().filter_map(|p| self.plugs.remove(p)).collect();
        let entry = self
            .nodes
            .shift_remove(&id)
            .ok_or_else(|| GraphError::NodeNotFound(id.0.to_string()))?;
        tracing::debug!("Removed node '{}'", entry.name);
        Ok(DetachedNode {
            entry,
            plugs,
            connections,
        })
    }

    /// Put a detached node back, reconnecting what it was connected to
    pub fn restore_node(&mut self, detached: DetachedNode) -> Result<()> {
        let DetachedNode {
            mut entry,
            plugs,
            connections,
        } = detached;
        if self.nodes.contains_key(&entry.id) {
            return Err(GraphError::InvalidState(format!("node '{}' is already present", entry.name)));
        }
        entry.name = self.unique_name(&entry.name);
        let id = entry.id;
        let name = entry.name.clone();
        self.nodes.insert(id, entry);
        for mut plug in plugs {
            plug.dirty_count += 1;
            self.plugs.insert(plug.id, plug);
        }
        self.restore_connections(&connections);
        tracing::debug!("Restored node '{}'", name);
        Ok(())
    }

    fn restore_connections(&mut self, connections: &[Connection]) {
        for connection in connections {
            if self.plugs.contains_key(&connection.source) && self.plugs.contains_key(&connection.destination) {
                self.remove_connection(connection.destination);
                self.insert_connection(*connection);
                self.dirty(connection.destination);
            }
        }
    }

    /// Add a plug to an existing node
    pub fn insert_plug(&mut self, node: NodeId, spec: &PlugSpec) -> Result<PlugId> {
        let id = self.create_plugs(node, spec, None, "")?;
        self.dirty(id);
        Ok(id)
    }

    /// Remove a top-level plug, its children and its connections
    pub fn detach_plug(&mut self, plug: PlugId) -> Result<DetachedPlug> {
        let root = self.plug(plug)?;
        if root.parent.is_some() {
            return Err(GraphError::InvalidState(format!(
                "cannot remove child plug '{}'",
                self.plug_label(plug)
            )));
        }
        let node = root.node;
        let tree = self.plug_tree(plug);
        let connections = self.connections_touching(&tree);
        for connection in &connections {
            self.remove_connection(connection.destination);
            if !tree.contains(&connection.destination) {
                self.dirty(connection.destination);
            }
        }
        self.dirty(plug);
        let plugs: Vec<Plug> = tree.iter().filter_map(|p| self.plugs.remove(p)).collect();
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.plugs.retain(|_, id| !tree.contains(id));
        }
        Ok(DetachedPlug {
            node,
            plugs,
            connections,
        })
    }

    /// Put a detached plug back
    pub fn restore_plug(&mut self, detached: DetachedPlug) -> Result<PlugId> {
        let DetachedPlug {
            node,
            plugs,
            connections,
        } = detached;
        let root = plugs
            .first()
            .map(|p| p.id)
            .ok_or_else(|| GraphError::InvalidState("empty detached plug".into()))?;
        let entry = self
            .nodes
            .get_mut(&node)
            .ok_or_else(|| GraphError::NodeNotFound(node.0.to_string()))?;
        for plug in &plugs {
            entry.plugs.insert(plug.name.clone(), plug.id);
        }
        for mut plug in plugs {
            plug.dirty_count += 1;
            self.plugs.insert(plug.id, plug);
        }
        self.restore_connections(&connections);
        self.dirty(root);
        Ok(root)
    }

    fn check_types(&self, input: &Plug, source: &Plug) -> Result<()> {
        let mismatch = || GraphError::TypeMismatch {
            expected: input.plug_type.to_string(),
            found: source.plug_type.to_string(),
        };
        match (input.is_composite(), source.is_composite()) {
            (false, false) => {
                if source.plug_type.can_connect_to(&input.plug_type) {
                    Ok(())
                } else {
                    Err(mismatch())
                }
            }
            (true, true) => {
                if input.children.len() != source.children.len() {
                    return Err(mismatch());
                }
                for child in &input.children {
                    let child = self.plug(*child)?;
                    let partner = self
                        .matching_child(source, child.short_name())
                        .ok_or_else(mismatch)?;
                    self.check_types(child, self.plug(partner)?)?;
                }
                Ok(())
            }
            _ => Err(mismatch()),
        }
    }

    fn matching_child(&self, parent: &Plug, short_name: &str) -> Option<PlugId> {
        parent.children.iter().copied().find(|id| {
            self.plugs
                .get(id)
                .is_some_and(|p| p.short_name() == short_name)
        })
    }

    /// Drive `input` from `source`, replacing any existing source.
    /// Returns the previous source.
    pub fn connect(&mut self, input: PlugId, source: PlugId) -> Result<Option<PlugId>> {
        let destination = self.plug(input)?;
        let origin = self.plug(source)?;
        if destination.direction != Direction::In {
            return Err(GraphError::DirectionError(format!(
                "'{}' is not an input",
                self.plug_label(input)
            )));
        }
        if origin.direction != Direction::Out {
            return Err(GraphError::DirectionError(format!(
                "'{}' is not an output",
                self.plug_label(source)
            )));
        }
        self.check_types(destination, origin)?;
        if destination.node == origin.node || self.reaches(destination.node, origin.node) {
            return Err(GraphError::CycleDetected);
        }
        let parent = destination.parent;

        // A child connected on its own no longer follows its parent's source.
        if let Some(parent) = parent {
            if let Some(connection) = self.connections.shift_remove(&parent) {
                self.unlist_destination(connection.source, parent);
            }
        }

        let previous = self.source(input);
        self.remove_connection(input);
        self.link(input, source);
        let dirtied = self.dirty(input);
        tracing::trace!(
            "Connected {} -> {} ({} outputs dirtied)",
            self.plug_label(source),
            self.plug_label(input),
            dirtied.len()
        );
        Ok(previous)
    }

    /// Remove the source of `input`. Returns the previous source.
    pub fn disconnect(&mut self, input: PlugId) -> Result<Option<PlugId>> {
        let plug = self.plug(input)?;
        if plug.direction != Direction::In {
            return Err(GraphError::DirectionError(format!(
                "'{}' is not an input",
                self.plug_label(input)
            )));
        }
        let previous = self.source(input);
        self.remove_connection(input);
        if previous.is_some() {
            self.dirty(input);
        }
        Ok(previous)
    }

    fn link(&mut self, input: PlugId, source: PlugId) {
        let (Some(destination), Some(origin)) = (self.plugs.get(&input), self.plugs.get(&source)) else {
            return;
        };
        let connection = Connection::new(origin.node, source, destination.node, input);
        let pairs: Vec<(PlugId, PlugId)> = destination
            .children
            .iter()
            .filter_map(|child| {
                let short = self.plugs.get(child)?.short_name();
                Some((*child, self.matching_child(origin, short)?))
            })
            .collect();
        self.insert_connection(connection);
        for (child_input, child_source) in pairs {
            self.link(child_input, child_source);
        }
    }

    fn insert_connection(&mut self, connection: Connection) {
        self.destinations
            .entry(connection.source)
            .or_default()
            .push(connection.destination);
        self.connections.insert(connection.destination, connection);
    }

    fn unlist_destination(&mut self, source: PlugId, destination: PlugId) {
        if let Some(list) = self.destinations.get_mut(&source) {
            list.retain(|d| *d != destination);
            if list.is_empty() {
                self.destinations.remove(&source);
            }
        }
    }

    /// Remove the connection into `input` and into all of its children
    fn remove_connection(&mut self, input: PlugId) {
        for plug in self.plug_tree(input) {
            if let Some(connection) = self.connections.shift_remove(&plug) {
                self.unlist_destination(connection.source, plug);
            }
        }
    }

    /// Set the literal value of an input. Returns the previous value.
    pub fn set_value(&mut self, plug: PlugId, value: Value) -> Result<Value> {
        let target = self.plug(plug)?;
        if target.direction != Direction::In {
            return Err(GraphError::DirectionError(format!(
                "cannot set the value of output '{}'",
                self.plug_label(plug)
            )));
        }
        if self.connections.contains_key(&plug) {
            return Err(GraphError::PlugConnected(self.plug_label(plug)));
        }
        let found = value.plug_type();
        let expected = target.plug_type;
        let value = value.coerce(expected).ok_or_else(|| GraphError::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        })?;
        let previous = target
            .literal()
            .cloned()
            .or_else(|| expected.default_value())
            .ok_or_else(|| GraphError::TypeMismatch {
                expected: expected.to_string(),
                found: found.to_string(),
            })?;
        if previous == value {
            return Ok(previous);
        }
        if let Some(target) = self.plugs.get_mut(&plug) {
            target.value = Some(value);
        }
        let dirtied = self.dirty(plug);
        tracing::trace!("Set {} ({} outputs dirtied)", self.plug_label(plug), dirtied.len());
        Ok(previous)
    }

    /// Mark a plug and everything downstream of it dirty. Returns the
    /// dirtied outputs.
    pub fn dirty(&mut self, start: PlugId) -> Vec<PlugId> {
        let mut stack = vec![start];
        let mut seen = HashSet::new();
        let mut outputs = Vec::new();

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(plug) = self.plugs.get_mut(&id) else {
                continue;
            };
            plug.dirty_count += 1;
            stack.extend(plug.children.iter().copied());
            let node_id = plug.node;
            let direction = plug.direction;

            match direction {
                Direction::In => {
                    let Some(node) = self.nodes.get(&node_id) else {
                        continue;
                    };
                    if !node.constructed {
                        continue;
                    }
                    let name = &self.plugs[&id].name;
                    for affected in node.behavior.affects(name) {
                        match node.plugs.get(&affected) {
                            Some(output) => stack.push(*output),
                            None => tracing::trace!("'{}' affects unknown plug '{}'", name, affected),
                        }
                    }
                }
                Direction::Out => {
                    outputs.push(id);
                    stack.extend(self.destinations(id).iter().copied());
                }
            }
        }

        outputs
    }
}

pub(crate) struct GraphShared {
    pub(crate) state: RwLock<GraphState>,
    pub(crate) cache: Arc<ComputeCache>,
    pub(crate) hashes: HashCache,
    pub(crate) history: Mutex<History>,
    pub(crate) tasks: TaskRegistry,
    pub(crate) config: EngineConfig,
}

/// Shared handle to a graph
#[derive(Clone)]
pub struct Graph {
    pub(crate) shared: Arc<GraphShared>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Create a graph using the process-wide compute cache
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create a graph with custom settings and the process-wide compute cache
    pub fn with_config(config: EngineConfig) -> Self {
        Self::with_cache(config, ComputeCache::global())
    }

    /// Create a graph with its own compute cache
    pub fn with_cache(config: EngineConfig, cache: Arc<ComputeCache>) -> Self {
        Self {
            shared: Arc::new(GraphShared {
                state: RwLock::new(GraphState::new()),
                cache,
                hashes: HashCache::new(config.hash_cache_capacity),
                history: Mutex::new(History::with_max_depth(config.history_depth)),
                tasks: TaskRegistry::default(),
                config,
            }),
        }
    }

    /// Create a graph with a private compute cache sized by `config`
    pub fn isolated(config: EngineConfig) -> Self {
        let cache = Arc::new(ComputeCache::new(config.cache_capacity));
        Self::with_cache(config, cache)
    }

    /// Engine settings
    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Compute cache used by this graph
    pub fn cache(&self) -> &Arc<ComputeCache> {
        &self.shared.cache
    }

    /// Lock the graph for reading
    pub fn read(&self) -> RwLockReadGuard<'_, GraphState> {
        self.shared.state.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, GraphState> {
        self.shared.state.write()
    }

    /// Non-owning handle
    pub fn downgrade(&self) -> WeakGraph {
        WeakGraph {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// True if both handles refer to the same graph
    pub fn ptr_eq(&self, other: &Graph) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Add a node
    pub fn add_node(&self, name: &str, behavior: Arc<dyn NodeBehavior>) -> Result<NodeId> {
        let id = NodeId::new();
        self.enact(Box::new(AddNodeAction::new(id, name, behavior)))?;
        Ok(id)
    }

    /// Add a node of a registered type
    pub fn create_node(&self, type_name: &str, name: &str) -> Result<NodeId> {
        let behavior = create_node_behavior(type_name)?;
        self.add_node(name, behavior)
    }

    /// Remove a node and its connections
    pub fn remove_node(&self, node: NodeId) -> Result<()> {
        self.read().node(node)?;
        self.enact(Box::new(RemoveNodeAction::new(node)))
    }

    /// Add a plug to an existing node
    pub fn add_plug(&self, node: NodeId, spec: PlugSpec) -> Result<PlugId> {
        let name = spec.name.clone();
        self.enact(Box::new(AddPlugAction::new(node, spec)))?;
        self.plug(node, &name)
    }

    /// Remove a top-level plug
    pub fn remove_plug(&self, plug: PlugId) -> Result<()> {
        let node = self.read().plug(plug)?.node;
        self.enact(Box::new(RemovePlugAction::new(node, plug)))
    }

    /// Drive `input` from `source`
    pub fn connect(&self, input: PlugId, source: PlugId) -> Result<()> {
        let node = self.read().plug(input)?.node;
        self.enact(Box::new(SetInputAction::new(node, input, Some(source))))
    }

    /// Remove the source of `input`
    pub fn disconnect(&self, input: PlugId) -> Result<()> {
        let node = self.read().plug(input)?.node;
        self.enact(Box::new(SetInputAction::new(node, input, None)))
    }

    /// Set the literal value of an input
    pub fn set_value(&self, plug: PlugId, value: impl Into<Value>) -> Result<()> {
        let node = self.read().plug(plug)?.node;
        self.enact(Box::new(SetValueAction::new(node, plug, value.into())))
    }

    /// Plug of a node by full name
    pub fn plug(&self, node: NodeId, name: &str) -> Result<PlugId> {
        self.read().find_plug(node, name)
    }

    /// Node by name
    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.read().node_by_name(name).map(|n| n.id)
    }

    /// Run queries against the graph under one read lock
    pub fn evaluate<R>(&self, context: &Context, f: impl FnOnce(&Evaluation<'_>) -> Result<R>) -> Result<R> {
        let state = self.read();
        let evaluation = Evaluation::new(&state, &self.shared.cache, &self.shared.hashes, context.clone());
        f(&evaluation)
    }

    /// Like [`Graph::evaluate`], polling `canceller` before each computation
    pub fn evaluate_cancellable<R>(
        &self,
        context: &Context,
        canceller: &Canceller,
        f: impl FnOnce(&Evaluation<'_>) -> Result<R>,
    ) -> Result<R> {
        canceller.check()?;
        let state = self.read();
        let evaluation = Evaluation::new(&state, &self.shared.cache, &self.shared.hashes, context.clone())
            .with_canceller(canceller);
        f(&evaluation)
    }

    /// Fingerprint of a plug
    pub fn hash(&self, plug: PlugId, context: &Context) -> Result<Fingerprint> {
        self.evaluate(context, |e| e.hash(plug))
    }

    /// Value of a plug
    pub fn compute(&self, plug: PlugId, context: &Context) -> Result<Value> {
        self.evaluate(context, |e| e.value(plug))
    }

    /// Perform an action and record it for undo
    pub fn enact(&self, action: Box<dyn Action>) -> Result<()> {
        let mut entry = ActionEntry::new(action);
        entry.perform(self)?;
        self.shared.history.lock().record(entry);
        Ok(())
    }

    /// Revert the most recent action group
    pub fn undo(&self) -> Result<()> {
        let mut group = self
            .shared
            .history
            .lock()
            .take_undo()
            .ok_or(GraphError::NoHistory("undo"))?;
        for index in (0..group.actions.len()).rev() {
            if let Err(err) = group.actions[index].revert(self) {
                tracing::warn!("Undo of '{}' failed: {}", group.description, err);
                for entry in &mut group.actions[index + 1..] {
                    if let Err(err) = entry.perform(self) {
                        tracing::warn!("Failed to restore '{}': {}", entry.description(), err);
                    }
                }
                self.shared.history.lock().push_undo(group);
                return Err(err);
            }
        }
        tracing::debug!("Undo: {}", group.description);
        self.shared.history.lock().push_redo(group);
        Ok(())
    }

    /// Re-perform the most recently undone action group
    pub fn redo(&self) -> Result<()> {
        let mut group = self
            .shared
            .history
            .lock()
            .take_redo()
            .ok_or(GraphError::NoHistory("redo"))?;
        for index in 0..group.actions.len() {
            if let Err(err) = group.actions[index].perform(self) {
                tracing::warn!("Redo of '{}' failed: {}", group.description, err);
                for entry in group.actions[..index].iter_mut().rev() {
                    if let Err(err) = entry.revert(self) {
                        tracing::warn!("Failed to restore '{}': {}", entry.description(), err);
                    }
                }
                self.shared.history.lock().push_redo(group);
                return Err(err);
            }
        }
        tracing::debug!("Redo: {}", group.description);
        self.shared.history.lock().push_undo(group);
        Ok(())
    }

    /// Group every action enacted while the returned guard lives
    pub fn undo_scope(&self, description: &str) -> UndoScope<'_> {
        UndoScope::new(self, description, None)
    }

    /// Like [`Graph::undo_scope`], but consecutive scopes sharing
    /// `merge_group` collapse into a single undo step
    pub fn merging_undo_scope(&self, description: &str, merge_group: &str) -> UndoScope<'_> {
        UndoScope::new(self, description, Some(merge_group.to_string()))
    }

    /// True if there is something to undo
    pub fn can_undo(&self) -> bool {
        self.shared.history.lock().can_undo()
    }

    /// True if there is something to redo
    pub fn can_redo(&self) -> bool {
        self.shared.history.lock().can_redo()
    }

    /// History statistics
    pub fn history_stats(&self) -> HistoryStats {
        self.shared.history.lock().stats()
    }

    /// Run `work` on a background thread. Actions touching `subject` or
    /// anything upstream of it cancel the task before mutating.
    pub fn spawn_background<F>(&self, subject: Subject, work: F) -> BackgroundTask
    where
        F: FnOnce(&Graph, &Canceller) -> Result<()> + Send + 'static,
    {
        BackgroundTask::spawn(self, subject, work)
    }

    /// Cancel and wait for every background task reading `subject`
    pub fn cancel_affected_tasks(&self, subject: Subject) {
        self.shared.tasks.cancel_affected(subject);
    }

    /// Number of background tasks still running
    pub fn running_tasks(&self) -> usize {
        self.shared.tasks.running()
    }

    /// Weak handle to a plug
    pub fn plug_handle(&self, plug: PlugId) -> PlugHandle {
        PlugHandle {
            graph: self.downgrade(),
            plug,
        }
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph").field("nodes", &self.read().len()).finish()
    }
}

/// Non-owning graph handle
#[derive(Clone)]
pub struct WeakGraph {
    shared: Weak<GraphShared>,
}

impl WeakGraph {
    /// Upgrade to a strong handle. A dropped graph reports cancellation.
    pub fn upgrade(&self) -> Result<Graph> {
        self.shared
            .upgrade()
            .map(|shared| Graph { shared })
            .ok_or(GraphError::Cancelled)
    }
}

/// Non-owning reference to a plug, as held by caches and background work
#[derive(Clone)]
pub struct PlugHandle {
    graph: WeakGraph,
    plug: PlugId,
}

impl PlugHandle {
    /// Plug ID
    pub fn id(&self) -> PlugId {
        self.plug
    }

    /// Resolve to the owning graph. Fails with `Cancelled` once the graph
    /// or the plug is gone.
    pub fn resolve(&self) -> Result<Graph> {
        let graph = self.graph.upgrade()?;
        if graph.read().plug(self.plug).is_err() {
            return Err(GraphError::Cancelled);
        }
        Ok(graph)
    }

    /// Fingerprint of the plug
    pub fn hash(&self, context: &Context) -> Result<Fingerprint> {
        self.resolve()?.hash(self.plug, context)
    }

    /// Value of the plug
    pub fn value(&self, context: &Context) -> Result<Value> {
        self.resolve()?.compute(self.plug, context)
    }
}
