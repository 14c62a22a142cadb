// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions and the process-wide node type registry.

use crate::error::{GraphError, Result};
use crate::evaluation::NodeScope;
use crate::fingerprint::Fingerprint;
use crate::plug::{Direction, PlugId, PlugSpec};
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Behavior of a node type: its plugs, its dependency relation, and how it
/// hashes and computes each output.
pub trait NodeBehavior: Send + Sync + 'static {
    /// Registered type name, also the default hash seed
    fn type_name(&self) -> &str;

    /// Plugs created for every instance
    fn declare(&self) -> Vec<PlugSpec>;

    /// Outputs whose value depends on the named input. Never called before
    /// the node is fully constructed.
    ///
    /// The default reports every declared output.
    fn affects(&self, input: &str) -> Vec<String> {
        let _ = input;
        self.declare()
            .into_iter()
            .filter(|spec| spec.direction == Direction::Out)
            .map(|spec| spec.name)
            .collect()
    }

    /// Fingerprint of an output under the scope's context.
    ///
    /// The default folds the hash of every leaf input, which is correct for
    /// nodes that read no context variables.
    fn hash(&self, output: &str, scope: &NodeScope<'_, '_>) -> Result<Fingerprint> {
        let mut hasher = scope.hasher(output);
        for input in scope.leaf_inputs() {
            hasher.append_fingerprint(scope.evaluation().hash(input)?);
        }
        Ok(hasher.finish())
    }

    /// Value of an output under the scope's context
    fn compute(&self, output: &str, scope: &NodeScope<'_, '_>) -> Result<Value>;
}

/// A node instance in a graph
#[derive(Clone)]
pub struct NodeEntry {
    /// Unique instance ID
    pub id: NodeId,
    /// Name, unique within the graph
    pub name: String,
    pub(crate) behavior: Arc<dyn NodeBehavior>,
    pub(crate) plugs: IndexMap<String, PlugId>,
    pub(crate) constructed: bool,
}

impl NodeEntry {
    pub(crate) fn new(id: NodeId, name: String, behavior: Arc<dyn NodeBehavior>) -> Self {
        Self {
            id,
            name,
            behavior,
            plugs: IndexMap::new(),
            constructed: false,
        }
    }

    /// Registered type name
    pub fn type_name(&self) -> &str {
        self.behavior.type_name()
    }

    /// Node behavior
    pub fn behavior(&self) -> &Arc<dyn NodeBehavior> {
        &self.behavior
    }

    /// Plug by full name
    pub fn plug(&self, name: &str) -> Option<PlugId> {
        self.plugs.get(name).copied()
    }

    /// All plugs by full name, in declaration order
    pub fn plugs(&self) -> impl Iterator<Item = (&str, PlugId)> {
        self.plugs.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// True once every declared plug exists
    pub fn is_constructed(&self) -> bool {
        self.constructed
    }
}

impl fmt::Debug for NodeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type", &self.type_name())
            .field("plugs", &self.plugs.len())
            .finish()
    }
}

/// Constructor registered for a node type
pub type NodeCreator = Arc<dyn Fn() -> Arc<dyn NodeBehavior> + Send + Sync>;

/// Registry of available node types
pub struct NodeRegistry {
    /// Registered creators by type name
    types: IndexMap<String, NodeCreator>,
}

impl NodeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self { types: IndexMap::new() }
    }

    /// Register a node type. Re-registering a name replaces the creator.
    pub fn register(&mut self, name: impl Into<String>, creator: NodeCreator) {
        let name = name.into();
        if self.types.insert(name.clone(), creator).is_some() {
            tracing::debug!("Replaced node type '{}'", name);
        }
    }

    /// Get a creator by type name
    pub fn get(&self, name: &str) -> Option<&NodeCreator> {
        self.types.get(name)
    }

    /// All registered type names, in registration order
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Create a behavior from a type name
    pub fn create(&self, name: &str) -> Result<Arc<dyn NodeBehavior>> {
        self.get(name)
            .map(|creator| creator())
            .ok_or_else(|| GraphError::UnknownNodeType(name.to_string()))
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn global_registry() -> &'static RwLock<NodeRegistry> {
    static REGISTRY: OnceLock<RwLock<NodeRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(NodeRegistry::new()))
}

/// Register a node type in the process-wide registry
pub fn register_node_type<F>(name: impl Into<String>, creator: F)
where
    F: Fn() -> Arc<dyn NodeBehavior> + Send + Sync + 'static,
{
    global_registry().write().register(name, Arc::new(creator));
}

/// Names of all node types in the process-wide registry
pub fn registered_node_types() -> Vec<String> {
    global_registry().read().types().map(str::to_string).collect()
}

/// Create a node behavior from the process-wide registry
pub fn create_node_behavior(name: &str) -> Result<Arc<dyn NodeBehavior>> {
    let creator = global_registry()
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| GraphError::UnknownNodeType(name.to_string()))?;
    Ok(creator())
}
