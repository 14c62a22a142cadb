// SPDX-License-Identifier: MIT OR Apache-2.0
//! The hash/compute protocol.
//!
//! An [`Evaluation`] borrows the graph state under a read lock and answers
//! `hash` and `value` queries for a single context. Output hashes are
//! memoized per (plug, context, dirty count); output values are memoized by
//! fingerprint in the shared [`ComputeCache`].

use crate::cache::{ComputeCache, HashCache, HashKey};
use crate::context::Context;
use crate::error::{GraphError, Result};
use crate::fingerprint::{Fingerprint, FingerprintHasher};
use crate::graph::GraphState;
use crate::math::{Box3f, M44f, V2f, V3f};
use crate::node::{NodeEntry, NodeId};
use crate::path_matcher::PathMatcher;
use crate::plug::{Direction, PlugId};
use crate::task::Canceller;
use crate::value::{CompoundValue, ObjectValue, PlugType, Value};
use std::sync::Arc;

/// Query session over a borrowed graph state for one context
#[derive(Clone)]
pub struct Evaluation<'a> {
    state: &'a GraphState,
    cache: &'a ComputeCache,
    hashes: &'a HashCache,
    context: Context,
    canceller: Option<&'a Canceller>,
}

impl<'a> Evaluation<'a> {
    pub(crate) fn new(state: &'a GraphState, cache: &'a ComputeCache, hashes: &'a HashCache, context: Context) -> Self {
        Self {
            state,
            cache,
            hashes,
            context,
            canceller: None,
        }
    }

    pub(crate) fn with_canceller(mut self, canceller: &'a Canceller) -> Self {
        self.canceller = Some(canceller);
        self
    }

    /// Current context
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Same session under another context
    pub fn with_context(&self, context: Context) -> Evaluation<'a> {
        Self {
            context,
            ..self.clone()
        }
    }

    /// Borrowed graph state
    pub fn state(&self) -> &'a GraphState {
        self.state
    }

    /// Cancellation token, if the session is cancellable
    pub fn canceller(&self) -> Option<&'a Canceller> {
        self.canceller
    }

    /// Fail with `Cancelled` if the session was cancelled
    pub fn check_cancelled(&self) -> Result<()> {
        match self.canceller {
            Some(canceller) => canceller.check(),
            None => Ok(()),
        }
    }

    /// Plug of a node by full name
    pub fn plug(&self, node: NodeId, name: &str) -> Result<PlugId> {
        self.state.find_plug(node, name)
    }

    /// True if the input is driven by a connection
    pub fn is_connected(&self, plug: PlugId) -> bool {
        self.state.source(plug).is_some()
    }

    /// Fingerprint of a plug under the current context
    pub fn hash(&self, plug: PlugId) -> Result<Fingerprint> {
        let p = self.state.plug(plug)?;

        if p.direction == Direction::In {
            if let Some(source) = self.state.source(plug) {
                let upstream = self.hash(source)?;
                let source_type = self.state.plug(source)?.plug_type;
                if source_type == p.plug_type {
                    return Ok(upstream);
                }
                let mut hasher = FingerprintHasher::new();
                hasher.append(&p.plug_type).append_fingerprint(upstream);
                return Ok(hasher.finish());
            }
        }

        if p.is_composite() {
            let mut hasher = FingerprintHasher::new();
            for child in &p.children {
                hasher.append_fingerprint(self.hash(*child)?);
            }
            return Ok(hasher.finish());
        }

        match p.direction {
            Direction::In => {
                let value = p
                    .literal()
                    .cloned()
                    .or_else(|| p.plug_type.default_value())
                    .ok_or_else(|| GraphError::InvalidState(format!("'{}' has no value", self.state.plug_label(plug))))?;
                Ok(Fingerprint::of(&value))
            }
            Direction::Out => {
                let key = HashKey {
                    plug,
                    context: self.context.fingerprint(),
                    dirty_count: p.dirty_count,
                };
                if let Some(fingerprint) = self.hashes.get(&key) {
                    return Ok(fingerprint);
                }
                self.check_cancelled()?;
                let node = self.state.node(p.node)?;
                let scope = NodeScope::new(node, self);
                let fingerprint = node.behavior.hash(&p.name, &scope)?;
                self.hashes.insert(key, fingerprint);
                Ok(fingerprint)
            }
        }
    }

    /// Value of a plug under the current context
    pub fn value(&self, plug: PlugId) -> Result<Value> {
        let p = self.state.plug(plug)?;
        if p.is_composite() {
            return Err(GraphError::InvalidState(format!(
                "composite plug '{}' has no value",
                self.state.plug_label(plug)
            )));
        }

        match p.direction {
            Direction::In => match self.state.source(plug) {
                Some(source) => {
                    let value = self.value(source)?;
                    let found = value.plug_type();
                    value.coerce(p.plug_type).ok_or_else(|| GraphError::TypeMismatch {
                        expected: p.plug_type.to_string(),
                        found: found.to_string(),
                    })
                }
                None => p
                    .literal()
                    .cloned()
                    .or_else(|| p.plug_type.default_value())
                    .ok_or_else(|| GraphError::InvalidState(format!("'{}' has no value", self.state.plug_label(plug)))),
            },
            Direction::Out => {
                let fingerprint = self.hash(plug)?;
                let node = self.state.node(p.node)?;
                let expected = p.plug_type;
                let type_error = |found: PlugType| GraphError::TypeError {
                    plug: self.state.plug_label(plug),
                    expected: expected.to_string(),
                    found: found.to_string(),
                };
                let value = self.cache.get_or_compute(fingerprint, || {
                    self.check_cancelled()?;
                    let scope = NodeScope::new(node, self);
                    let value = node.behavior.compute(&p.name, &scope)?;
                    if value.plug_type() != expected {
                        return Err(type_error(value.plug_type()));
                    }
                    Ok(value)
                })?;
                if value.plug_type() != expected {
                    return Err(type_error(value.plug_type()));
                }
                Ok(value)
            }
        }
    }
}

/// View of one node during its hash or compute
pub struct NodeScope<'s, 'a> {
    node: &'a NodeEntry,
    evaluation: &'s Evaluation<'a>,
}

impl<'s, 'a> NodeScope<'s, 'a> {
    pub(crate) fn new(node: &'a NodeEntry, evaluation: &'s Evaluation<'a>) -> Self {
        Self { node, evaluation }
    }

    /// Node being evaluated
    pub fn node(&self) -> &'a NodeEntry {
        self.node
    }

    /// Evaluation session
    pub fn evaluation(&self) -> &'s Evaluation<'a> {
        self.evaluation
    }

    /// Current context
    pub fn context(&self) -> &'s Context {
        self.evaluation.context()
    }

    /// Plug of this node by full name
    pub fn plug(&self, name: &str) -> Result<PlugId> {
        self.node
            .plug(name)
            .ok_or_else(|| GraphError::PlugNotFound(format!("{}.{}", self.node.name, name)))
    }

    /// True if the named input is driven by a connection
    pub fn is_connected(&self, name: &str) -> bool {
        self.node
            .plug(name)
            .is_some_and(|plug| self.evaluation.is_connected(plug))
    }

    /// Leaf input plugs in declaration order
    pub fn leaf_inputs(&self) -> Vec<PlugId> {
        let state = self.evaluation.state();
        self.node
            .plugs()
            .filter_map(|(_, id)| state.plug(id).ok())
            .filter(|plug| plug.direction == Direction::In && !plug.is_composite())
            .map(|plug| plug.id)
            .collect()
    }

    /// Hasher seeded with the node type and output name, so equal node
    /// types with equal inputs share fingerprints
    pub fn hasher(&self, output: &str) -> FingerprintHasher {
        let mut hasher = FingerprintHasher::new();
        hasher.append(self.node.type_name()).append(output);
        hasher
    }

    /// Fold a context variable into a hash
    pub fn hash_variable(&self, hasher: &mut FingerprintHasher, name: &str) {
        hasher.append(name).append(&self.context().get(name));
    }

    /// Fingerprint of a plug of this node
    pub fn hash_of(&self, name: &str) -> Result<Fingerprint> {
        self.evaluation.hash(self.plug(name)?)
    }

    /// Value of a plug of this node
    pub fn get(&self, name: &str) -> Result<Value> {
        self.evaluation.value(self.plug(name)?)
    }

    fn typed<T>(&self, name: &str, expected: PlugType, extract: impl FnOnce(&Value) -> Option<T>) -> Result<T> {
        let value = self.get(name)?;
        extract(&value).ok_or_else(|| GraphError::TypeError {
            plug: format!("{}.{}", self.node.name, name),
            expected: expected.to_string(),
            found: value.plug_type().to_string(),
        })
    }

    /// Boolean input
    pub fn get_bool(&self, name: &str) -> Result<bool> {
        self.typed(name, PlugType::Bool, Value::as_bool)
    }

    /// Integer input
    pub fn get_int(&self, name: &str) -> Result<i64> {
        self.typed(name, PlugType::Int, Value::as_int)
    }

    /// Float input
    pub fn get_float(&self, name: &str) -> Result<f32> {
        self.typed(name, PlugType::Float, Value::as_float)
    }

    /// String input
    pub fn get_string(&self, name: &str) -> Result<String> {
        self.typed(name, PlugType::String, |v| v.as_str().map(str::to_string))
    }

    /// V2f input
    pub fn get_v2f(&self, name: &str) -> Result<V2f> {
        self.typed(name, PlugType::V2f, Value::as_v2f)
    }

    /// V3f input
    pub fn get_v3f(&self, name: &str) -> Result<V3f> {
        self.typed(name, PlugType::V3f, Value::as_v3f)
    }

    /// Box input
    pub fn get_box3f(&self, name: &str) -> Result<Box3f> {
        self.typed(name, PlugType::Box3f, Value::as_box3f)
    }

    /// Matrix input
    pub fn get_m44f(&self, name: &str) -> Result<M44f> {
        self.typed(name, PlugType::M44f, Value::as_m44f)
    }

    /// Names input
    pub fn get_names(&self, name: &str) -> Result<Arc<Vec<String>>> {
        self.typed(name, PlugType::Names, |v| v.as_names().cloned())
    }

    /// Compound input
    pub fn get_compound(&self, name: &str) -> Result<Arc<CompoundValue>> {
        self.typed(name, PlugType::Compound, |v| v.as_compound().cloned())
    }

    /// Object input
    pub fn get_object(&self, name: &str) -> Result<Arc<ObjectValue>> {
        self.typed(name, PlugType::Object, |v| v.as_object().cloned())
    }

    /// Path set input
    pub fn get_path_set(&self, name: &str) -> Result<Arc<PathMatcher>> {
        self.typed(name, PlugType::PathSet, |v| v.as_path_set().cloned())
    }
}
