// SPDX-License-Identifier: MIT OR Apache-2.0
//! Framework for nodes that output a scene.
//!
//! A [`SceneNode`] answers one facet at a time for the location named by the
//! context. [`SceneNodeBehavior`] adapts it to the graph's [`NodeBehavior`]:
//! it declares the `out` scene plug, routes each facet, and answers the
//! root's transform, attributes and object itself so nodes never see them.

use crate::query::SceneQuery;
use crate::scene_plug::{scene_plug, Facet};
use loom_graph::context::{SCENE_PATH, SET_NAME};
use loom_graph::{
    CompoundValue, Direction, Evaluation, Fingerprint, FingerprintHasher, GraphError, M44f, MatchResult, NodeBehavior,
    NodeScope, ObjectValue, PlugSpec, Result, ScenePath, Value,
};
use std::ops::Deref;
use std::sync::Arc;

/// A node producing a scene on its `out` plug
pub trait SceneNode: Send + Sync + 'static {
    /// Registered type name
    fn type_name(&self) -> &str;

    /// Plugs besides `out`
    fn declare(&self) -> Vec<PlugSpec>;

    /// Outputs, by full name such as `out.bound`, that depend on `input`
    fn affects(&self, input: &str) -> Vec<String>;

    /// Fingerprint of a facet at the scope's location
    fn hash(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Fingerprint>;

    /// Value of a facet at the scope's location
    fn compute(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Value>;
}

/// Node scope plus the location being evaluated
pub struct SceneScope<'n, 's, 'a> {
    scope: &'n NodeScope<'s, 'a>,
    path: ScenePath,
}

impl<'n, 's, 'a> SceneScope<'n, 's, 'a> {
    fn new(scope: &'n NodeScope<'s, 'a>, path: ScenePath) -> Self {
        Self { scope, path }
    }

    /// Location being evaluated; the root for scene-wide facets
    pub fn path(&self) -> &ScenePath {
        &self.path
    }

    /// Set being evaluated
    pub fn set_name(&self) -> Result<&'s str> {
        self.scope
            .context()
            .set_name()
            .ok_or_else(|| GraphError::evaluation(format!("{SET_NAME} is not set")))
    }

    /// Reader for an input scene plug of this node
    pub fn input(&self, name: &str) -> Result<SceneQuery<'s, 'a>> {
        SceneQuery::new(self.scope.evaluation(), self.scope.node().id, name)
    }

    /// Reader for this node's own output
    pub fn output(&self) -> Result<SceneQuery<'s, 'a>> {
        self.input("out")
    }

    /// Hasher seeded with the node type and facet
    pub fn hasher(&self, facet: Facet) -> FingerprintHasher {
        self.scope.hasher(&facet.on("out"))
    }

    /// Hasher seeded with the node type, facet and location
    pub fn path_hasher(&self, facet: Facet) -> FingerprintHasher {
        let mut hasher = self.hasher(facet);
        hasher.append(&self.path);
        hasher
    }

    /// Fold the hashes of the named plugs into `hasher`
    pub fn append_plugs(&self, hasher: &mut FingerprintHasher, names: &[&str]) -> Result<()> {
        for name in names {
            hasher.append_fingerprint(self.scope.hash_of(name)?);
        }
        Ok(())
    }

    /// Match flags of the `filter` input for a location
    pub fn filter_match(&self, path: &ScenePath) -> Result<MatchResult> {
        let plug = self.scope.plug("filter")?;
        let evaluation = self.at(path);
        let value = evaluation.value(plug)?;
        let bits = value.as_int().ok_or_else(|| GraphError::TypeError {
            plug: format!("{}.filter", self.scope.node().name),
            expected: "Int".to_string(),
            found: value.plug_type().to_string(),
        })?;
        Ok(MatchResult::from_bits(bits))
    }

    /// Fingerprint of the `filter` input for a location
    pub fn filter_hash(&self, path: &ScenePath) -> Result<Fingerprint> {
        let plug = self.scope.plug("filter")?;
        self.at(path).hash(plug)
    }

    fn at(&self, path: &ScenePath) -> Evaluation<'a> {
        let evaluation = self.scope.evaluation();
        evaluation.with_context(evaluation.context().with_scene_path(path.clone()))
    }

    /// Fingerprint of the same facet of an input scene
    pub fn pass_through_hash(&self, facet: Facet, input: &str) -> Result<Fingerprint> {
        let query = self.input(input)?;
        match facet {
            Facet::Globals => query.globals_hash(),
            Facet::SetNames => query.set_names_hash(),
            Facet::Set => query.set_hash(self.set_name()?),
            _ => query.hash_at(facet, &self.path),
        }
    }

    /// Value of the same facet of an input scene
    pub fn pass_through(&self, facet: Facet, input: &str) -> Result<Value> {
        let query = self.input(input)?;
        let path = &self.path;
        Ok(match facet {
            Facet::Bound => Value::Box3f(query.bound(path)?),
            Facet::Transform => Value::M44f(query.transform(path)?),
            Facet::Attributes => Value::Compound(query.attributes(path)?),
            Facet::Object => Value::Object(query.object(path)?),
            Facet::ChildNames => Value::Names(query.child_names(path)?),
            Facet::Globals => Value::Compound(query.globals()?),
            Facet::SetNames => Value::Names(query.set_names()?),
            Facet::Set => Value::PathSet(query.set(self.set_name()?)?),
        })
    }
}

impl<'s, 'a> Deref for SceneScope<'_, 's, 'a> {
    type Target = NodeScope<'s, 'a>;

    fn deref(&self) -> &Self::Target {
        self.scope
    }
}

/// Adapts a [`SceneNode`] to a graph node
pub struct SceneNodeBehavior<N> {
    node: N,
}

impl<N: SceneNode> SceneNodeBehavior<N> {
    /// Wrap a scene node
    pub fn new(node: N) -> Self {
        Self { node }
    }

    /// Wrapped scene node
    pub fn inner(&self) -> &N {
        &self.node
    }
}

/// Wrap a scene node as a shareable node behavior
pub fn scene_node<N: SceneNode>(node: N) -> Arc<dyn NodeBehavior> {
    Arc::new(SceneNodeBehavior::new(node))
}

/// Facet of an `out.<facet>` plug name
fn output_facet(output: &str) -> Result<Facet> {
    output
        .strip_prefix("out.")
        .and_then(Facet::from_name)
        .ok_or_else(|| GraphError::PlugNotFound(output.to_string()))
}

/// Location a facet is evaluated at; `None` if the facet is answered with a
/// root default
fn location(facet: Facet, scope: &NodeScope<'_, '_>) -> Result<Option<ScenePath>> {
    if !facet.reads_path() {
        if facet == Facet::Set && scope.context().set_name().is_none() {
            return Err(GraphError::evaluation(format!("{SET_NAME} is not set")));
        }
        return Ok(Some(ScenePath::root()));
    }
    let path = scope
        .context()
        .scene_path()
        .ok_or_else(|| GraphError::evaluation(format!("{SCENE_PATH} is not set")))?;
    let root_default = path.is_root() && matches!(facet, Facet::Transform | Facet::Attributes | Facet::Object);
    Ok((!root_default).then(|| path.clone()))
}

fn root_default(facet: Facet) -> Value {
    match facet {
        Facet::Transform => Value::M44f(M44f::IDENTITY),
        Facet::Attributes => Value::Compound(Arc::new(CompoundValue::new())),
        _ => Value::Object(Arc::new(ObjectValue::null())),
    }
}

impl<N: SceneNode> NodeBehavior for SceneNodeBehavior<N> {
    fn type_name(&self) -> &str {
        self.node.type_name()
    }

    fn declare(&self) -> Vec<PlugSpec> {
        let mut plugs = self.node.declare();
        plugs.push(scene_plug("out", Direction::Out));
        plugs
    }

    fn affects(&self, input: &str) -> Vec<String> {
        self.node.affects(input)
    }

    fn hash(&self, output: &str, scope: &NodeScope<'_, '_>) -> Result<Fingerprint> {
        let facet = output_facet(output)?;
        match location(facet, scope)? {
            Some(path) => self.node.hash(facet, &SceneScope::new(scope, path)),
            None => {
                let mut hasher = FingerprintHasher::new();
                hasher.append("scene:rootDefault").append(facet.name());
                Ok(hasher.finish())
            }
        }
    }

    fn compute(&self, output: &str, scope: &NodeScope<'_, '_>) -> Result<Value> {
        let facet = output_facet(output)?;
        match location(facet, scope)? {
            Some(path) => self.node.compute(facet, &SceneScope::new(scope, path)),
            None => Ok(root_default(facet)),
        }
    }
}
