// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reading scene facets at arbitrary locations.
//!
//! [`SceneQuery`] works inside an evaluation, which is how scene nodes read
//! their inputs. [`SceneView`] wraps a graph and a context for callers
//! outside the graph.

use crate::scene_plug::Facet;
use loom_graph::context::{SCENE_PATH, SET_NAME};
use loom_graph::{
    Box3f, Canceller, CompoundValue, Context, Evaluation, Fingerprint, FingerprintHasher, Graph, GraphError, M44f,
    NodeId, ObjectValue, PathMatcher, PlugId, Result, ScenePath, Value,
};
use std::sync::Arc;

/// Facet reader for one scene plug within an evaluation
#[derive(Clone)]
pub struct SceneQuery<'e, 'a> {
    evaluation: &'e Evaluation<'a>,
    label: String,
    plugs: [PlugId; 8],
}

impl<'e, 'a> SceneQuery<'e, 'a> {
    /// Reader for the scene plug `scene` of `node`
    pub fn new(evaluation: &'e Evaluation<'a>, node: NodeId, scene: &str) -> Result<Self> {
        let mut plugs = [PlugId::default(); 8];
        for (slot, facet) in plugs.iter_mut().zip(Facet::ALL) {
            *slot = evaluation.plug(node, &facet.on(scene))?;
        }
        let label = format!("{}.{}", evaluation.state().node(node)?.name, scene);
        Ok(Self {
            evaluation,
            label,
            plugs,
        })
    }

    /// Evaluation the reader works in
    pub fn evaluation(&self) -> &'e Evaluation<'a> {
        self.evaluation
    }

    /// Child plug holding `facet`
    pub fn plug(&self, facet: Facet) -> PlugId {
        self.plugs[facet as usize]
    }

    fn at(&self, path: &ScenePath) -> Evaluation<'a> {
        let context = self.evaluation.context().with_scene_path(path.clone());
        self.evaluation.with_context(context)
    }

    fn global(&self) -> Evaluation<'a> {
        let context = self.evaluation.context().remove(SCENE_PATH).remove(SET_NAME);
        self.evaluation.with_context(context)
    }

    fn for_set(&self, name: &str) -> Evaluation<'a> {
        let context = self.evaluation.context().remove(SCENE_PATH).set(SET_NAME, name);
        self.evaluation.with_context(context)
    }

    fn typed<T>(&self, evaluation: &Evaluation<'_>, facet: Facet, extract: impl FnOnce(&Value) -> Option<T>) -> Result<T> {
        let value = evaluation.value(self.plug(facet))?;
        extract(&value).ok_or_else(|| GraphError::TypeError {
            plug: format!("{}.{}", self.label, facet),
            expected: facet.plug_type().to_string(),
            found: value.plug_type().to_string(),
        })
    }

    /// Bound of a location
    pub fn bound(&self, path: &ScenePath) -> Result<Box3f> {
        self.typed(&self.at(path), Facet::Bound, Value::as_box3f)
    }

    /// Local transform of a location
    pub fn transform(&self, path: &ScenePath) -> Result<M44f> {
        self.typed(&self.at(path), Facet::Transform, Value::as_m44f)
    }

    /// Transform from a location to the root
    pub fn full_transform(&self, path: &ScenePath) -> Result<M44f> {
        let mut result = M44f::IDENTITY;
        for depth in 1..=path.len() {
            result = self.transform(&path.truncated(depth))? * result;
        }
        Ok(result)
    }

    /// Attributes declared at a location
    pub fn attributes(&self, path: &ScenePath) -> Result<Arc<CompoundValue>> {
        self.typed(&self.at(path), Facet::Attributes, |v| v.as_compound().cloned())
    }

    /// Attributes inherited from every ancestor, deeper locations winning
    pub fn full_attributes(&self, path: &ScenePath) -> Result<Arc<CompoundValue>> {
        let mut merged = CompoundValue::new();
        for depth in 1..=path.len() {
            let attributes = self.attributes(&path.truncated(depth))?;
            merged.extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(Arc::new(merged))
    }

    /// Payload of a location
    pub fn object(&self, path: &ScenePath) -> Result<Arc<ObjectValue>> {
        self.typed(&self.at(path), Facet::Object, |v| v.as_object().cloned())
    }

    /// Names of the children of a location
    pub fn child_names(&self, path: &ScenePath) -> Result<Arc<Vec<String>>> {
        self.typed(&self.at(path), Facet::ChildNames, |v| v.as_names().cloned())
    }

    /// Scene-wide options and outputs
    pub fn globals(&self) -> Result<Arc<CompoundValue>> {
        self.typed(&self.global(), Facet::Globals, |v| v.as_compound().cloned())
    }

    /// Names of every set
    pub fn set_names(&self) -> Result<Arc<Vec<String>>> {
        self.typed(&self.global(), Facet::SetNames, |v| v.as_names().cloned())
    }

    /// Members of a set
    pub fn set(&self, name: &str) -> Result<Arc<PathMatcher>> {
        self.typed(&self.for_set(name), Facet::Set, |v| v.as_path_set().cloned())
    }

    /// True if every name along `path` is a child of its parent
    pub fn exists(&self, path: &ScenePath) -> Result<bool> {
        for (depth, name) in path.names().iter().enumerate() {
            let names = self.child_names(&path.truncated(depth))?;
            if !names.iter().any(|n| n == name) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Union of the children's bounds, each in this location's space
    pub fn child_bounds_union(&self, path: &ScenePath) -> Result<Box3f> {
        let mut result = Box3f::EMPTY;
        for name in self.child_names(path)?.iter() {
            let child = path.child(name.as_str());
            let bound = self.bound(&child)?;
            result.extend_by_box(&self.transform(&child)?.transform_box(&bound));
        }
        Ok(result)
    }

    /// Fingerprint matching [`SceneQuery::child_bounds_union`]
    pub fn child_bounds_union_hash(&self, path: &ScenePath) -> Result<Fingerprint> {
        let mut hasher = FingerprintHasher::new();
        hasher.append_fingerprint(self.child_names_hash(path)?);
        for name in self.child_names(path)?.iter() {
            let child = path.child(name.as_str());
            hasher
                .append_fingerprint(self.bound_hash(&child)?)
                .append_fingerprint(self.transform_hash(&child)?);
        }
        Ok(hasher.finish())
    }

    /// Fingerprint of a per-location facet
    pub fn hash_at(&self, facet: Facet, path: &ScenePath) -> Result<Fingerprint> {
        self.at(path).hash(self.plug(facet))
    }

    /// Fingerprint of the bound of a location
    pub fn bound_hash(&self, path: &ScenePath) -> Result<Fingerprint> {
        self.hash_at(Facet::Bound, path)
    }

    /// Fingerprint of the local transform of a location
    pub fn transform_hash(&self, path: &ScenePath) -> Result<Fingerprint> {
        self.hash_at(Facet::Transform, path)
    }

    /// Fingerprint of the full transform of a location
    pub fn full_transform_hash(&self, path: &ScenePath) -> Result<Fingerprint> {
        let mut hasher = FingerprintHasher::new();
        for depth in 1..=path.len() {
            hasher.append_fingerprint(self.transform_hash(&path.truncated(depth))?);
        }
        Ok(hasher.finish())
    }

    /// Fingerprint of the attributes of a location
    pub fn attributes_hash(&self, path: &ScenePath) -> Result<Fingerprint> {
        self.hash_at(Facet::Attributes, path)
    }

    /// Fingerprint of the inherited attributes of a location
    pub fn full_attributes_hash(&self, path: &ScenePath) -> Result<Fingerprint> {
        let mut hasher = FingerprintHasher::new();
        for depth in 1..=path.len() {
            hasher.append_fingerprint(self.attributes_hash(&path.truncated(depth))?);
        }
        Ok(hasher.finish())
    }

    /// Fingerprint of the object of a location
    pub fn object_hash(&self, path: &ScenePath) -> Result<Fingerprint> {
        self.hash_at(Facet::Object, path)
    }

    /// Fingerprint of the child names of a location
    pub fn child_names_hash(&self, path: &ScenePath) -> Result<Fingerprint> {
        self.hash_at(Facet::ChildNames, path)
    }

    /// Fingerprint of the globals
    pub fn globals_hash(&self) -> Result<Fingerprint> {
        self.global().hash(self.plug(Facet::Globals))
    }

    /// Fingerprint of the set names
    pub fn set_names_hash(&self) -> Result<Fingerprint> {
        self.global().hash(self.plug(Facet::SetNames))
    }

    /// Fingerprint of a set
    pub fn set_hash(&self, name: &str) -> Result<Fingerprint> {
        self.for_set(name).hash(self.plug(Facet::Set))
    }
}

/// Scene facets of a graph plug, read from outside the graph
#[derive(Clone)]
pub struct SceneView {
    graph: Graph,
    node: NodeId,
    scene: String,
    context: Context,
}

impl SceneView {
    /// View of the `out` plug of a scene node
    pub fn new(graph: &Graph, node: NodeId) -> Self {
        Self::with_plug(graph, node, "out")
    }

    /// View of any scene plug
    pub fn with_plug(graph: &Graph, node: NodeId, scene: &str) -> Self {
        Self {
            graph: graph.clone(),
            node,
            scene: scene.to_string(),
            context: Context::new(),
        }
    }

    /// Same view under another context
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Graph the view reads
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Node owning the scene plug
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Context queries run under
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Run several queries under one read lock
    pub fn query<R>(&self, f: impl FnOnce(&SceneQuery<'_, '_>) -> Result<R>) -> Result<R> {
        self.graph.evaluate(&self.context, |evaluation| {
            f(&SceneQuery::new(evaluation, self.node, &self.scene)?)
        })
    }

    /// Like [`SceneView::query`], polling `canceller` before each computation
    pub fn query_cancellable<R>(
        &self,
        canceller: &Canceller,
        f: impl FnOnce(&SceneQuery<'_, '_>) -> Result<R>,
    ) -> Result<R> {
        self.graph.evaluate_cancellable(&self.context, canceller, |evaluation| {
            f(&SceneQuery::new(evaluation, self.node, &self.scene)?)
        })
    }

    /// Bound of a location
    pub fn bound(&self, path: &ScenePath) -> Result<Box3f> {
        self.query(|q| q.bound(path))
    }

    /// Local transform of a location
    pub fn transform(&self, path: &ScenePath) -> Result<M44f> {
        self.query(|q| q.transform(path))
    }

    /// Transform from a location to the root
    pub fn full_transform(&self, path: &ScenePath) -> Result<M44f> {
        self.query(|q| q.full_transform(path))
    }

    /// Attributes declared at a location
    pub fn attributes(&self, path: &ScenePath) -> Result<Arc<CompoundValue>> {
        self.query(|q| q.attributes(path))
    }

    /// Inherited attributes of a location
    pub fn full_attributes(&self, path: &ScenePath) -> Result<Arc<CompoundValue>> {
        self.query(|q| q.full_attributes(path))
    }

    /// Payload of a location
    pub fn object(&self, path: &ScenePath) -> Result<Arc<ObjectValue>> {
        self.query(|q| q.object(path))
    }

    /// Names of the children of a location
    pub fn child_names(&self, path: &ScenePath) -> Result<Arc<Vec<String>>> {
        self.query(|q| q.child_names(path))
    }

    /// Scene-wide options and outputs
    pub fn globals(&self) -> Result<Arc<CompoundValue>> {
        self.query(|q| q.globals())
    }

    /// Names of every set
    pub fn set_names(&self) -> Result<Arc<Vec<String>>> {
        self.query(|q| q.set_names())
    }

    /// Members of a set
    pub fn set(&self, name: &str) -> Result<Arc<PathMatcher>> {
        self.query(|q| q.set(name))
    }

    /// True if the location exists
    pub fn exists(&self, path: &ScenePath) -> Result<bool> {
        self.query(|q| q.exists(path))
    }

    /// Fingerprint of a per-location facet
    pub fn hash_at(&self, facet: Facet, path: &ScenePath) -> Result<Fingerprint> {
        self.query(|q| q.hash_at(facet, path))
    }

    /// Fingerprint of the full transform of a location
    pub fn full_transform_hash(&self, path: &ScenePath) -> Result<Fingerprint> {
        self.query(|q| q.full_transform_hash(path))
    }

    /// Fingerprint of the inherited attributes of a location
    pub fn full_attributes_hash(&self, path: &ScenePath) -> Result<Fingerprint> {
        self.query(|q| q.full_attributes_hash(path))
    }

    /// Fingerprint of the globals
    pub fn globals_hash(&self) -> Result<Fingerprint> {
        self.query(|q| q.globals_hash())
    }

    /// Fingerprint of the set names
    pub fn set_names_hash(&self) -> Result<Fingerprint> {
        self.query(|q| q.set_names_hash())
    }

    /// Fingerprint of a set
    pub fn set_hash(&self, name: &str) -> Result<Fingerprint> {
        self.query(|q| q.set_hash(name))
    }
}

impl std::fmt::Debug for SceneView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneView")
            .field("node", &self.node)
            .field("scene", &self.scene)
            .field("context", &self.context)
            .finish()
    }
}
