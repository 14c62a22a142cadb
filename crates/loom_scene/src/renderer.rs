// SPDX-License-Identifier: MIT OR Apache-2.0
//! Renderer sinks fed by the procedural traversal, and their registry.

use indexmap::IndexMap;
use loom_graph::{Box3f, CompoundValue, M44f, ObjectValue, ScenePath, Value};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, OnceLock};

/// A value at one motion sample time
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    /// Frame the value was evaluated at
    pub time: f32,
    /// Sampled value
    pub value: T,
}

/// Everything emitted for one location holding an object
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// Location in the scene
    pub path: ScenePath,
    /// Attributes inherited from every ancestor
    pub attributes: Arc<CompoundValue>,
    /// Full transform samples, a single one without motion blur
    pub transforms: Vec<Sample<M44f>>,
    /// Object samples, a single one without deformation blur
    pub objects: Vec<Sample<Arc<ObjectValue>>>,
}

/// Receives a scene from the traversal. Calls may arrive from several
/// threads at once.
pub trait Renderer: Send + Sync {
    /// A render option from the globals
    fn option(&self, name: &str, value: &Value);

    /// An output declaration from the globals
    fn output(&self, name: &str, value: &Value);

    /// An object with its sampled transforms
    fn object(&self, location: &Location);

    /// Placeholder for a location that was not expanded
    fn bound(&self, path: &ScenePath, transform: &M44f, bound: &Box3f);
}

/// One recorded renderer call
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    /// [`Renderer::option`]
    Option(String, Value),
    /// [`Renderer::output`]
    Output(String, Value),
    /// [`Renderer::object`]
    Object(Location),
    /// [`Renderer::bound`]
    Bound(ScenePath, M44f, Box3f),
}

/// Renderer that records every call
#[derive(Debug, Default)]
pub struct CaptureRenderer {
    calls: Mutex<Vec<RenderCall>>,
}

impl CaptureRenderer {
    /// Empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls received so far, in arrival order
    pub fn calls(&self) -> Vec<RenderCall> {
        self.calls.lock().clone()
    }

    /// Objects received so far, sorted by path
    pub fn objects(&self) -> Vec<Location> {
        let mut objects: Vec<Location> = self
            .calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RenderCall::Object(location) => Some(location.clone()),
                _ => None,
            })
            .collect();
        objects.sort_by_key(|location| location.path.to_string());
        objects
    }

    /// Paths of the placeholders received so far, sorted
    pub fn bounds(&self) -> Vec<ScenePath> {
        let mut paths: Vec<ScenePath> = self
            .calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RenderCall::Bound(path, ..) => Some(path.clone()),
                _ => None,
            })
            .collect();
        paths.sort_by_key(ToString::to_string);
        paths
    }

    /// Forget every call
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl Renderer for CaptureRenderer {
    fn option(&self, name: &str, value: &Value) {
        self.calls.lock().push(RenderCall::Option(name.to_string(), value.clone()));
    }

    fn output(&self, name: &str, value: &Value) {
        self.calls.lock().push(RenderCall::Output(name.to_string(), value.clone()));
    }

    fn object(&self, location: &Location) {
        self.calls.lock().push(RenderCall::Object(location.clone()));
    }

    fn bound(&self, path: &ScenePath, transform: &M44f, bound: &Box3f) {
        self.calls.lock().push(RenderCall::Bound(path.clone(), *transform, *bound));
    }
}

/// Renderer that traces every call
#[derive(Debug, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn option(&self, name: &str, value: &Value) {
        tracing::info!(name, ?value, "option");
    }

    fn output(&self, name: &str, value: &Value) {
        tracing::info!(name, ?value, "output");
    }

    fn object(&self, location: &Location) {
        let kind = location.objects.first().map(|s| s.value.kind.as_str()).unwrap_or_default();
        tracing::info!(
            path = %location.path,
            kind,
            transform_samples = location.transforms.len(),
            object_samples = location.objects.len(),
            attributes = location.attributes.len(),
            "object"
        );
    }

    fn bound(&self, path: &ScenePath, transform: &M44f, bound: &Box3f) {
        tracing::info!(path = %path, translation = ?transform.translation(), ?bound, "bound");
    }
}

/// Constructor registered for a renderer type
pub type RendererCreator = Arc<dyn Fn() -> Arc<dyn Renderer> + Send + Sync>;

fn registry() -> &'static RwLock<IndexMap<String, RendererCreator>> {
    static REGISTRY: OnceLock<RwLock<IndexMap<String, RendererCreator>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut types: IndexMap<String, RendererCreator> = IndexMap::new();
        types.insert("Capture".to_string(), Arc::new(|| Arc::new(CaptureRenderer::new())));
        types.insert("Log".to_string(), Arc::new(|| Arc::new(LogRenderer)));
        RwLock::new(types)
    })
}

/// Register a renderer type, replacing any previous one of the same name
pub fn register_renderer<F>(name: impl Into<String>, creator: F)
where
    F: Fn() -> Arc<dyn Renderer> + Send + Sync + 'static,
{
    let name = name.into();
    if registry().write().insert(name.clone(), Arc::new(creator)).is_some() {
        tracing::debug!("Replaced renderer type '{}'", name);
    }
}

/// Create a renderer of a registered type
pub fn create_renderer(name: &str) -> Option<Arc<dyn Renderer>> {
    let creator = registry().read().get(name).cloned()?;
    Some(creator())
}

/// Registered renderer types in registration order
pub fn registered_renderers() -> Vec<String> {
    registry().read().keys().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_renderers() {
        let types = registered_renderers();
        assert_eq!(&types[..2], &["Capture".to_string(), "Log".to_string()]);
        assert!(create_renderer("Log").is_some());
        assert!(create_renderer("Nope").is_none());
    }

    #[test]
    fn test_reregistration_keeps_order() {
        register_renderer("TestSink", || Arc::new(LogRenderer));
        register_renderer("TestSink", || Arc::new(CaptureRenderer::new()));
        let types = registered_renderers();
        assert_eq!(types.iter().filter(|t| t.as_str() == "TestSink").count(), 1);
        assert!(create_renderer("TestSink").is_some());
    }

    #[test]
    fn test_capture_records_calls() {
        let renderer = CaptureRenderer::new();
        renderer.option("option:render:shutter", &Value::Float(0.5));
        renderer.bound(&ScenePath::parse("/a"), &M44f::IDENTITY, &Box3f::EMPTY);
        assert_eq!(renderer.calls().len(), 2);
        assert_eq!(renderer.bounds(), vec![ScenePath::parse("/a")]);
        renderer.clear();
        assert!(renderer.calls().is_empty());
    }
}
