// SPDX-License-Identifier: MIT OR Apache-2.0
//! Procedural traversal of a scene into a [`Renderer`].
//!
//! Every visited location is an [`ExpansionUnit`]. Units are counted in a
//! process-wide pending counter from creation until they have emitted (or
//! were dropped unrun), and listeners registered with
//! [`add_drained_listener`] fire each time the counter falls back to zero.

use crate::nodes::OPTION_PREFIX;
use crate::query::SceneView;
use crate::renderer::{Location, Renderer, Sample};
use loom_graph::{
    BackgroundTask, Canceller, CompoundValue, ConfigError, GraphError, MatchResult, ObjectValue, PathMatcher,
    Result, ScenePath, Subject, TaskStatus, V2f, Value,
};
use parking_lot::Mutex;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Globals entry enabling transform blur
pub const TRANSFORM_BLUR_OPTION: &str = "option:render:transformBlur";
/// Globals entry enabling deformation blur
pub const DEFORMATION_BLUR_OPTION: &str = "option:render:deformationBlur";
/// Globals entry holding the shutter interval, relative to the frame
pub const SHUTTER_OPTION: &str = "option:render:shutter";

/// Attribute toggling transform blur for a location
pub const TRANSFORM_BLUR_ATTRIBUTE: &str = "render:transformBlur";
/// Attribute setting the transform blur segment count
pub const TRANSFORM_BLUR_SEGMENTS_ATTRIBUTE: &str = "render:transformBlurSegments";
/// Attribute toggling deformation blur for a location
pub const DEFORMATION_BLUR_ATTRIBUTE: &str = "render:deformationBlur";
/// Attribute setting the deformation blur segment count
pub const DEFORMATION_BLUR_SEGMENTS_ATTRIBUTE: &str = "render:deformationBlurSegments";

static PENDING: AtomicUsize = AtomicUsize::new(0);
static NEXT_LISTENER: AtomicU64 = AtomicU64::new(1);

type DrainedListener = Arc<dyn Fn() + Send + Sync>;

fn listeners() -> &'static Mutex<Vec<(u64, DrainedListener)>> {
    static LISTENERS: OnceLock<Mutex<Vec<(u64, DrainedListener)>>> = OnceLock::new();
    LISTENERS.get_or_init(|| Mutex::new(Vec::new()))
}

/// Handle for removing a drained listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Call `listener` every time the last pending expansion unit finishes
pub fn add_drained_listener(listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
    let id = NEXT_LISTENER.fetch_add(1, Ordering::Relaxed);
    listeners().lock().push((id, Arc::new(listener)));
    ListenerId(id)
}

/// Stop notifying a listener. Returns false if it was not registered.
pub fn remove_drained_listener(id: ListenerId) -> bool {
    let mut listeners = listeners().lock();
    let before = listeners.len();
    listeners.retain(|(existing, _)| *existing != id.0);
    listeners.len() != before
}

/// Expansion units created but not yet finished, across all traversals
pub fn pending_units() -> usize {
    PENDING.load(Ordering::SeqCst)
}

fn notify_drained() {
    let snapshot: Vec<DrainedListener> = listeners().lock().iter().map(|(_, l)| l.clone()).collect();
    tracing::debug!("Traversal drained, notifying {} listeners", snapshot.len());
    for listener in snapshot {
        listener();
    }
}

/// One location waiting to be emitted
pub struct ExpansionUnit {
    path: ScenePath,
    inherited: Arc<CompoundValue>,
    finished: bool,
}

impl ExpansionUnit {
    fn new(path: ScenePath, inherited: Arc<CompoundValue>) -> Self {
        PENDING.fetch_add(1, Ordering::SeqCst);
        Self {
            path,
            inherited,
            finished: false,
        }
    }

    /// Location of the unit
    pub fn path(&self) -> &ScenePath {
        &self.path
    }

    fn finish(&mut self) {
        if std::mem::replace(&mut self.finished, true) {
            return;
        }
        if PENDING.fetch_sub(1, Ordering::SeqCst) == 1 {
            notify_drained();
        }
    }
}

impl Drop for ExpansionUnit {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Which locations get expanded and how the work is scheduled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalSettings {
    /// Location the traversal starts from
    pub root: String,
    /// Locations shallower than this always have their children expanded
    pub min_expansion_depth: usize,
    /// Locations whose children are expanded; `None` expands everything.
    /// Other locations with children are emitted as bounding boxes.
    pub paths_to_expand: Option<Vec<String>>,
    /// Worker threads for a dedicated pool; zero uses the global pool
    pub threads: usize,
}

impl Default for TraversalSettings {
    fn default() -> Self {
        Self {
            root: "/".to_string(),
            min_expansion_depth: 0,
            paths_to_expand: None,
            threads: 0,
        }
    }
}

impl TraversalSettings {
    /// Load settings from a RON file
    pub fn load(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(ron::from_str(&contents)?)
    }

    /// Save settings to a RON file
    pub fn save(&self, path: impl AsRef<Path>) -> std::result::Result<(), ConfigError> {
        let contents = ron::ser::to_string_pretty(self, PrettyConfig::default().struct_names(true))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Motion blur settings read from the globals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionOptions {
    /// Sample full transforms across the shutter
    pub transform_blur: bool,
    /// Sample objects across the shutter
    pub deformation_blur: bool,
    /// Shutter interval relative to the frame
    pub shutter: V2f,
}

impl Default for MotionOptions {
    fn default() -> Self {
        Self {
            transform_blur: false,
            deformation_blur: false,
            shutter: V2f::new(-0.25, 0.25),
        }
    }
}

impl MotionOptions {
    /// Options from a globals dictionary
    pub fn from_globals(globals: &CompoundValue) -> Self {
        let defaults = Self::default();
        Self {
            transform_blur: globals
                .get(TRANSFORM_BLUR_OPTION)
                .and_then(Value::as_bool)
                .unwrap_or(defaults.transform_blur),
            deformation_blur: globals
                .get(DEFORMATION_BLUR_OPTION)
                .and_then(Value::as_bool)
                .unwrap_or(defaults.deformation_blur),
            shutter: globals.get(SHUTTER_OPTION).and_then(Value::as_v2f).unwrap_or(defaults.shutter),
        }
    }
}

/// Frames to sample at. A single sample at `frame` unless blur is on and at
/// least one segment is requested.
pub fn sample_times(frame: f32, blur: bool, segments: i64, shutter: V2f) -> Vec<f32> {
    if !blur || segments <= 0 {
        return vec![frame];
    }
    (0..=segments)
        .map(|i| {
            let t = i as f32 / segments as f32;
            frame + shutter.x + (shutter.y - shutter.x) * t
        })
        .collect()
}

/// Counts from a finished traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalReport {
    /// Locations visited
    pub locations: usize,
    /// Objects emitted
    pub objects: usize,
    /// Bounding box placeholders emitted
    pub placeholders: usize,
    /// Locations that failed to evaluate
    pub errors: usize,
}

#[derive(Default)]
struct Counters {
    locations: AtomicUsize,
    objects: AtomicUsize,
    placeholders: AtomicUsize,
    errors: AtomicUsize,
}

impl Counters {
    fn report(&self) -> TraversalReport {
        TraversalReport {
            locations: self.locations.load(Ordering::Relaxed),
            objects: self.objects.load(Ordering::Relaxed),
            placeholders: self.placeholders.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

fn attribute_bool(attributes: &CompoundValue, name: &str, default: bool) -> bool {
    attributes.get(name).and_then(Value::as_bool).unwrap_or(default)
}

fn attribute_int(attributes: &CompoundValue, name: &str, default: i64) -> i64 {
    attributes.get(name).and_then(Value::as_int).unwrap_or(default)
}

struct Traversal<'r> {
    view: &'r SceneView,
    renderer: &'r dyn Renderer,
    canceller: &'r Canceller,
    expand: Option<PathMatcher>,
    min_expansion_depth: usize,
    motion: MotionOptions,
    counters: Counters,
}

impl Traversal<'_> {
    fn should_expand(&self, path: &ScenePath) -> bool {
        match &self.expand {
            None => true,
            Some(matcher) => {
                path.len() < self.min_expansion_depth || matcher.match_path(path).contains(MatchResult::EXACT)
            }
        }
    }

    fn visit<'s>(&'s self, scope: &rayon::Scope<'s>, mut unit: ExpansionUnit) {
        if self.canceller.is_cancelled() {
            return;
        }
        match self.emit(&unit) {
            Ok((children, attributes)) => {
                for name in children.iter() {
                    if self.canceller.is_cancelled() {
                        break;
                    }
                    let child = ExpansionUnit::new(unit.path.child(name.as_str()), attributes.clone());
                    scope.spawn(move |scope| self.visit(scope, child));
                }
            }
            Err(error) if error.is_cancelled() => {}
            Err(error) => {
                tracing::error!(path = %unit.path, %error, "Failed to expand location");
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        unit.finish();
    }

    fn sample<T>(
        &self,
        times: &[f32],
        at_frame: &T,
        f: impl Fn(&SceneView) -> Result<T>,
    ) -> Result<Vec<Sample<T>>>
    where
        T: Clone,
    {
        let frame = self.view.context().frame();
        times
            .iter()
            .map(|&time| {
                let value = if time == frame {
                    at_frame.clone()
                } else {
                    let context = self.view.context().with_frame(time);
                    f(&self.view.clone().with_context(context))?
                };
                Ok(Sample { time, value })
            })
            .collect()
    }

    /// Emit one location; returns the children to expand and the attributes
    /// they inherit
    fn emit(&self, unit: &ExpansionUnit) -> Result<(Arc<Vec<String>>, Arc<CompoundValue>)> {
        let path = &unit.path;
        let (local, children, bound, transform, object) = self.view.query_cancellable(self.canceller, |q| {
            Ok((
                q.attributes(path)?,
                q.child_names(path)?,
                q.bound(path)?,
                q.full_transform(path)?,
                q.object(path)?,
            ))
        })?;
        self.counters.locations.fetch_add(1, Ordering::Relaxed);

        let mut merged = unit.inherited.as_ref().clone();
        merged.extend(local.iter().map(|(k, v)| (k.clone(), v.clone())));
        let attributes = Arc::new(merged);

        if !object.is_null() {
            let frame = self.view.context().frame();
            let transform_times = sample_times(
                frame,
                self.motion.transform_blur && attribute_bool(&attributes, TRANSFORM_BLUR_ATTRIBUTE, true),
                attribute_int(&attributes, TRANSFORM_BLUR_SEGMENTS_ATTRIBUTE, 1),
                self.motion.shutter,
            );
            let deformation_times = sample_times(
                frame,
                self.motion.deformation_blur && attribute_bool(&attributes, DEFORMATION_BLUR_ATTRIBUTE, true),
                attribute_int(&attributes, DEFORMATION_BLUR_SEGMENTS_ATTRIBUTE, 1),
                self.motion.shutter,
            );
            let transforms = self.sample(&transform_times, &transform, |view| {
                view.query_cancellable(self.canceller, |q| q.full_transform(path))
            })?;
            let objects: Vec<Sample<Arc<ObjectValue>>> = self.sample(&deformation_times, &object, |view| {
                view.query_cancellable(self.canceller, |q| q.object(path))
            })?;

            self.canceller.check()?;
            self.renderer.object(&Location {
                path: path.clone(),
                attributes: attributes.clone(),
                transforms,
                objects,
            });
            self.counters.objects.fetch_add(1, Ordering::Relaxed);
        }

        if children.is_empty() || self.should_expand(path) {
            return Ok((children, attributes));
        }
        self.canceller.check()?;
        self.renderer.bound(path, &transform, &bound);
        self.counters.placeholders.fetch_add(1, Ordering::Relaxed);
        Ok((Arc::default(), attributes))
    }
}

fn emit_globals(globals: &CompoundValue, renderer: &dyn Renderer) {
    for (name, value) in globals {
        if name.starts_with(OPTION_PREFIX) {
            renderer.option(name, value);
        } else if name.starts_with("output:") {
            renderer.output(name, value);
        }
    }
}

/// Traverse the scene from `settings.root`, feeding `renderer`.
///
/// Locations that fail to evaluate are logged and counted and their
/// subtrees skipped. Fails with `Cancelled` if `canceller` fired before the
/// traversal finished.
pub fn render(
    view: &SceneView,
    renderer: &dyn Renderer,
    settings: &TraversalSettings,
    canceller: &Canceller,
) -> Result<TraversalReport> {
    let root = ScenePath::parse(&settings.root);
    let (globals, inherited) = view.query_cancellable(canceller, |q| {
        let inherited = match root.parent() {
            Some(parent) => q.full_attributes(&parent)?,
            None => Arc::default(),
        };
        Ok((q.globals()?, inherited))
    })?;
    emit_globals(&globals, renderer);

    let traversal = Traversal {
        view,
        renderer,
        canceller,
        expand: settings
            .paths_to_expand
            .as_ref()
            .map(|paths| PathMatcher::from_strs(paths.iter())),
        min_expansion_depth: settings.min_expansion_depth,
        motion: MotionOptions::from_globals(&globals),
        counters: Counters::default(),
    };

    tracing::debug!(root = %root, threads = settings.threads, "Starting traversal");
    let unit = ExpansionUnit::new(root, inherited);
    if settings.threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.threads)
            .thread_name(|index| format!("loom-traversal-{index}"))
            .build()
            .map_err(|e| GraphError::InvalidState(format!("Failed to build traversal pool: {e}")))?;
        pool.scope(|scope| traversal.visit(scope, unit));
    } else {
        rayon::scope(|scope| traversal.visit(scope, unit));
    }

    canceller.check()?;
    let report = traversal.counters.report();
    tracing::debug!(?report, "Traversal finished");
    Ok(report)
}

/// A traversal running as a background task of the scene's graph
pub struct RenderHandle {
    task: BackgroundTask,
    report: Arc<Mutex<Option<TraversalReport>>>,
}

impl RenderHandle {
    /// Request cancellation
    pub fn cancel(&self) {
        self.task.cancel();
    }

    /// Block until the traversal finishes
    pub fn wait(&self) -> TaskStatus {
        self.task.wait()
    }

    /// Current status
    pub fn status(&self) -> TaskStatus {
        self.task.status()
    }

    /// Report of a completed traversal
    pub fn report(&self) -> Option<TraversalReport> {
        *self.report.lock()
    }

    /// Error of a failed traversal
    pub fn error(&self) -> Option<GraphError> {
        self.task.error()
    }
}

/// Run [`render`] on a background thread. Edits upstream of the viewed node
/// cancel it.
pub fn spawn_render(view: SceneView, renderer: Arc<dyn Renderer>, settings: TraversalSettings) -> RenderHandle {
    let report = Arc::new(Mutex::new(None));
    let slot = report.clone();
    let graph = view.graph().clone();
    let task = graph.spawn_background(Subject::Node(view.node()), move |_, canceller| {
        let result = render(&view, renderer.as_ref(), &settings, canceller)?;
        *slot.lock() = Some(result);
        Ok(())
    });
    RenderHandle { task, report }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sample_times() {
        let shutter = V2f::new(-0.25, 0.25);
        assert_eq!(sample_times(1.0, false, 4, shutter), vec![1.0]);
        assert_eq!(sample_times(1.0, true, 0, shutter), vec![1.0]);
        assert_eq!(sample_times(1.0, true, 2, shutter), vec![0.75, 1.0, 1.25]);
    }

    #[test]
    fn test_motion_options_from_globals() {
        let mut globals = CompoundValue::new();
        assert_eq!(MotionOptions::from_globals(&globals), MotionOptions::default());

        globals.insert(TRANSFORM_BLUR_OPTION.to_string(), Value::Bool(true));
        globals.insert(SHUTTER_OPTION.to_string(), Value::V2f(V2f::new(0.0, 0.5)));
        let options = MotionOptions::from_globals(&globals);
        assert!(options.transform_blur);
        assert!(!options.deformation_blur);
        assert_eq!(options.shutter, V2f::new(0.0, 0.5));
    }

    #[test]
    fn test_settings_ron() {
        let loaded: TraversalSettings = ron::from_str("(min_expansion_depth: 2, paths_to_expand: Some([\"/a\"]))").unwrap();
        assert_eq!(loaded.min_expansion_depth, 2);
        assert_eq!(loaded.paths_to_expand, Some(vec!["/a".to_string()]));
        assert_eq!(loaded.root, "/");
    }

    #[test]
    fn test_settings_save_and_load() {
        let path = std::env::temp_dir().join(format!("loom-traversal-{}.ron", std::process::id()));
        let settings = TraversalSettings {
            threads: 2,
            ..TraversalSettings::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(TraversalSettings::load(&path).unwrap(), settings);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_listener_removal() {
        let id = add_drained_listener(|| {});
        assert!(remove_drained_listener(id));
        assert!(!remove_drained_listener(id));
    }

    proptest! {
        #[test]
        fn prop_sample_times_span_shutter(
            frame in -100.0f32..100.0,
            segments in 1i64..16,
            open in -1.0f32..0.0,
            close in 0.0f32..1.0,
        ) {
            let times = sample_times(frame, true, segments, V2f::new(open, close));
            prop_assert_eq!(times.len() as i64, segments + 1);
            prop_assert!((times[0] - (frame + open)).abs() < 1e-4);
            prop_assert!((times[times.len() - 1] - (frame + close)).abs() < 1e-4);
            prop_assert!(times.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
