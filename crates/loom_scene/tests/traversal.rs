// SPDX-License-Identifier: MIT OR Apache-2.0
//! Procedural traversal into a renderer.
//!
//! The pending unit counter is process-wide, so every test that renders
//! runs serially.

use loom_graph::{
    Box3f, Canceller, CompoundValue, EngineConfig, Graph, GraphError, NodeId, ScenePath, TaskStatus, V2f, V3f, Value,
};
use loom_scene::{
    add_drained_listener, add_group_input, pending_units, remove_drained_listener, render, scene_node, spawn_render,
    CaptureRenderer, ConstraintKind, ConstraintNode, Group, ObjectSource, Options, PathFilter, RenderCall,
    SceneView, TraversalReport, TraversalSettings,
};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn set(graph: &Graph, node: NodeId, name: &str, value: impl Into<Value>) {
    graph.set_value(graph.plug(node, name).unwrap(), value).unwrap();
}

fn connect(graph: &Graph, node: NodeId, input: &str, source: NodeId, output: &str) {
    graph
        .connect(graph.plug(node, input).unwrap(), graph.plug(source, output).unwrap())
        .unwrap();
}

/// `/a/b` and `/a/c` below a group, `/a/c` at x = 5
fn scene() -> (Graph, NodeId, NodeId) {
    let graph = Graph::isolated(EngineConfig::default());
    let b = graph.add_node("b", scene_node(ObjectSource)).unwrap();
    set(&graph, b, "name", "b");
    set(&graph, b, "objectBound", Box3f::new(V3f::ZERO, V3f::splat(2.0)));

    let c = graph.add_node("c", scene_node(ObjectSource)).unwrap();
    set(&graph, c, "name", "c");
    set(&graph, c, "translate", V3f::new(5.0, 0.0, 0.0));

    let group = graph.add_node("group", scene_node(Group)).unwrap();
    set(&graph, group, "name", "a");
    connect(&graph, group, "in0", b, "out");
    let in1 = add_group_input(&graph, group).unwrap();
    graph.connect(in1, graph.plug(c, "out").unwrap()).unwrap();
    (graph, group, c)
}

fn run(view: &SceneView, settings: &TraversalSettings) -> (CaptureRenderer, TraversalReport) {
    let renderer = CaptureRenderer::new();
    let report = render(view, &renderer, settings, &Canceller::new()).unwrap();
    (renderer, report)
}

#[test]
#[serial]
fn test_render_emits_every_object() {
    let (graph, group, _) = scene();
    let (renderer, report) = run(&SceneView::new(&graph, group), &TraversalSettings::default());

    assert_eq!(
        report,
        TraversalReport {
            locations: 4,
            objects: 2,
            placeholders: 0,
            errors: 0,
        }
    );
    let objects = renderer.objects();
    assert_eq!(objects[0].path, ScenePath::parse("/a/b"));
    assert_eq!(objects[1].path, ScenePath::parse("/a/c"));
    assert_eq!(objects[1].transforms.len(), 1);
    assert_eq!(objects[1].transforms[0].value.translation(), V3f::new(5.0, 0.0, 0.0));
    assert_eq!(objects[1].objects[0].value.kind, "mesh");
    assert_eq!(pending_units(), 0);
}

#[test]
#[serial]
fn test_options_come_first_and_drive_motion() {
    let (graph, group, c) = scene();
    let mut attributes = CompoundValue::new();
    attributes.insert("render:transformBlurSegments".to_string(), Value::Int(2));
    set(&graph, c, "attributes", attributes);

    let options = graph.add_node("options", scene_node(Options)).unwrap();
    connect(&graph, options, "in", group, "out");
    let mut entries = CompoundValue::new();
    entries.insert("render:transformBlur".to_string(), Value::Bool(true));
    entries.insert("render:shutter".to_string(), Value::V2f(V2f::new(-0.5, 0.5)));
    set(&graph, options, "options", entries);

    let (renderer, _) = run(&SceneView::new(&graph, options), &TraversalSettings::default());
    let calls = renderer.calls();
    assert!(matches!(&calls[0], RenderCall::Option(..)));
    assert!(matches!(&calls[1], RenderCall::Option(..)));

    let objects = renderer.objects();
    assert_eq!(objects[0].transforms.len(), 2);
    let times: Vec<f32> = objects[1].transforms.iter().map(|s| s.time).collect();
    assert_eq!(times, vec![0.5, 1.0, 1.5]);
    assert_eq!(objects[1].objects.len(), 1);
}

#[test]
#[serial]
fn test_unexpanded_locations_become_bounds() {
    let (graph, group, _) = scene();
    let view = SceneView::new(&graph, group);

    let settings = TraversalSettings {
        paths_to_expand: Some(vec!["/".to_string()]),
        ..TraversalSettings::default()
    };
    let (renderer, report) = run(&view, &settings);
    assert_eq!(report.objects, 0);
    assert_eq!(report.placeholders, 1);
    assert_eq!(renderer.bounds(), vec![ScenePath::parse("/a")]);

    let settings = TraversalSettings {
        paths_to_expand: Some(Vec::new()),
        min_expansion_depth: 2,
        threads: 2,
        ..TraversalSettings::default()
    };
    let (renderer, report) = run(&view, &settings);
    assert_eq!(report.objects, 2);
    assert!(renderer.bounds().is_empty());
}

#[test]
#[serial]
fn test_drained_listener_fires_once_per_traversal() {
    let (graph, group, _) = scene();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let id = add_drained_listener(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    run(&SceneView::new(&graph, group), &TraversalSettings::default());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(pending_units(), 0);

    assert!(remove_drained_listener(id));
    run(&SceneView::new(&graph, group), &TraversalSettings::default());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn test_cancelled_render() {
    let (graph, group, _) = scene();
    let canceller = Canceller::new();
    canceller.cancel();
    let renderer = CaptureRenderer::new();
    let result = render(&SceneView::new(&graph, group), &renderer, &TraversalSettings::default(), &canceller);
    assert_eq!(result, Err(GraphError::Cancelled));
    assert!(renderer.calls().is_empty());
    assert_eq!(pending_units(), 0);
}

#[test]
#[serial]
fn test_evaluation_errors_are_counted() {
    let (graph, group, _) = scene();
    let filter = graph.add_node("filter", Arc::new(PathFilter)).unwrap();
    set(&graph, filter, "paths", Value::names(["/a/c"]));
    let constraint = graph
        .add_node("constraint", scene_node(ConstraintNode::new(ConstraintKind::Point)))
        .unwrap();
    connect(&graph, constraint, "in", group, "out");
    connect(&graph, constraint, "filter", filter, "match");
    set(&graph, constraint, "target", "/nowhere");

    let (_, report) = run(&SceneView::new(&graph, constraint), &TraversalSettings::default());
    assert_eq!(report.errors, 1);
    assert_eq!(report.objects, 0);
    assert_eq!(pending_units(), 0);
}

#[test]
#[serial]
fn test_spawned_render_completes() {
    let (graph, group, _) = scene();
    let renderer = Arc::new(CaptureRenderer::new());
    let handle = spawn_render(SceneView::new(&graph, group), renderer.clone(), TraversalSettings::default());
    assert_eq!(handle.wait(), TaskStatus::Completed);
    assert_eq!(handle.report().map(|r| r.objects), Some(2));
    assert_eq!(renderer.objects().len(), 2);
}
