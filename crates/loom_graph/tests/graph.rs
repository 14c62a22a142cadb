// SPDX-License-Identifier: MIT OR Apache-2.0
//! Topology, dirty propagation and the hash/compute protocol.

use loom_graph::{
    Context, Direction, EngineConfig, Graph, GraphError, NodeBehavior, NodeId, NodeScope, PlugId, PlugSpec,
    PlugType, Result, Value,
};
use loom_graph::fingerprint::Fingerprint;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// `sum = a + b`; `unused` affects nothing
#[derive(Default)]
struct Add {
    computes: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl NodeBehavior for Add {
    fn type_name(&self) -> &str {
        "Add"
    }

    fn declare(&self) -> Vec<PlugSpec> {
        vec![
            PlugSpec::input("a", PlugType::Float),
            PlugSpec::input("b", PlugType::Float),
            PlugSpec::input("unused", PlugType::Int),
            PlugSpec::output("sum", PlugType::Float),
        ]
    }

    fn affects(&self, input: &str) -> Vec<String> {
        match input {
            "a" | "b" => vec!["sum".to_string()],
            _ => Vec::new(),
        }
    }

    fn hash(&self, output: &str, scope: &NodeScope<'_, '_>) -> Result<Fingerprint> {
        let mut hasher = scope.hasher(output);
        hasher
            .append_fingerprint(scope.hash_of("a")?)
            .append_fingerprint(scope.hash_of("b")?);
        Ok(hasher.finish())
    }

    fn compute(&self, _output: &str, scope: &NodeScope<'_, '_>) -> Result<Value> {
        self.computes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Ok(Value::Float(scope.get_float("a")? + scope.get_float("b")?))
    }
}

/// Outputs a string
struct Label;

impl NodeBehavior for Label {
    fn type_name(&self) -> &str {
        "Label"
    }

    fn declare(&self) -> Vec<PlugSpec> {
        vec![
            PlugSpec::input("text", PlugType::String),
            PlugSpec::output("out", PlugType::String),
        ]
    }

    fn compute(&self, _output: &str, scope: &NodeScope<'_, '_>) -> Result<Value> {
        scope.get("text")
    }
}

/// Declares a float output but produces an int
struct Liar;

impl NodeBehavior for Liar {
    fn type_name(&self) -> &str {
        "Liar"
    }

    fn declare(&self) -> Vec<PlugSpec> {
        vec![PlugSpec::output("out", PlugType::Float)]
    }

    fn compute(&self, _output: &str, _scope: &NodeScope<'_, '_>) -> Result<Value> {
        Ok(Value::Int(1))
    }
}

/// Fails on its first compute only
#[derive(Default)]
struct Flaky {
    attempts: AtomicUsize,
}

impl NodeBehavior for Flaky {
    fn type_name(&self) -> &str {
        "Flaky"
    }

    fn declare(&self) -> Vec<PlugSpec> {
        vec![PlugSpec::output("out", PlugType::Int)]
    }

    fn compute(&self, _output: &str, _scope: &NodeScope<'_, '_>) -> Result<Value> {
        match self.attempts.fetch_add(1, Ordering::SeqCst) {
            0 => Err(GraphError::evaluation("first attempt fails")),
            n => Ok(Value::Int(n as i64)),
        }
    }
}

/// Doubles each component of a composite
struct Pair;

impl NodeBehavior for Pair {
    fn type_name(&self) -> &str {
        "Pair"
    }

    fn declare(&self) -> Vec<PlugSpec> {
        let children = || {
            vec![
                PlugSpec::input("x", PlugType::Float),
                PlugSpec::input("y", PlugType::Float),
            ]
        };
        vec![
            PlugSpec::composite("in", Direction::In, children()),
            PlugSpec::composite("out", Direction::Out, children()),
        ]
    }

    fn affects(&self, input: &str) -> Vec<String> {
        match input {
            "in.x" => vec!["out.x".to_string()],
            "in.y" => vec!["out.y".to_string()],
            _ => Vec::new(),
        }
    }

    fn compute(&self, output: &str, scope: &NodeScope<'_, '_>) -> Result<Value> {
        let input = output.replace("out.", "in.");
        Ok(Value::Float(scope.get_float(&input)? * 2.0))
    }
}

fn isolated() -> Graph {
    Graph::isolated(EngineConfig::default())
}

fn add_node(graph: &Graph, name: &str, computes: &Arc<AtomicUsize>) -> NodeId {
    graph
        .add_node(
            name,
            Arc::new(Add {
                computes: computes.clone(),
                delay: None,
            }),
        )
        .unwrap()
}

fn plug(graph: &Graph, node: NodeId, name: &str) -> PlugId {
    graph.plug(node, name).unwrap()
}

fn dirty_count(graph: &Graph, plug: PlugId) -> u64 {
    graph.read().plug(plug).unwrap().dirty_count
}

#[test]
fn test_connect_and_compute() {
    let graph = isolated();
    let computes = Arc::new(AtomicUsize::new(0));
    let n1 = add_node(&graph, "add", &computes);
    let n2 = add_node(&graph, "add", &computes);
    assert_eq!(graph.read().node(n2).unwrap().name, "add1");

    graph.set_value(plug(&graph, n1, "a"), 1.0f32).unwrap();
    graph.set_value(plug(&graph, n1, "b"), 2.0f32).unwrap();
    graph.connect(plug(&graph, n2, "a"), plug(&graph, n1, "sum")).unwrap();
    graph.set_value(plug(&graph, n2, "b"), 3.0f32).unwrap();

    let ctx = Context::new();
    assert_eq!(graph.compute(plug(&graph, n2, "sum"), &ctx).unwrap(), Value::Float(6.0));
    let (input, source) = (plug(&graph, n2, "a"), plug(&graph, n1, "sum"));
    assert_eq!(graph.read().source(input), Some(source));
}

#[test]
fn test_int_input_coerced_to_float() {
    let graph = isolated();
    let computes = Arc::new(AtomicUsize::new(0));
    let node = add_node(&graph, "add", &computes);
    graph.set_value(plug(&graph, node, "a"), 2i64).unwrap();
    assert_eq!(
        graph.compute(plug(&graph, node, "a"), &Context::new()).unwrap(),
        Value::Float(2.0)
    );
}

#[test]
fn test_connect_errors() {
    let graph = isolated();
    let computes = Arc::new(AtomicUsize::new(0));
    let n1 = add_node(&graph, "n1", &computes);
    let n2 = add_node(&graph, "n2", &computes);
    let label = graph.add_node("label", Arc::new(Label)).unwrap();

    let err = graph
        .connect(plug(&graph, n2, "sum"), plug(&graph, n1, "sum"))
        .unwrap_err();
    assert!(matches!(err, GraphError::DirectionError(_)));

    let err = graph.connect(plug(&graph, n2, "a"), plug(&graph, n1, "b")).unwrap_err();
    assert!(matches!(err, GraphError::DirectionError(_)));

    let err = graph
        .connect(plug(&graph, n2, "a"), plug(&graph, label, "out"))
        .unwrap_err();
    assert!(matches!(err, GraphError::TypeMismatch { .. }));

    let err = graph.connect(plug(&graph, n1, "a"), plug(&graph, n1, "sum")).unwrap_err();
    assert_eq!(err, GraphError::CycleDetected);

    graph.connect(plug(&graph, n2, "a"), plug(&graph, n1, "sum")).unwrap();
    let err = graph.connect(plug(&graph, n1, "b"), plug(&graph, n2, "sum")).unwrap_err();
    assert_eq!(err, GraphError::CycleDetected);
}

#[test]
fn test_set_value_errors() {
    let graph = isolated();
    let computes = Arc::new(AtomicUsize::new(0));
    let n1 = add_node(&graph, "n1", &computes);
    let n2 = add_node(&graph, "n2", &computes);
    graph.connect(plug(&graph, n2, "a"), plug(&graph, n1, "sum")).unwrap();

    let err = graph.set_value(plug(&graph, n2, "a"), 1.0f32).unwrap_err();
    assert!(matches!(err, GraphError::PlugConnected(_)));

    let err = graph.set_value(plug(&graph, n1, "sum"), 1.0f32).unwrap_err();
    assert!(matches!(err, GraphError::DirectionError(_)));

    let err = graph.set_value(plug(&graph, n1, "a"), "text").unwrap_err();
    assert!(matches!(err, GraphError::TypeMismatch { .. }));
}

#[test]
fn test_dirty_propagation() {
    let graph = isolated();
    let computes = Arc::new(AtomicUsize::new(0));
    let n1 = add_node(&graph, "n1", &computes);
    let n2 = add_node(&graph, "n2", &computes);
    graph.connect(plug(&graph, n2, "a"), plug(&graph, n1, "sum")).unwrap();

    let downstream = plug(&graph, n2, "sum");
    let before = dirty_count(&graph, downstream);
    graph.set_value(plug(&graph, n1, "a"), 5.0f32).unwrap();
    assert!(dirty_count(&graph, downstream) > before);

    let before = dirty_count(&graph, downstream);
    graph.set_value(plug(&graph, n1, "unused"), 7i64).unwrap();
    assert_eq!(dirty_count(&graph, downstream), before);

    // Setting an unchanged value dirties nothing
    let before = dirty_count(&graph, downstream);
    graph.set_value(plug(&graph, n1, "a"), 5.0f32).unwrap();
    assert_eq!(dirty_count(&graph, downstream), before);
}

#[test]
fn test_hash_follows_inputs() {
    let graph = isolated();
    let computes = Arc::new(AtomicUsize::new(0));
    let node = add_node(&graph, "add", &computes);
    let sum = plug(&graph, node, "sum");
    let ctx = Context::new();

    let first = graph.hash(sum, &ctx).unwrap();
    assert_eq!(graph.hash(sum, &ctx).unwrap(), first);
    graph.set_value(plug(&graph, node, "a"), 1.0f32).unwrap();
    let second = graph.hash(sum, &ctx).unwrap();
    assert_ne!(second, first);

    // Hashes do not depend on undeclared context variables
    assert_eq!(graph.hash(sum, &ctx.set("unrelated", 3i64)).unwrap(), second);
}

#[test]
fn test_compute_once_per_fingerprint() {
    let graph = isolated();
    let computes = Arc::new(AtomicUsize::new(0));
    let n1 = add_node(&graph, "n1", &computes);
    let n2 = add_node(&graph, "n2", &computes);
    for node in [n1, n2] {
        graph.set_value(plug(&graph, node, "a"), 1.5f32).unwrap();
    }

    let ctx = Context::new();
    let v1 = graph.compute(plug(&graph, n1, "sum"), &ctx).unwrap();
    let v2 = graph.compute(plug(&graph, n2, "sum"), &ctx).unwrap();
    let v3 = graph.compute(plug(&graph, n1, "sum"), &ctx).unwrap();
    assert_eq!(v1, v2);
    assert_eq!(v1, v3);
    assert_eq!(computes.load(Ordering::SeqCst), 1);
    assert!(graph.cache().stats().hits >= 2);
}

#[test]
fn test_concurrent_compute_once() {
    let graph = isolated();
    let computes = Arc::new(AtomicUsize::new(0));
    let node = graph
        .add_node(
            "slow",
            Arc::new(Add {
                computes: computes.clone(),
                delay: Some(Duration::from_millis(20)),
            }),
        )
        .unwrap();
    let sum = plug(&graph, node, "sum");
    let ctx = Context::new();

    std::thread::scope(|s| {
        for _ in 0..8 {
            let graph = graph.clone();
            let ctx = ctx.clone();
            s.spawn(move || {
                assert_eq!(graph.compute(sum, &ctx).unwrap(), Value::Float(0.0));
            });
        }
    });
    assert_eq!(computes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_type_error_for_wrong_value() {
    let graph = isolated();
    let node = graph.add_node("liar", Arc::new(Liar)).unwrap();
    let err = graph.compute(plug(&graph, node, "out"), &Context::new()).unwrap_err();
    assert!(matches!(err, GraphError::TypeError { .. }));
}

#[test]
fn test_failures_are_not_cached() {
    let graph = isolated();
    let node = graph.add_node("flaky", Arc::new(Flaky::default())).unwrap();
    let out = plug(&graph, node, "out");
    let ctx = Context::new();

    assert!(matches!(graph.compute(out, &ctx), Err(GraphError::Evaluation(_))));
    assert_eq!(graph.compute(out, &ctx).unwrap(), Value::Int(1));
    assert_eq!(graph.compute(out, &ctx).unwrap(), Value::Int(1));
    assert_eq!(graph.cache().stats().failures, 1);
}

#[test]
fn test_composite_connection_links_children() {
    let graph = isolated();
    let p1 = graph.add_node("p1", Arc::new(Pair)).unwrap();
    let p2 = graph.add_node("p2", Arc::new(Pair)).unwrap();
    graph.connect(plug(&graph, p2, "in"), plug(&graph, p1, "out")).unwrap();
    let (input, source) = (plug(&graph, p2, "in.x"), plug(&graph, p1, "out.x"));
    assert_eq!(graph.read().source(input), Some(source));

    graph.set_value(plug(&graph, p1, "in.x"), 3.0f32).unwrap();
    let ctx = Context::new();
    assert_eq!(graph.compute(plug(&graph, p2, "out.x"), &ctx).unwrap(), Value::Float(12.0));
    assert_eq!(graph.compute(plug(&graph, p2, "out.y"), &ctx).unwrap(), Value::Float(0.0));

    // Composite plugs carry no value of their own
    assert!(graph.compute(plug(&graph, p2, "out"), &ctx).is_err());

    // Connecting a child alone detaches it from its parent's source
    let p3 = graph.add_node("p3", Arc::new(Pair)).unwrap();
    graph.connect(plug(&graph, p2, "in.y"), plug(&graph, p3, "out.y")).unwrap();
    let (p2_in, p2_x, p1_x) = (plug(&graph, p2, "in"), plug(&graph, p2, "in.x"), plug(&graph, p1, "out.x"));
    let state = graph.read();
    assert_eq!(state.source(p2_in), None);
    assert_eq!(state.source(p2_x), Some(p1_x));
}

#[test]
fn test_cancelled_evaluation() {
    let graph = isolated();
    let computes = Arc::new(AtomicUsize::new(0));
    let node = add_node(&graph, "add", &computes);
    let canceller = loom_graph::Canceller::new();
    canceller.cancel();
    let err = graph
        .evaluate_cancellable(&Context::new(), &canceller, |e| e.value(plug(&graph, node, "sum")))
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(computes.load(Ordering::SeqCst), 0);
}

#[test]
fn test_plug_handle_outliving_graph() {
    let graph = isolated();
    let computes = Arc::new(AtomicUsize::new(0));
    let node = add_node(&graph, "add", &computes);
    let handle = graph.plug_handle(plug(&graph, node, "sum"));
    assert_eq!(handle.value(&Context::new()).unwrap(), Value::Float(0.0));

    drop(graph);
    assert_eq!(handle.value(&Context::new()).unwrap_err(), GraphError::Cancelled);
}

#[test]
fn test_create_registered_node_type() {
    loom_graph::register_node_type("test:Label", || Arc::new(Label) as Arc<dyn NodeBehavior>);
    assert!(loom_graph::registered_node_types().contains(&"test:Label".to_string()));

    let graph = isolated();
    let node = graph.create_node("test:Label", "label").unwrap();
    assert_eq!(graph.read().node(node).unwrap().type_name(), "Label");

    let err = graph.create_node("test:Missing", "missing").unwrap_err();
    assert!(matches!(err, GraphError::UnknownNodeType(_)));
}

proptest! {
    #[test]
    fn prop_unrelated_input_keeps_hash(a in -1000.0f32..1000.0, b in -1000.0f32..1000.0, unused in any::<i64>()) {
        let graph = isolated();
        let computes = Arc::new(AtomicUsize::new(0));
        let node = add_node(&graph, "add", &computes);
        graph.set_value(plug(&graph, node, "a"), a).unwrap();
        graph.set_value(plug(&graph, node, "b"), b).unwrap();
        let sum = plug(&graph, node, "sum");
        let ctx = Context::new();

        let before = graph.hash(sum, &ctx).unwrap();
        graph.set_value(plug(&graph, node, "unused"), unused).unwrap();
        prop_assert_eq!(graph.hash(sum, &ctx).unwrap(), before);
        prop_assert_eq!(graph.compute(sum, &ctx).unwrap(), Value::Float(a + b));
    }
}
