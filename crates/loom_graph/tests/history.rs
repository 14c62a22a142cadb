// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undo/redo, action grouping and background task cancellation.

use loom_graph::action::SetValueAction;
use loom_graph::{
    ActionEntry, Context, EngineConfig, Graph, GraphError, NodeBehavior, NodeId, NodeScope, PlugId, PlugSpec,
    PlugType, Result, SimpleAction, Subject, TaskStatus, Value,
};
use std::sync::Arc;
use std::time::Duration;

/// `out = value * 2`
struct Double;

impl NodeBehavior for Double {
    fn type_name(&self) -> &str {
        "Double"
    }

    fn declare(&self) -> Vec<PlugSpec> {
        vec![
            PlugSpec::input("value", PlugType::Float),
            PlugSpec::output("out", PlugType::Float),
        ]
    }

    fn compute(&self, _output: &str, scope: &NodeScope<'_, '_>) -> Result<Value> {
        Ok(Value::Float(scope.get_float("value")? * 2.0))
    }
}

fn graph_with_depth(history_depth: usize) -> Graph {
    Graph::isolated(EngineConfig {
        history_depth,
        ..EngineConfig::default()
    })
}

fn double(graph: &Graph, name: &str) -> NodeId {
    graph.add_node(name, Arc::new(Double)).unwrap()
}

fn plug(graph: &Graph, node: NodeId, name: &str) -> PlugId {
    graph.plug(node, name).unwrap()
}

fn value_of(graph: &Graph, plug: PlugId) -> Value {
    graph.compute(plug, &Context::new()).unwrap()
}

#[test]
fn test_undo_redo_set_value() {
    let graph = graph_with_depth(100);
    let node = double(&graph, "double");
    let input = plug(&graph, node, "value");
    let out = plug(&graph, node, "out");

    graph.set_value(input, 2.0f32).unwrap();
    assert_eq!(value_of(&graph, out), Value::Float(4.0));

    graph.undo().unwrap();
    assert_eq!(value_of(&graph, input), Value::Float(0.0));
    assert_eq!(value_of(&graph, out), Value::Float(0.0));

    graph.redo().unwrap();
    assert_eq!(value_of(&graph, out), Value::Float(4.0));
}

#[test]
fn test_undo_node_creation() {
    let graph = graph_with_depth(100);
    let node = double(&graph, "double");
    graph.undo().unwrap();
    assert!(graph.read().node(node).is_err());

    graph.redo().unwrap();
    assert_eq!(graph.read().node(node).unwrap().name, "double");
}

#[test]
fn test_undo_remove_restores_connections() {
    let graph = graph_with_depth(100);
    let n1 = double(&graph, "n1");
    let n2 = double(&graph, "n2");
    let source = plug(&graph, n1, "out");
    let input = plug(&graph, n2, "value");
    graph.connect(input, source).unwrap();
    graph.set_value(plug(&graph, n1, "value"), 1.0f32).unwrap();

    graph.remove_node(n1).unwrap();
    assert_eq!(graph.read().source(input), None);
    assert!(graph.node_by_name("n1").is_none());

    graph.undo().unwrap();
    assert_eq!(graph.read().source(input), Some(source));
    assert_eq!(value_of(&graph, plug(&graph, n2, "out")), Value::Float(4.0));
}

#[test]
fn test_empty_history() {
    let graph = graph_with_depth(100);
    assert_eq!(graph.undo().unwrap_err(), GraphError::NoHistory("undo"));
    assert_eq!(graph.redo().unwrap_err(), GraphError::NoHistory("redo"));
}

#[test]
fn test_action_state_checks() {
    let graph = graph_with_depth(100);
    let node = double(&graph, "double");
    let input = plug(&graph, node, "value");

    let mut entry = ActionEntry::new(Box::new(SetValueAction::new(node, input, Value::Float(3.0))));
    assert!(matches!(entry.revert(&graph), Err(GraphError::InvalidState(_))));
    entry.perform(&graph).unwrap();
    assert!(entry.is_done());
    assert!(matches!(entry.perform(&graph), Err(GraphError::InvalidState(_))));

    entry.revert(&graph).unwrap();
    assert_eq!(value_of(&graph, input), Value::Float(0.0));
}

#[test]
fn test_undo_scope_groups_actions() {
    let graph = graph_with_depth(100);
    let n1 = double(&graph, "n1");
    let n2 = double(&graph, "n2");
    let (a, b) = (plug(&graph, n1, "value"), plug(&graph, n2, "value"));

    {
        let _scope = graph.undo_scope("Set both");
        graph.set_value(a, 1.0f32).unwrap();
        {
            let _nested = graph.undo_scope("Nested");
            graph.set_value(b, 2.0f32).unwrap();
        }
    }
    assert_eq!(graph.history_stats().undo_count, 3);

    graph.undo().unwrap();
    assert_eq!(value_of(&graph, a), Value::Float(0.0));
    assert_eq!(value_of(&graph, b), Value::Float(0.0));
    assert_eq!(graph.history_stats().undo_count, 2);
}

#[test]
fn test_merging_scopes_collapse() {
    let graph = graph_with_depth(100);
    let node = double(&graph, "double");
    let input = plug(&graph, node, "value");

    for step in 1..=5 {
        let _scope = graph.merging_undo_scope("Drag", "drag");
        graph.set_value(input, step as f32).unwrap();
    }
    assert_eq!(value_of(&graph, input), Value::Float(5.0));
    assert_eq!(graph.history_stats().undo_count, 2);

    graph.undo().unwrap();
    assert_eq!(value_of(&graph, input), Value::Float(0.0));

    graph.redo().unwrap();
    assert_eq!(value_of(&graph, input), Value::Float(5.0));
}

#[test]
fn test_repeated_edits_merge_into_last_action() {
    let graph = graph_with_depth(100);
    let node = double(&graph, "double");
    let input = plug(&graph, node, "value");
    let before = graph.history_stats().undo_count;

    for step in 1..=5 {
        graph.set_value(input, step as f32).unwrap();
    }
    assert_eq!(graph.history_stats().undo_count, before + 1);
    assert_eq!(value_of(&graph, input), Value::Float(5.0));

    graph.undo().unwrap();
    assert_eq!(value_of(&graph, input), Value::Float(0.0));
    graph.redo().unwrap();
    assert_eq!(value_of(&graph, input), Value::Float(5.0));

    // A different plug starts a new step
    let other = double(&graph, "other");
    graph.set_value(plug(&graph, other, "value"), 1.0f32).unwrap();
    graph.set_value(input, 6.0f32).unwrap();
    assert_eq!(graph.history_stats().undo_count, before + 4);
}

#[test]
fn test_merge_after_undo_clears_redo() {
    let graph = graph_with_depth(100);
    let node = double(&graph, "double");
    let input = plug(&graph, node, "value");
    let other = double(&graph, "other");

    graph.set_value(input, 1.0f32).unwrap();
    graph.set_value(plug(&graph, other, "value"), 1.0f32).unwrap();
    graph.undo().unwrap();
    assert!(graph.can_redo());

    graph.set_value(input, 2.0f32).unwrap();
    assert!(!graph.can_redo());
    graph.undo().unwrap();
    assert_eq!(value_of(&graph, input), Value::Float(0.0));
}

#[test]
fn test_new_action_clears_redo() {
    let graph = graph_with_depth(100);
    let node = double(&graph, "double");
    let input = plug(&graph, node, "value");

    graph.set_value(input, 1.0f32).unwrap();
    graph.undo().unwrap();
    assert!(graph.can_redo());

    graph.set_value(input, 2.0f32).unwrap();
    assert!(!graph.can_redo());
}

#[test]
fn test_history_depth_evicts_oldest() {
    let graph = graph_with_depth(2);
    let nodes: Vec<NodeId> = (1..=3).map(|i| double(&graph, &format!("n{i}"))).collect();
    for (step, node) in nodes.iter().enumerate() {
        graph.set_value(plug(&graph, *node, "value"), step as f32 + 1.0).unwrap();
    }
    assert_eq!(graph.history_stats().undo_count, 2);

    graph.undo().unwrap();
    graph.undo().unwrap();
    assert_eq!(value_of(&graph, plug(&graph, nodes[0], "value")), Value::Float(1.0));
    assert_eq!(value_of(&graph, plug(&graph, nodes[1], "value")), Value::Float(0.0));
    assert_eq!(value_of(&graph, plug(&graph, nodes[2], "value")), Value::Float(0.0));
    assert!(!graph.can_undo());
}

#[test]
fn test_zero_depth_disables_undo() {
    let graph = graph_with_depth(0);
    let node = double(&graph, "double");
    graph.set_value(plug(&graph, node, "value"), 1.0f32).unwrap();
    assert!(!graph.can_undo());
    assert_eq!(graph.undo().unwrap_err(), GraphError::NoHistory("undo"));
}

#[test]
fn test_simple_action() {
    let graph = graph_with_depth(100);
    let node = double(&graph, "double");
    let input = plug(&graph, node, "value");

    graph
        .enact(Box::new(SimpleAction::new(
            Subject::Node(node),
            "Set to seven",
            move |state| state.set_value(input, Value::Float(7.0)).map(|_| ()),
            move |state| state.set_value(input, Value::Float(0.0)).map(|_| ()),
        )))
        .unwrap();
    assert_eq!(value_of(&graph, input), Value::Float(7.0));
    graph.undo().unwrap();
    assert_eq!(value_of(&graph, input), Value::Float(0.0));
}

#[test]
fn test_background_task_cancelled_by_upstream_edit() {
    let graph = graph_with_depth(100);
    let n1 = double(&graph, "n1");
    let n2 = double(&graph, "n2");
    let n3 = double(&graph, "n3");
    graph.connect(plug(&graph, n2, "value"), plug(&graph, n1, "out")).unwrap();

    let spawn = |node: NodeId| {
        let out = plug(&graph, node, "out");
        graph.spawn_background(Subject::Node(node), move |graph, canceller| loop {
            graph.evaluate_cancellable(&Context::new(), canceller, |e| e.value(out))?;
            std::thread::sleep(Duration::from_millis(1));
        })
    };
    let downstream = spawn(n2);
    let unrelated = spawn(n3);
    assert_eq!(graph.running_tasks(), 2);

    graph.set_value(plug(&graph, n1, "value"), 1.0f32).unwrap();
    assert_eq!(downstream.status(), TaskStatus::Cancelled);
    assert_eq!(unrelated.status(), TaskStatus::Running);

    assert_eq!(unrelated.cancel_and_wait(), TaskStatus::Cancelled);
    assert_eq!(graph.running_tasks(), 0);
}

#[test]
fn test_background_task_error() {
    let graph = graph_with_depth(100);
    let task = graph.spawn_background(Subject::Graph, |_, _| Err(GraphError::evaluation("boom")));
    assert_eq!(task.wait(), TaskStatus::Errored);
    assert_eq!(task.error(), Some(GraphError::evaluation("boom")));
}
