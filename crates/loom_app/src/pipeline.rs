// SPDX-License-Identifier: MIT OR Apache-2.0
//! Demo pipeline built from registered node types.
//!
//! Two objects are parented under a group, the light is point constrained
//! to the centre of the box, and render options are merged into the
//! globals before the scene reaches the renderer.

use crate::settings::AppError;
use loom_graph::{Box3f, CompoundValue, Graph, NodeId, V2f, V3f, Value};
use loom_scene::{add_group_input, TargetMode};

/// Node ids of the demo pipeline
pub struct Pipeline {
    /// Object source for `/world/box`
    pub shape: NodeId,
    /// Node whose `out` plug is rendered
    pub output: NodeId,
}

fn set(graph: &Graph, node: NodeId, name: &str, value: impl Into<Value>) -> Result<(), AppError> {
    graph.set_value(graph.plug(node, name)?, value)?;
    Ok(())
}

fn connect(graph: &Graph, node: NodeId, input: &str, source: NodeId, output: &str) -> Result<(), AppError> {
    graph.connect(graph.plug(node, input)?, graph.plug(source, output)?)?;
    Ok(())
}

/// Build the demo pipeline as a single undoable edit
pub fn build(graph: &Graph) -> Result<Pipeline, AppError> {
    let _scope = graph.undo_scope("Build demo pipeline");

    let shape = graph.create_node("ObjectSource", "box")?;
    set(graph, shape, "name", "box")?;
    set(graph, shape, "objectBound", Box3f::new(V3f::ZERO, V3f::splat(2.0)))?;
    set(graph, shape, "translate", V3f::new(-1.0, 0.0, 0.0))?;
    set(graph, shape, "sets", "hero")?;

    let light = graph.create_node("ObjectSource", "light")?;
    set(graph, light, "name", "light")?;
    set(graph, light, "type", "light")?;
    set(graph, light, "translate", V3f::new(0.0, 4.0, 0.0))?;
    set(graph, light, "sets", "lights")?;
    let mut attributes = CompoundValue::new();
    attributes.insert("render:transformBlurSegments".to_string(), Value::Int(2));
    set(graph, light, "attributes", attributes)?;

    let group = graph.create_node("Group", "world")?;
    set(graph, group, "name", "world")?;
    connect(graph, group, "in0", shape, "out")?;
    let in1 = add_group_input(graph, group)?;
    graph.connect(in1, graph.plug(light, "out")?)?;

    let filter = graph.create_node("PathFilter", "lightFilter")?;
    set(graph, filter, "paths", Value::names(["/world/light"]))?;

    let constraint = graph.create_node("PointConstraint", "aim")?;
    connect(graph, constraint, "in", group, "out")?;
    connect(graph, constraint, "filter", filter, "match")?;
    set(graph, constraint, "target", "/world/box")?;
    set(graph, constraint, "targetMode", Value::Int(TargetMode::BoundCenter.index()))?;
    set(graph, constraint, "targetOffset", V3f::new(0.0, 3.0, 0.0))?;

    let options = graph.create_node("Options", "options")?;
    connect(graph, options, "in", constraint, "out")?;
    let mut entries = CompoundValue::new();
    entries.insert("render:transformBlur".to_string(), Value::Bool(true));
    entries.insert("render:shutter".to_string(), Value::V2f(V2f::new(-0.25, 0.25)));
    entries.insert("render:camera".to_string(), Value::from("/world/box"));
    set(graph, options, "options", entries)?;

    tracing::debug!("Built demo pipeline");
    Ok(Pipeline {
        shape,
        output: options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_graph::{EngineConfig, ScenePath};
    use loom_scene::{register_node_types, SceneView};

    fn pipeline() -> (Graph, Pipeline) {
        register_node_types();
        let graph = Graph::isolated(EngineConfig::default());
        let pipeline = build(&graph).unwrap();
        (graph, pipeline)
    }

    #[test]
    fn test_light_follows_box_centre() {
        let (graph, pipeline) = pipeline();
        let view = SceneView::new(&graph, pipeline.output);
        let transform = view.full_transform(&ScenePath::parse("/world/light")).unwrap();
        assert_eq!(transform.translation(), V3f::new(0.0, 4.0, 1.0));
    }

    #[test]
    fn test_build_is_one_undo_step() {
        let (graph, _) = pipeline();
        assert_eq!(graph.history_stats().undo_count, 1);
        graph.undo().unwrap();
        assert!(graph.node_by_name("world").is_none());
    }

    #[test]
    fn test_edit_reaches_output() {
        let (graph, pipeline) = pipeline();
        let view = SceneView::new(&graph, pipeline.output);
        let path = ScenePath::parse("/world/light");
        let before = view.full_transform(&path).unwrap();

        set(&graph, pipeline.shape, "translate", V3f::new(3.0, 0.0, 0.0)).unwrap();
        let after = view.full_transform(&path).unwrap();
        assert_ne!(before, after);
        assert_eq!(after.translation(), V3f::new(4.0, 4.0, 1.0));
        assert!(graph.node_by_name("light").is_some());
    }
}
