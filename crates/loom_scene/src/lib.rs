// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hierarchical scene composition on top of the Loom graph.
//!
//! A scene is a composite plug whose facets are computed one location at a
//! time, so only the parts of a hierarchy that are asked for are ever built.
//!
//! ## Architecture
//!
//! - Scene plug facets keyed by `scene:path` and `scene:setName`
//! - [`SceneNode`] framework and the built-in composition nodes
//! - [`SceneView`] for reading scenes from outside the graph
//! - Parallel procedural traversal into a [`Renderer`]

pub mod nodes;
pub mod query;
pub mod renderer;
pub mod scene_node;
pub mod scene_plug;
pub mod traversal;

pub use nodes::{
    add_group_input, register_node_types, ConstraintKind, ConstraintNode, Group, ObjectSource, Options, PathFilter,
    Prune, OPTION_PREFIX, SetMode, SetNode, SubTree, TargetMode,
};
pub use query::{SceneQuery, SceneView};
pub use renderer::{
    create_renderer, register_renderer, registered_renderers, CaptureRenderer, Location, LogRenderer, RenderCall,
    Renderer, Sample,
};
pub use scene_node::{scene_node, SceneNode, SceneNodeBehavior, SceneScope};
pub use scene_plug::{scene_plug, Facet};
pub use traversal::{
    add_drained_listener, pending_units, remove_drained_listener, render, spawn_render, ListenerId, MotionOptions,
    RenderHandle, TraversalReport, TraversalSettings,
};
