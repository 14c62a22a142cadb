// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in scene nodes and their registration.

mod constraint;
mod group;
mod object_source;
mod options;
mod path_filter;
mod prune;
mod set_node;
mod sub_tree;

pub use constraint::{ConstraintKind, ConstraintNode, TargetMode};
pub use group::{add_group_input, Group};
pub use object_source::ObjectSource;
pub use options::{Options, OPTION_PREFIX};
pub use path_filter::PathFilter;
pub use prune::Prune;
pub use set_node::{SetMode, SetNode};
pub use sub_tree::SubTree;

use crate::scene_node::scene_node;
use crate::scene_plug::Facet;
use loom_graph::{register_node_type, GraphError, Result, Value};
use std::sync::{Arc, Once};

/// Value of a facet at a location that does not exist
pub(crate) fn empty_facet(facet: Facet) -> Result<Value> {
    facet
        .plug_type()
        .default_value()
        .ok_or_else(|| GraphError::InvalidState(format!("facet '{facet}' has no default")))
}

/// Split a whitespace separated list of names
pub(crate) fn split_names(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in text.split_whitespace() {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Register every built-in scene node type. Safe to call repeatedly.
pub fn register_node_types() {
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| {
        register_node_type("ObjectSource", || scene_node(ObjectSource));
        register_node_type("Group", || scene_node(Group));
        register_node_type("PathFilter", || Arc::new(PathFilter));
        register_node_type("Prune", || scene_node(Prune));
        register_node_type("Set", || scene_node(SetNode));
        register_node_type("Options", || scene_node(Options));
        register_node_type("SubTree", || scene_node(SubTree));
        register_node_type("PointConstraint", || scene_node(ConstraintNode::new(ConstraintKind::Point)));
        register_node_type("ParentConstraint", || scene_node(ConstraintNode::new(ConstraintKind::Parent)));
        tracing::debug!("Registered scene node types");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_graph::registered_node_types;

    #[test]
    fn test_split_names_dedups() {
        assert_eq!(split_names("  a b\ta  c "), vec!["a", "b", "c"]);
        assert!(split_names("").is_empty());
    }

    #[test]
    fn test_register_node_types_idempotent() {
        register_node_types();
        register_node_types();
        let types = registered_node_types();
        for name in ["ObjectSource", "Group", "PathFilter", "SubTree", "PointConstraint"] {
            assert_eq!(types.iter().filter(|t| t.as_str() == name).count(), 1);
        }
    }

    #[test]
    fn test_empty_facets() {
        assert_eq!(empty_facet(Facet::Bound).unwrap(), Value::Box3f(loom_graph::Box3f::EMPTY));
        assert!(empty_facet(Facet::Object).unwrap().as_object().unwrap().is_null());
    }
}
