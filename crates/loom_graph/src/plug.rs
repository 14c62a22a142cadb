// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plug definitions: typed value slots owned by nodes.

use crate::node::NodeId;
use crate::value::{PlugType, Value};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a plug
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlugId(pub Uuid);

impl PlugId {
    /// Create a new random plug ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlugId {
    fn default() -> Self {
        Self::new()
    }
}

/// Plug direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Input, holds a literal or is driven by a connection
    In,
    /// Output, computed by the owning node
    Out,
}

/// Declaration of a plug, used by node types to describe their interface
#[derive(Debug, Clone, PartialEq)]
pub struct PlugSpec {
    /// Plug name, unique among its siblings
    pub name: String,
    /// Direction
    pub direction: Direction,
    /// Data type
    pub plug_type: PlugType,
    /// Default value for inputs
    pub default: Option<Value>,
    /// Child plugs of a composite
    pub children: Vec<PlugSpec>,
}

impl PlugSpec {
    /// Create an input plug declaration
    pub fn input(name: impl Into<String>, plug_type: PlugType) -> Self {
        Self {
            name: name.into(),
            direction: Direction::In,
            plug_type,
            default: plug_type.default_value(),
            children: Vec::new(),
        }
    }

    /// Create an output plug declaration
    pub fn output(name: impl Into<String>, plug_type: PlugType) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Out,
            plug_type,
            default: None,
            children: Vec::new(),
        }
    }

    /// Create a composite plug declaration. Children inherit the direction.
    pub fn composite(name: impl Into<String>, direction: Direction, children: Vec<PlugSpec>) -> Self {
        let children = children
            .into_iter()
            .map(|mut child| {
                child.set_direction(direction);
                child
            })
            .collect();
        Self {
            name: name.into(),
            direction,
            plug_type: PlugType::Composite,
            default: None,
            children,
        }
    }

    /// Set the default value
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
        if direction == Direction::Out {
            self.default = None;
        } else if self.default.is_none() {
            self.default = self.plug_type.default_value();
        }
        for child in &mut self.children {
            child.set_direction(direction);
        }
    }
}

/// A plug instance in a graph
#[derive(Debug, Clone)]
pub struct Plug {
    /// Unique plug ID
    pub id: PlugId,
    /// Owning node
    pub node: NodeId,
    /// Full name relative to the node, children as `parent.child`
    pub name: String,
    /// Direction
    pub direction: Direction,
    /// Data type
    pub plug_type: PlugType,
    /// Default value
    pub default: Option<Value>,
    /// Literal value of an input
    pub value: Option<Value>,
    /// Parent composite
    pub parent: Option<PlugId>,
    /// Children of a composite, in declaration order
    pub children: Vec<PlugId>,
    /// Incremented each time the plug is dirtied
    pub dirty_count: u64,
}

impl Plug {
    /// Name without the parent prefix
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// True for composites
    pub fn is_composite(&self) -> bool {
        self.plug_type == PlugType::Composite
    }

    /// Literal value of an input, falling back to its default
    pub fn literal(&self) -> Option<&Value> {
        self.value.as_ref().or(self.default.as_ref())
    }
}
