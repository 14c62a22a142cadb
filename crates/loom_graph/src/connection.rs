// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) definitions for the graph.

use crate::node::NodeId;
use crate::plug::PlugId;
use serde::{Deserialize, Serialize};

/// A connection driving an input plug from an output plug
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Source node ID
    pub source_node: NodeId,
    /// Source output plug
    pub source: PlugId,
    /// Destination node ID
    pub destination_node: NodeId,
    /// Destination input plug
    pub destination: PlugId,
}

impl Connection {
    /// Create a new connection
    pub fn new(source_node: NodeId, source: PlugId, destination_node: NodeId, destination: PlugId) -> Self {
        Self {
            source_node,
            source,
            destination_node,
            destination,
        }
    }

    /// Check if this connection involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.source_node == node_id || self.destination_node == node_id
    }

    /// Check if this connection involves a specific plug
    pub fn involves_plug(&self, plug_id: PlugId) -> bool {
        self.source == plug_id || self.destination == plug_id
    }
}
