// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for the graph engine.

use thiserror::Error;

/// Errors raised by graph mutation, evaluation and the action log
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GraphError {
    /// Plug types cannot be connected or assigned
    #[error("Type mismatch: cannot use {found} where {expected} is expected")]
    TypeMismatch {
        /// Type required by the destination
        expected: String,
        /// Type offered by the source
        found: String,
    },

    /// A plug was used against its direction
    #[error("Direction error: {0}")]
    DirectionError(String),

    /// The connection would introduce a cycle
    #[error("Connection would create a cycle")]
    CycleDetected,

    /// A node failed while computing a value
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    /// A compute produced a value of the wrong type for its plug
    #[error("Plug '{plug}' produced {found}, expected {expected}")]
    TypeError {
        /// Full name of the plug
        plug: String,
        /// Declared plug type
        expected: String,
        /// Type of the produced value
        found: String,
    },

    /// An action was performed or reverted in the wrong state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The work was cancelled cooperatively
    #[error("Cancelled")]
    Cancelled,

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Plug not found
    #[error("Plug not found: {0}")]
    PlugNotFound(String),

    /// No node type registered under the name
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// The input is driven by a connection and has no editable value
    #[error("Plug '{0}' is driven by a connection")]
    PlugConnected(String),

    /// Nothing on the history stack
    #[error("Nothing to {0}")]
    NoHistory(&'static str),
}

impl GraphError {
    /// Shorthand for an evaluation failure
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }

    /// True for cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors raised while loading or saving settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File system error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RON parse error
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// RON serialization error
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),
}
