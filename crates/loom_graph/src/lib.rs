// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dependency-graph compute engine for Loom.
//!
//! Nodes expose typed input and output plugs. Outputs are computed lazily
//! from inputs and an immutable [`Context`], and every value is keyed by a
//! content [`Fingerprint`] so identical work is done once per process.
//!
//! ## Architecture
//!
//! - Plug topology with dirty propagation through `affects`
//! - Fingerprint-keyed compute cache shared across threads
//! - Undoable actions grouped into scopes, with merging
//! - Background tasks cancelled before conflicting edits

pub mod action;
pub mod cache;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod evaluation;
pub mod fingerprint;
pub mod graph;
pub mod history;
pub mod math;
pub mod node;
pub mod path;
pub mod path_matcher;
pub mod plug;
pub mod task;
pub mod value;

pub use action::{Action, ActionEntry, SimpleAction, Subject};
pub use cache::{CacheStats, ComputeCache};
pub use config::EngineConfig;
pub use connection::Connection;
pub use context::Context;
pub use error::{ConfigError, GraphError, Result};
pub use evaluation::{Evaluation, NodeScope};
pub use fingerprint::{Fingerprint, FingerprintHasher};
pub use graph::{Graph, GraphState, PlugHandle, WeakGraph};
pub use history::{HistoryStats, UndoScope};
pub use math::{Box3f, M44f, V2f, V3f};
pub use node::{register_node_type, registered_node_types, NodeBehavior, NodeId};
pub use path::ScenePath;
pub use path_matcher::{MatchResult, PathMatcher};
pub use plug::{Direction, PlugId, PlugSpec};
pub use task::{BackgroundTask, Canceller, TaskStatus};
pub use value::{CompoundValue, ObjectValue, PlugType, Value};
