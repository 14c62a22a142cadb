// SPDX-License-Identifier: MIT OR Apache-2.0
//! Plug types and the values that flow through plugs.

use crate::math::{Box3f, M44f, V2f, V3f};
use crate::path::ScenePath;
use crate::path_matcher::PathMatcher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Data type carried by a plug
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlugType {
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// String value
    String,
    /// 2D vector
    V2f,
    /// 3D vector
    V3f,
    /// Bounding box
    Box3f,
    /// 4x4 matrix
    M44f,
    /// Ordered list of names
    Names,
    /// Scene path
    Path,
    /// Name to value dictionary
    Compound,
    /// Opaque scene payload
    Object,
    /// Set of path patterns
    PathSet,
    /// Aggregate of child plugs, carries no value of its own
    Composite,
}

impl PlugType {
    /// Check if a source of this type can drive an input of `other`
    pub fn can_connect_to(&self, other: &PlugType) -> bool {
        if self == other {
            return *self != Self::Composite;
        }

        // Implicit conversions
        matches!(
            (self, other),
            (Self::Int, Self::Float) | (Self::Float, Self::Int) | (Self::Bool, Self::Int) | (Self::Int, Self::Bool)
        )
    }

    /// Default value for a plug of this type
    pub fn default_value(&self) -> Option<Value> {
        Some(match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::String => Value::String(String::new()),
            Self::V2f => Value::V2f(V2f::default()),
            Self::V3f => Value::V3f(V3f::default()),
            Self::Box3f => Value::Box3f(Box3f::EMPTY),
            Self::M44f => Value::M44f(M44f::IDENTITY),
            Self::Names => Value::Names(Arc::default()),
            Self::Path => Value::Path(ScenePath::root()),
            Self::Compound => Value::Compound(Arc::default()),
            Self::Object => Value::Object(Arc::new(ObjectValue::null())),
            Self::PathSet => Value::PathSet(Arc::default()),
            Self::Composite => return None,
        })
    }
}

impl fmt::Display for PlugType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Dictionary value used for attributes and globals
pub type CompoundValue = BTreeMap<String, Value>;

/// Opaque payload at a scene location
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObjectValue {
    /// Primitive kind such as `mesh` or `light`; empty for the null object
    pub kind: String,
    /// Object-space bound
    pub bound: Box3f,
    /// Free-form parameters
    pub parameters: CompoundValue,
}

impl ObjectValue {
    /// The null object, present at locations without a payload
    pub fn null() -> Self {
        Self {
            kind: String::new(),
            bound: Box3f::EMPTY,
            parameters: CompoundValue::new(),
        }
    }

    /// Create an object of the given kind
    pub fn new(kind: impl Into<String>, bound: Box3f) -> Self {
        Self {
            kind: kind.into(),
            bound,
            parameters: CompoundValue::new(),
        }
    }

    /// True for the null object
    pub fn is_null(&self) -> bool {
        self.kind.is_empty()
    }
}

/// A value held by or computed for a plug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f32),
    /// String value
    String(String),
    /// 2D vector
    V2f(V2f),
    /// 3D vector
    V3f(V3f),
    /// Bounding box
    Box3f(Box3f),
    /// 4x4 matrix
    M44f(M44f),
    /// Ordered list of names
    Names(Arc<Vec<String>>),
    /// Scene path
    Path(ScenePath),
    /// Name to value dictionary
    Compound(Arc<CompoundValue>),
    /// Opaque scene payload
    Object(Arc<ObjectValue>),
    /// Set of path patterns
    PathSet(Arc<PathMatcher>),
}

impl Value {
    /// Type of this value
    pub fn plug_type(&self) -> PlugType {
        match self {
            Self::Bool(_) => PlugType::Bool,
            Self::Int(_) => PlugType::Int,
            Self::Float(_) => PlugType::Float,
            Self::String(_) => PlugType::String,
            Self::V2f(_) => PlugType::V2f,
            Self::V3f(_) => PlugType::V3f,
            Self::Box3f(_) => PlugType::Box3f,
            Self::M44f(_) => PlugType::M44f,
            Self::Names(_) => PlugType::Names,
            Self::Path(_) => PlugType::Path,
            Self::Compound(_) => PlugType::Compound,
            Self::Object(_) => PlugType::Object,
            Self::PathSet(_) => PlugType::PathSet,
        }
    }

    /// Convert to `target`, applying the implicit numeric conversions
    pub fn coerce(self, target: PlugType) -> Option<Value> {
        if self.plug_type() == target {
            return Some(self);
        }
        match (self, target) {
            (Self::Int(v), PlugType::Float) => Some(Self::Float(v as f32)),
            (Self::Float(v), PlugType::Int) => Some(Self::Int(v as i64)),
            (Self::Bool(v), PlugType::Int) => Some(Self::Int(i64::from(v))),
            (Self::Int(v), PlugType::Bool) => Some(Self::Bool(v != 0)),
            _ => None,
        }
    }

    /// Build a names value
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Names(Arc::new(names.into_iter().map(Into::into).collect()))
    }

    /// Boolean payload
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer payload
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float payload
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// V2f payload
    pub fn as_v2f(&self) -> Option<V2f> {
        match self {
            Self::V2f(v) => Some(*v),
            _ => None,
        }
    }

    /// V3f payload
    pub fn as_v3f(&self) -> Option<V3f> {
        match self {
            Self::V3f(v) => Some(*v),
            _ => None,
        }
    }

    /// Box payload
    pub fn as_box3f(&self) -> Option<Box3f> {
        match self {
            Self::Box3f(v) => Some(*v),
            _ => None,
        }
    }

    /// Matrix payload
    pub fn as_m44f(&self) -> Option<M44f> {
        match self {
            Self::M44f(v) => Some(*v),
            _ => None,
        }
    }

    /// Names payload
    pub fn as_names(&self) -> Option<&Arc<Vec<String>>> {
        match self {
            Self::Names(v) => Some(v),
            _ => None,
        }
    }

    /// Path payload
    pub fn as_path(&self) -> Option<&ScenePath> {
        match self {
            Self::Path(v) => Some(v),
            _ => None,
        }
    }

    /// Compound payload
    pub fn as_compound(&self) -> Option<&Arc<CompoundValue>> {
        match self {
            Self::Compound(v) => Some(v),
            _ => None,
        }
    }

    /// Object payload
    pub fn as_object(&self) -> Option<&Arc<ObjectValue>> {
        match self {
            Self::Object(v) => Some(v),
            _ => None,
        }
    }

    /// Path set payload
    pub fn as_path_set(&self) -> Option<&Arc<PathMatcher>> {
        match self {
            Self::PathSet(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<V2f> for Value {
    fn from(v: V2f) -> Self {
        Self::V2f(v)
    }
}

impl From<V3f> for Value {
    fn from(v: V3f) -> Self {
        Self::V3f(v)
    }
}

impl From<Box3f> for Value {
    fn from(v: Box3f) -> Self {
        Self::Box3f(v)
    }
}

impl From<M44f> for Value {
    fn from(v: M44f) -> Self {
        Self::M44f(v)
    }
}

impl From<ScenePath> for Value {
    fn from(v: ScenePath) -> Self {
        Self::Path(v)
    }
}

impl From<CompoundValue> for Value {
    fn from(v: CompoundValue) -> Self {
        Self::Compound(Arc::new(v))
    }
}

impl From<ObjectValue> for Value {
    fn from(v: ObjectValue) -> Self {
        Self::Object(Arc::new(v))
    }
}

impl From<PathMatcher> for Value {
    fn from(v: PathMatcher) -> Self {
        Self::PathSet(Arc::new(v))
    }
}
