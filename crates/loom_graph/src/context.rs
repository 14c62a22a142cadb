// SPDX-License-Identifier: MIT OR Apache-2.0
//! Immutable evaluation contexts.
//!
//! A [`Context`] maps variable names to values. It is shared by reference
//! count and never mutated; [`Context::set`] returns a new context, so
//! overlays such as "current scene path" compose without touching the
//! parent.

use crate::fingerprint::{Fingerprint, FingerprintHasher};
use crate::path::ScenePath;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Current scene location
pub const SCENE_PATH: &str = "scene:path";
/// Name of the set being evaluated
pub const SET_NAME: &str = "scene:setName";
/// Current frame
pub const FRAME: &str = "frame";

#[derive(Default)]
struct ContextData {
    variables: BTreeMap<String, Value>,
    fingerprint: OnceLock<Fingerprint>,
}

/// Named variables that parameterize an evaluation
#[derive(Clone, Default)]
pub struct Context {
    data: Arc<ContextData>,
}

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    fn from_variables(variables: BTreeMap<String, Value>) -> Self {
        Self {
            data: Arc::new(ContextData {
                variables,
                fingerprint: OnceLock::new(),
            }),
        }
    }

    /// New context with one variable overridden
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) -> Context {
        let mut variables = self.data.variables.clone();
        variables.insert(name.into(), value.into());
        Self::from_variables(variables)
    }

    /// New context without `name`. Returns a cheap clone if it is absent.
    pub fn remove(&self, name: &str) -> Context {
        if !self.data.variables.contains_key(name) {
            return self.clone();
        }
        let mut variables = self.data.variables.clone();
        variables.remove(name);
        Self::from_variables(variables)
    }

    /// Look up a variable
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.variables.get(name)
    }

    /// True if the variable is set
    pub fn contains(&self, name: &str) -> bool {
        self.data.variables.contains_key(name)
    }

    /// Variable names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.data.variables.keys().map(String::as_str)
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.data.variables.len()
    }

    /// True if no variable is set
    pub fn is_empty(&self) -> bool {
        self.data.variables.is_empty()
    }

    /// Current frame, 1.0 when unset
    pub fn frame(&self) -> f32 {
        match self.get(FRAME) {
            Some(Value::Float(f)) => *f,
            Some(Value::Int(i)) => *i as f32,
            _ => 1.0,
        }
    }

    /// New context at another frame
    pub fn with_frame(&self, frame: f32) -> Context {
        self.set(FRAME, frame)
    }

    /// Current scene location, if any
    pub fn scene_path(&self) -> Option<&ScenePath> {
        self.get(SCENE_PATH).and_then(Value::as_path)
    }

    /// New context at another scene location
    pub fn with_scene_path(&self, path: ScenePath) -> Context {
        self.set(SCENE_PATH, path)
    }

    /// Current set name, if any
    pub fn set_name(&self) -> Option<&str> {
        self.get(SET_NAME).and_then(Value::as_str)
    }

    /// Digest of every variable, computed once
    pub fn fingerprint(&self) -> Fingerprint {
        *self.data.fingerprint.get_or_init(|| {
            let mut hasher = FingerprintHasher::new();
            hasher.append(&self.data.variables);
            hasher.finish()
        })
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data) || self.data.variables == other.data.variables
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.data.variables.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_leaves_parent_untouched() {
        let parent = Context::new().set("a", 1i64);
        let child = parent.set("a", 2i64).set("b", "x");
        assert_eq!(parent.get("a"), Some(&Value::Int(1)));
        assert!(!parent.contains("b"));
        assert_eq!(child.get("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_structural_equality() {
        let a = Context::new().set("x", 1i64).set("y", 2i64);
        let b = Context::new().set("y", 2i64).set("x", 1i64);
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), a.set("x", 3i64).fingerprint());
    }

    #[test]
    fn test_scene_path() {
        let ctx = Context::new().with_scene_path(ScenePath::parse("/a/b"));
        assert_eq!(ctx.scene_path(), Some(&ScenePath::parse("/a/b")));
        assert!(ctx.remove(SCENE_PATH).scene_path().is_none());
        assert_eq!(Context::new().frame(), 1.0);
        assert_eq!(ctx.with_frame(3.0).frame(), 3.0);
    }

    #[test]
    fn test_shared_across_threads() {
        let ctx = Context::new().set("x", 1i64);
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let ctx = ctx.clone();
                std::thread::spawn(move || ctx.set("i", i as i64).fingerprint())
            })
            .collect();
        let prints: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ctx.get("x"), Some(&Value::Int(1)));
        assert_ne!(prints[0], prints[1]);
    }
}
