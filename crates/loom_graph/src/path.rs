// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hierarchical scene paths.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An absolute location in a scene hierarchy. The root is the empty path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ScenePath(Vec<String>);

impl ScenePath {
    /// The root location
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build from names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Parse `/a/b/c`. Empty components are ignored, so `/` and `` both
    /// name the root.
    pub fn parse(text: &str) -> Self {
        Self(
            text.split('/')
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Names from root to leaf
    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Number of names
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the root
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Same as [`ScenePath::is_root`]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last name, `None` for the root
    pub fn name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Parent location, `None` for the root
    pub fn parent(&self) -> Option<ScenePath> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Child location
    pub fn child(&self, name: impl Into<String>) -> ScenePath {
        let mut names = self.0.clone();
        names.push(name.into());
        Self(names)
    }

    /// Concatenate two paths
    pub fn join(&self, other: &ScenePath) -> ScenePath {
        let mut names = self.0.clone();
        names.extend(other.0.iter().cloned());
        Self(names)
    }

    /// Remove the last name in place
    pub fn pop(&mut self) -> Option<String> {
        self.0.pop()
    }

    /// Append a name in place
    pub fn push(&mut self, name: impl Into<String>) {
        self.0.push(name.into());
    }

    /// True if `prefix` is this path or one of its ancestors
    pub fn starts_with(&self, prefix: &ScenePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Strip the first `count` names
    pub fn strip_prefix_len(&self, count: usize) -> ScenePath {
        Self(self.0.iter().skip(count).cloned().collect())
    }

    /// Path made of the first `count` names
    pub fn truncated(&self, count: usize) -> ScenePath {
        Self(self.0.iter().take(count).cloned().collect())
    }

    /// All ancestors from the root down to the parent
    pub fn ancestors(&self) -> impl Iterator<Item = ScenePath> + '_ {
        (0..self.0.len()).map(move |n| self.truncated(n))
    }
}

impl fmt::Display for ScenePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for name in &self.0 {
            write!(f, "/{name}")?;
        }
        Ok(())
    }
}

impl From<&str> for ScenePath {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let p = ScenePath::parse("/a/b/c");
        assert_eq!(p.len(), 3);
        assert_eq!(p.to_string(), "/a/b/c");
        assert_eq!(ScenePath::parse("/").to_string(), "/");
        assert!(ScenePath::parse("/").is_root());
    }

    #[test]
    fn test_parent_child() {
        let p = ScenePath::parse("/a/b");
        assert_eq!(p.parent(), Some(ScenePath::parse("/a")));
        assert_eq!(p.child("c"), ScenePath::parse("/a/b/c"));
        assert_eq!(p.name(), Some("b"));
        assert_eq!(ScenePath::root().parent(), None);
    }

    #[test]
    fn test_prefix() {
        let p = ScenePath::parse("/a/b/c");
        assert!(p.starts_with(&ScenePath::parse("/a")));
        assert!(p.starts_with(&ScenePath::root()));
        assert!(!p.starts_with(&ScenePath::parse("/b")));
        assert_eq!(p.strip_prefix_len(1), ScenePath::parse("/b/c"));
        assert_eq!(p.ancestors().count(), 3);
    }
}
