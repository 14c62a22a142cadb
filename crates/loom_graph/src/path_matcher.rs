// SPDX-License-Identifier: MIT OR Apache-2.0
//! Trie of path patterns used for set membership and filtering.
//!
//! Each name in a pattern is a literal, a glob (`*`, `?`, `[abc]`, `[!abc]`)
//! or the ellipsis `...`, which matches any number of names including none.
//! Subtrees are shared between matchers and copied on write.

use crate::path::ScenePath;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::sync::Arc;

/// Name that matches zero or more path names
pub const ELLIPSIS: &str = "...";

/// How a path relates to the patterns in a matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MatchResult(u8);

impl MatchResult {
    /// Nothing matches
    pub const NO_MATCH: Self = Self(0);
    /// A descendant of the path matches
    pub const DESCENDANT: Self = Self(1);
    /// The path itself matches
    pub const EXACT: Self = Self(2);
    /// An ancestor of the path matches
    pub const ANCESTOR: Self = Self(4);
    /// All of the above
    pub const EVERY: Self = Self(7);

    /// Raw flag bits
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Build from raw bits, ignoring unknown flags
    pub fn from_bits(bits: i64) -> Self {
        Self((bits & 7) as u8)
    }

    /// True if all flags of `other` are set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if no flag is set
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for MatchResult {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MatchResult {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for MatchResult {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameKind {
    Literal,
    Wildcard,
    Ellipsis,
}

fn classify(name: &str) -> NameKind {
    if name == ELLIPSIS {
        NameKind::Ellipsis
    } else if has_wildcards(name) {
        NameKind::Wildcard
    } else {
        NameKind::Literal
    }
}

/// True if `name` contains glob syntax
pub fn has_wildcards(name: &str) -> bool {
    name.contains(['*', '?', '[', '\\'])
}

/// Match `name` against a glob pattern
pub fn glob_match(name: &str, pattern: &str) -> bool {
    let s: Vec<char> = name.chars().collect();
    let p: Vec<char> = pattern.chars().collect();

    let (mut si, mut pi) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while si < s.len() {
        if pi < p.len() {
            if p[pi] == '*' {
                backtrack = Some((pi, si));
                pi += 1;
                continue;
            }
            if let Some(next) = match_token(&p, pi, s[si]) {
                si += 1;
                pi = next;
                continue;
            }
        }
        match backtrack {
            Some((star, from)) => {
                pi = star + 1;
                si = from + 1;
                backtrack = Some((star, from + 1));
            }
            None => return false,
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

/// Match one non-star token at `pi`, returning the index after it
fn match_token(p: &[char], pi: usize, c: char) -> Option<usize> {
    match p[pi] {
        '?' => Some(pi + 1),
        '\\' if pi + 1 < p.len() => (p[pi + 1] == c).then_some(pi + 2),
        '[' => match p[pi + 1..].iter().position(|&x| x == ']') {
            Some(offset) => {
                let end = pi + 1 + offset;
                let mut class = &p[pi + 1..end];
                let negate = class.first() == Some(&'!');
                if negate {
                    class = &class[1..];
                }
                let mut found = false;
                let mut i = 0;
                while i < class.len() {
                    if i + 2 < class.len() && class[i + 1] == '-' {
                        found |= class[i] <= c && c <= class[i + 2];
                        i += 3;
                    } else {
                        found |= class[i] == c;
                        i += 1;
                    }
                }
                (found != negate).then_some(end + 1)
            }
            None => (c == '[').then_some(pi + 1),
        },
        literal => (literal == c).then_some(pi + 1),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Node {
    terminator: bool,
    literals: BTreeMap<String, Arc<Node>>,
    wildcards: BTreeMap<String, Arc<Node>>,
    ellipsis: Option<Arc<Node>>,
}

impl Node {
    fn has_children(&self) -> bool {
        !self.literals.is_empty() || !self.wildcards.is_empty() || self.ellipsis.is_some()
    }

    fn is_empty(&self) -> bool {
        !self.terminator && !self.has_children()
    }

    fn child(&self, name: &str) -> Option<&Arc<Node>> {
        match classify(name) {
            NameKind::Literal => self.literals.get(name),
            NameKind::Wildcard => self.wildcards.get(name),
            NameKind::Ellipsis => self.ellipsis.as_ref(),
        }
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        let slot = match classify(name) {
            NameKind::Literal => self.literals.get_mut(name),
            NameKind::Wildcard => self.wildcards.get_mut(name),
            NameKind::Ellipsis => self.ellipsis.as_mut(),
        }?;
        Some(Arc::make_mut(slot))
    }

    fn child_or_insert(&mut self, name: &str) -> &mut Node {
        let slot = match classify(name) {
            NameKind::Literal => self.literals.entry(name.to_string()).or_default(),
            NameKind::Wildcard => self.wildcards.entry(name.to_string()).or_default(),
            NameKind::Ellipsis => self.ellipsis.get_or_insert_with(Default::default),
        };
        Arc::make_mut(slot)
    }

    fn remove_child(&mut self, name: &str) {
        match classify(name) {
            NameKind::Literal => {
                self.literals.remove(name);
            }
            NameKind::Wildcard => {
                self.wildcards.remove(name);
            }
            NameKind::Ellipsis => self.ellipsis = None,
        }
    }

    fn add(&mut self, names: &[String]) -> bool {
        match names.split_first() {
            None => !std::mem::replace(&mut self.terminator, true),
            Some((first, rest)) => self.child_or_insert(first).add(rest),
        }
    }

    fn remove(&mut self, names: &[String]) -> bool {
        match names.split_first() {
            None => std::mem::replace(&mut self.terminator, false),
            Some((first, rest)) => {
                let Some(child) = self.child_mut(first) else {
                    return false;
                };
                let removed = child.remove(rest);
                if child.is_empty() {
                    self.remove_child(first);
                }
                removed
            }
        }
    }

    fn prune(&mut self, names: &[String]) -> bool {
        match names.split_first() {
            None => {
                let changed = !self.is_empty();
                *self = Node::default();
                changed
            }
            Some((first, rest)) => {
                let Some(child) = self.child_mut(first) else {
                    return false;
                };
                let changed = child.prune(rest);
                if child.is_empty() {
                    self.remove_child(first);
                }
                changed
            }
        }
    }

    fn merge(&mut self, other: &Node) -> bool {
        let mut changed = false;
        if other.terminator && !self.terminator {
            self.terminator = true;
            changed = true;
        }
        changed |= merge_children(&mut self.literals, &other.literals);
        changed |= merge_children(&mut self.wildcards, &other.wildcards);
        match (&mut self.ellipsis, &other.ellipsis) {
            (Some(mine), Some(theirs)) => {
                if !Arc::ptr_eq(mine, theirs) {
                    changed |= Arc::make_mut(mine).merge(theirs);
                }
            }
            (None, Some(theirs)) => {
                self.ellipsis = Some(theirs.clone());
                changed = true;
            }
            _ => {}
        }
        changed
    }

    fn subtract(&mut self, other: &Node) -> bool {
        let mut changed = false;
        if other.terminator && self.terminator {
            self.terminator = false;
            changed = true;
        }
        changed |= subtract_children(&mut self.literals, &other.literals);
        changed |= subtract_children(&mut self.wildcards, &other.wildcards);
        if let (Some(mine), Some(theirs)) = (&mut self.ellipsis, &other.ellipsis) {
            changed |= Arc::make_mut(mine).subtract(theirs);
            if mine.is_empty() {
                self.ellipsis = None;
            }
        }
        changed
    }

    fn match_into(&self, names: &[String], result: &mut MatchResult) {
        if let Some(ellipsis) = &self.ellipsis {
            *result |= MatchResult::DESCENDANT;
            for skip in 0..=names.len() {
                ellipsis.match_into(&names[skip..], result);
                if *result == MatchResult::EVERY {
                    return;
                }
            }
        }

        match names.split_first() {
            None => {
                if self.terminator {
                    *result |= MatchResult::EXACT;
                }
                if self.has_children() {
                    *result |= MatchResult::DESCENDANT;
                }
            }
            Some((first, rest)) => {
                if self.terminator {
                    *result |= MatchResult::ANCESTOR;
                }
                if let Some(child) = self.literals.get(first) {
                    child.match_into(rest, result);
                }
                for (pattern, child) in &self.wildcards {
                    if glob_match(first, pattern) {
                        child.match_into(rest, result);
                    }
                }
            }
        }
    }

    fn collect(&self, prefix: &mut Vec<String>, out: &mut Vec<String>) {
        if self.terminator {
            out.push(ScenePath::from_names(prefix.iter().cloned()).to_string());
        }
        let children = self
            .literals
            .iter()
            .chain(self.wildcards.iter())
            .map(|(name, child)| (name.as_str(), child))
            .chain(self.ellipsis.iter().map(|child| (ELLIPSIS, child)));
        for (name, child) in children {
            prefix.push(name.to_string());
            child.collect(prefix, out);
            prefix.pop();
        }
    }
}

fn merge_children(mine: &mut BTreeMap<String, Arc<Node>>, theirs: &BTreeMap<String, Arc<Node>>) -> bool {
    let mut changed = false;
    for (name, child) in theirs {
        match mine.get_mut(name) {
            Some(existing) => {
                if !Arc::ptr_eq(existing, child) {
                    changed |= Arc::make_mut(existing).merge(child);
                }
            }
            None => {
                mine.insert(name.clone(), child.clone());
                changed = true;
            }
        }
    }
    changed
}

fn subtract_children(mine: &mut BTreeMap<String, Arc<Node>>, theirs: &BTreeMap<String, Arc<Node>>) -> bool {
    let mut changed = false;
    for (name, child) in theirs {
        let emptied = match mine.get_mut(name) {
            Some(existing) => {
                changed |= Arc::make_mut(existing).subtract(child);
                existing.is_empty()
            }
            None => false,
        };
        if emptied {
            mine.remove(name);
        }
    }
    changed
}

/// A set of path patterns with sub-linear membership queries
#[derive(Clone, Default, PartialEq)]
pub struct PathMatcher {
    root: Arc<Node>,
}

impl PathMatcher {
    /// Create an empty matcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from textual patterns such as `/a/.../b*`
    pub fn from_strs<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matcher = Self::new();
        for path in paths {
            matcher.add_str(path.as_ref());
        }
        matcher
    }

    /// Add a pattern. Returns false if it was already present.
    pub fn add_path(&mut self, path: &ScenePath) -> bool {
        Arc::make_mut(&mut self.root).add(path.names())
    }

    /// Add a textual pattern. The empty string is not a path and is ignored.
    pub fn add_str(&mut self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        self.add_path(&ScenePath::parse(path))
    }

    /// Remove a pattern. Returns false if it was not present.
    pub fn remove_path(&mut self, path: &ScenePath) -> bool {
        if !self.root.has_children() && !self.root.terminator {
            return false;
        }
        Arc::make_mut(&mut self.root).remove(path.names())
    }

    /// Remove a textual pattern
    pub fn remove_str(&mut self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }
        self.remove_path(&ScenePath::parse(path))
    }

    /// Remove a location and every pattern below it
    pub fn prune(&mut self, path: &ScenePath) -> bool {
        if self.root.is_empty() {
            return false;
        }
        Arc::make_mut(&mut self.root).prune(path.names())
    }

    /// Add every pattern of `other`. Returns true if anything was added.
    pub fn add_paths(&mut self, other: &PathMatcher) -> bool {
        if Arc::ptr_eq(&self.root, &other.root) {
            return false;
        }
        Arc::make_mut(&mut self.root).merge(&other.root)
    }

    /// Add every pattern of `other` below `prefix`
    pub fn add_paths_with_prefix(&mut self, other: &PathMatcher, prefix: &ScenePath) -> bool {
        if other.is_empty() {
            return false;
        }
        let mut node = Arc::make_mut(&mut self.root);
        for name in prefix.names() {
            node = node.child_or_insert(name);
        }
        node.merge(&other.root)
    }

    /// Remove every pattern of `other`. Returns true if anything was removed.
    pub fn remove_paths(&mut self, other: &PathMatcher) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        Arc::make_mut(&mut self.root).subtract(&other.root)
    }

    /// Patterns below `root`, re-rooted so that `root` becomes `/`
    pub fn sub_tree(&self, root: &ScenePath) -> PathMatcher {
        let mut node = &self.root;
        for name in root.names() {
            match node.child(name) {
                Some(child) => node = child,
                None => return PathMatcher::new(),
            }
        }
        PathMatcher { root: node.clone() }
    }

    /// Match a concrete path against the patterns
    pub fn match_path(&self, path: &ScenePath) -> MatchResult {
        let mut result = MatchResult::NO_MATCH;
        self.root.match_into(path.names(), &mut result);
        result
    }

    /// Match a textual path
    pub fn match_str(&self, path: &str) -> MatchResult {
        self.match_path(&ScenePath::parse(path))
    }

    /// True if the path itself is matched
    pub fn contains(&self, path: &ScenePath) -> bool {
        self.match_path(path).contains(MatchResult::EXACT)
    }

    /// All patterns, depth first, literals before wildcards before ellipses
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.root.collect(&mut Vec::new(), &mut out);
        out
    }

    /// True if no pattern is present
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Remove all patterns
    pub fn clear(&mut self) {
        self.root = Arc::default();
    }
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.paths()).finish()
    }
}

impl Serialize for PathMatcher {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.paths().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PathMatcher {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let paths = Vec::<String>::deserialize(deserializer)?;
        Ok(Self::from_strs(paths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO: MatchResult = MatchResult::NO_MATCH;
    const DESC: MatchResult = MatchResult::DESCENDANT;
    const EXACT: MatchResult = MatchResult::EXACT;
    const ANC: MatchResult = MatchResult::ANCESTOR;

    fn check(m: &PathMatcher, cases: &[(&str, MatchResult)]) {
        for (path, expected) in cases {
            assert_eq!(m.match_str(path), *expected, "matching {path}");
        }
    }

    #[test]
    fn test_match() {
        let m = PathMatcher::from_strs(["/a", "/red", "/b/c/d"]);
        check(
            &m,
            &[
                ("/a", EXACT),
                ("/red", EXACT),
                ("/re", NO),
                ("/redThing", NO),
                ("/b/c/d", EXACT),
                ("/c", NO),
                ("/a/b", ANC),
                ("/blue", NO),
                ("/b/c", DESC),
            ],
        );
        assert_eq!(PathMatcher::new().match_str("/"), NO);
    }

    #[test]
    fn test_wildcards() {
        let m = PathMatcher::from_strs([
            "/a",
            "/red*",
            "/green*Bloke*",
            "/somewhere/over/the/*",
            "/somewhere/over/the/*/skies/are/blue",
        ]);
        check(
            &m,
            &[
                ("/redBoots", EXACT),
                ("/red", EXACT),
                ("/redWellies/in/puddles", ANC),
                ("/greenFatBloke", EXACT),
                ("/greenBlokes", EXACT),
                ("/somewhere/over/the/rainbow", EXACT | DESC),
                ("/somewhere/over/the", DESC),
                ("/somewhere", DESC),
                ("/somewhere/over/the/rainbow/skies/are/blue", EXACT | ANC),
                ("/somewhere/over/the/rainbow/skies/are", DESC | ANC),
                ("/somewhere/over/the/astonExpressway/skies/are/grey", ANC),
            ],
        );
    }

    #[test]
    fn test_wildcards_with_siblings() {
        let m = PathMatcher::from_strs(["/a/*/b", "/a/a*/c"]);
        check(&m, &[("/a/aThing/c", EXACT), ("/a/aThing/b", EXACT)]);
        let m = PathMatcher::from_strs(["/a/**s"]);
        check(&m, &[("/a/s", EXACT)]);
        let m = PathMatcher::from_strs(["/c", "/*b"]);
        check(&m, &[("/b", EXACT)]);
    }

    #[test]
    fn test_ellipsis() {
        let m = PathMatcher::from_strs(["/a/.../b*", "/a/c"]);
        check(
            &m,
            &[
                ("/a/ball", EXACT | DESC),
                ("/a/red/ball", EXACT | DESC),
                ("/a/red/car", DESC),
                ("/a/big/red/ball", EXACT | DESC | ANC),
                ("/a/lovely/shiny/bicyle", EXACT | DESC),
                ("/a/c", EXACT | DESC),
                ("/a/anything/at/all", DESC),
                ("/b/anything/at/all", NO),
            ],
        );
    }

    #[test]
    fn test_ellipsis_as_terminator() {
        let m = PathMatcher::from_strs(["/a/..."]);
        check(
            &m,
            &[
                ("/a", EXACT | DESC),
                ("/a/ball", EXACT | DESC | ANC),
                ("/a/red/car/rolls", EXACT | DESC | ANC),
            ],
        );
    }

    #[test]
    fn test_root_ancestor_match() {
        let m = PathMatcher::from_strs(["/"]);
        check(&m, &[("/", EXACT), ("/armadillo", ANC), ("/a/b/c", ANC)]);
    }

    #[test]
    fn test_add_and_remove() {
        let mut m = PathMatcher::new();
        assert!(m.add_str("/a"));
        assert!(m.add_str("/a/b"));
        assert!(!m.add_str("/a/b"));
        assert!(!m.add_str(""));
        check(&m, &[("/a", EXACT | DESC), ("/a/b", EXACT | ANC)]);
        assert!(m.remove_str("/a"));
        check(&m, &[("/a", DESC), ("/a/b", EXACT)]);
        assert!(m.remove_str("/a/b"));
        assert!(!m.remove_str("/a/b"));
        check(&m, &[("/a", NO), ("/a/b", NO)]);
        assert!(m.is_empty());
    }

    #[test]
    fn test_remove_prunes_intermediate_nodes() {
        let mut m = PathMatcher::new();
        m.add_str("/a/.../b");
        check(&m, &[("/a", DESC), ("/a/c/b", EXACT | DESC)]);
        m.remove_str("/a/.../b");
        check(&m, &[("/a", NO), ("/a/c/b", NO)]);
        assert_eq!(m, PathMatcher::new());
    }

    #[test]
    fn test_paths_order() {
        let mut m = PathMatcher::new();
        m.add_str("/a/b");
        m.add_str("/a/.../b");
        assert_eq!(m.paths(), vec!["/a/b", "/a/.../b"]);
        m.remove_str("/a/.../b");
        m.add_str("/a/b/c*d*");
        assert_eq!(m.paths(), vec!["/a/b", "/a/b/c*d*"]);
        m.clear();
        assert!(m.paths().is_empty());
        m.add_str("/");
        assert_eq!(m.paths(), vec!["/"]);
    }

    #[test]
    fn test_prune() {
        let mut m = PathMatcher::from_strs(["/a/b/c", "/a/.../c", "/a/b/c/d", "/a/b/...", "/a", "/c/d"]);
        assert!(m.prune(&ScenePath::parse("/a/b")));
        let mut paths = m.paths();
        paths.sort();
        assert_eq!(paths, vec!["/a", "/a/.../c", "/c/d"]);
        assert!(!m.prune(&ScenePath::parse("/a/b")));
        assert!(m.prune(&ScenePath::parse("/a")));
        assert!(!m.prune(&ScenePath::parse("/c/d/e")));
        assert_eq!(m.paths(), vec!["/c/d"]);
        assert!(m.prune(&ScenePath::root()));
        assert!(m.is_empty());
    }

    #[test]
    fn test_add_and_remove_paths() {
        let m1 = PathMatcher::from_strs(["/a", "/b", "/b/c/d"]);
        let m2 = PathMatcher::from_strs(["/a/b", "/b/e", "/b/c/d/e/f/...", "/b/c/d/e/f/.../g"]);
        let mut m = PathMatcher::new();
        assert!(m.add_paths(&m1));
        assert_eq!(m.paths(), m1.paths());
        assert!(!m.add_paths(&m1));
        assert!(m.add_paths(&m2));
        assert!(!m.add_paths(&m2));
        assert!(m.remove_paths(&m1));
        assert_eq!(m.paths(), m2.paths());
        assert!(!m.remove_paths(&m1));
        assert!(m.remove_paths(&m2));
        assert!(m.is_empty());
    }

    #[test]
    fn test_prefix_and_sub_tree() {
        let m1 = PathMatcher::from_strs(["/b", "/c/d"]);
        let mut m = PathMatcher::new();
        assert!(m.add_paths_with_prefix(&m1, &ScenePath::parse("/a")));
        assert_eq!(m.paths(), vec!["/a/b", "/a/c/d"]);
        assert_eq!(m.sub_tree(&ScenePath::parse("/a")), m1);
        assert!(m.sub_tree(&ScenePath::parse("/x")).is_empty());
        assert!(!m.add_paths_with_prefix(&PathMatcher::new(), &ScenePath::parse("/z")));
        assert_eq!(m.paths().len(), 2);
    }

    #[test]
    fn test_copies_are_independent() {
        let mut m = PathMatcher::from_strs(["/a"]);
        let m2 = m.clone();
        m.clear();
        assert_eq!(m.match_str("/a"), NO);
        assert_eq!(m2.match_str("/a"), EXACT);
    }

    #[test]
    fn test_equality() {
        let mut m1 = PathMatcher::new();
        let mut m2 = PathMatcher::new();
        assert_eq!(m1, m2);
        m1.add_str("/a/b/.../c");
        assert_ne!(m1, m2);
        m2.add_str("/a/b/.../c");
        assert_eq!(m1, m2);
    }

    #[test]
    fn test_glob() {
        assert!(glob_match("ball", "b*"));
        assert!(glob_match("b", "b*"));
        assert!(!glob_match("car", "b*"));
        assert!(glob_match("cat", "c?t"));
        assert!(glob_match("cat", "[bc]at"));
        assert!(!glob_match("rat", "[bc]at"));
        assert!(glob_match("rat", "[!bc]at"));
        assert!(glob_match("a5", "a[0-9]"));
        assert!(glob_match("a*", "a\\*"));
    }

    #[test]
    fn test_ron_round_trip() {
        let m = PathMatcher::from_strs(["/a/b", "/c/..."]);
        let text = ron::to_string(&m).unwrap();
        let back: PathMatcher = ron::from_str(&text).unwrap();
        assert_eq!(m, back);
    }
}
