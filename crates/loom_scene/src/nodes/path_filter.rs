// SPDX-License-Identifier: MIT OR Apache-2.0
//! Selecting scene locations by path pattern.

use loom_graph::context::SCENE_PATH;
use loom_graph::{Fingerprint, GraphError, NodeBehavior, NodeScope, PathMatcher, PlugSpec, PlugType, Result, Value};

/// Matches `scene:path` against a list of path patterns.
///
/// `match` is the [`loom_graph::MatchResult`] bits for the current location,
/// zero when no location is set. `set` holds the patterns themselves.
pub struct PathFilter;

impl NodeBehavior for PathFilter {
    fn type_name(&self) -> &str {
        "PathFilter"
    }

    fn declare(&self) -> Vec<PlugSpec> {
        vec![
            PlugSpec::input("paths", PlugType::Names),
            PlugSpec::output("set", PlugType::PathSet),
            PlugSpec::output("match", PlugType::Int),
        ]
    }

    fn affects(&self, input: &str) -> Vec<String> {
        match input {
            "paths" => vec!["set".to_string(), "match".to_string()],
            _ => Vec::new(),
        }
    }

    fn hash(&self, output: &str, scope: &NodeScope<'_, '_>) -> Result<Fingerprint> {
        let mut hasher = scope.hasher(output);
        hasher.append_fingerprint(scope.hash_of("paths")?);
        if output == "match" {
            scope.hash_variable(&mut hasher, SCENE_PATH);
        }
        Ok(hasher.finish())
    }

    fn compute(&self, output: &str, scope: &NodeScope<'_, '_>) -> Result<Value> {
        match output {
            "set" => Ok(Value::from(PathMatcher::from_strs(scope.get_names("paths")?.iter()))),
            "match" => {
                let Some(path) = scope.context().scene_path() else {
                    return Ok(Value::Int(0));
                };
                let set = scope.get_path_set("set")?;
                Ok(Value::Int(i64::from(set.match_path(path).bits())))
            }
            _ => Err(GraphError::PlugNotFound(format!("{}.{output}", scope.node().name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_graph::{Context, EngineConfig, Graph, MatchResult, ScenePath};
    use std::sync::Arc;

    #[test]
    fn test_match_flags() {
        let graph = Graph::isolated(EngineConfig::default());
        let node = graph.add_node("filter", Arc::new(PathFilter)).unwrap();
        let paths = graph.plug(node, "paths").unwrap();
        let matched = graph.plug(node, "match").unwrap();
        graph.set_value(paths, Value::names(["/a/b"])).unwrap();

        let flags = |path: &str| {
            let context = Context::new().with_scene_path(ScenePath::parse(path));
            let bits = graph.compute(matched, &context).unwrap().as_int().unwrap();
            MatchResult::from_bits(bits)
        };
        assert_eq!(flags("/a/b"), MatchResult::EXACT);
        assert_eq!(flags("/a"), MatchResult::DESCENDANT);
        assert_eq!(flags("/a/b/c"), MatchResult::ANCESTOR);
        assert_eq!(flags("/x"), MatchResult::NO_MATCH);
        assert_eq!(graph.compute(matched, &Context::new()).unwrap(), Value::Int(0));
    }
}
