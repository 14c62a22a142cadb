// SPDX-License-Identifier: MIT OR Apache-2.0
//! Re-rooting a scene at one of its locations.

use crate::scene_node::{SceneNode, SceneScope};
use crate::scene_plug::{per_location_outputs, scene_plug, split_facet, Facet};
use loom_graph::{Direction, Fingerprint, PathMatcher, PlugSpec, PlugType, Result, ScenePath, Value};

/// Output location `P` reads input location `root + P`.
///
/// With `includeRoot` the root location itself is kept as the single child
/// of the output root, so `P` reads `parent(root) + P`.
pub struct SubTree;

/// Input location for an output location, or `None` for the synthesized
/// root that holds the kept `root` location
fn source_path(path: &ScenePath, root: &ScenePath, include_root: bool) -> Option<ScenePath> {
    if include_root && !root.is_root() {
        if path.is_root() {
            return None;
        }
        let parent = root.parent().unwrap_or_else(ScenePath::root);
        return Some(parent.join(path));
    }
    Some(root.join(path))
}

fn settings(scope: &SceneScope<'_, '_, '_>) -> Result<(ScenePath, bool)> {
    let root = scope.get("root")?;
    let root = root.as_path().cloned().unwrap_or_else(ScenePath::root);
    Ok((root, scope.get_bool("includeRoot")?))
}

/// Members of `set` below `root`, re-rooted at the output root
fn re_rooted(set: &PathMatcher, root: &ScenePath, include_root: bool) -> PathMatcher {
    if include_root && !root.is_root() {
        let mut result = PathMatcher::new();
        let kept = root.names().last().map(|name| ScenePath::from_names([name.clone()]));
        if let Some(kept) = kept {
            result.add_paths_with_prefix(&set.sub_tree(root), &kept);
        }
        result
    } else {
        set.sub_tree(root)
    }
}

impl SceneNode for SubTree {
    fn type_name(&self) -> &str {
        "SubTree"
    }

    fn declare(&self) -> Vec<PlugSpec> {
        vec![
            scene_plug("in", Direction::In),
            PlugSpec::input("root", PlugType::Path),
            PlugSpec::input("includeRoot", PlugType::Bool),
        ]
    }

    fn affects(&self, input: &str) -> Vec<String> {
        match input {
            "root" | "includeRoot" => {
                let mut outputs = per_location_outputs();
                outputs.push(Facet::Set.on("out"));
                outputs
            }
            _ => split_facet(input).map(|(_, facet)| facet.on("out")).into_iter().collect(),
        }
    }

    fn hash(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Fingerprint> {
        let (root, include_root) = settings(scope)?;
        let input = scope.input("in")?;
        match facet {
            Facet::Globals | Facet::SetNames => scope.pass_through_hash(facet, "in"),
            Facet::Set => {
                let set_name = scope.set_name()?;
                let mut hasher = scope.hasher(facet);
                hasher
                    .append_fingerprint(input.set_hash(set_name)?)
                    .append(&root)
                    .append(&include_root);
                Ok(hasher.finish())
            }
            _ => match source_path(scope.path(), &root, include_root) {
                Some(source) => input.hash_at(facet, &source),
                None => {
                    let mut hasher = scope.path_hasher(facet);
                    hasher.append(&root);
                    match facet {
                        Facet::Bound => {
                            hasher.append_fingerprint(scope.output()?.child_bounds_union_hash(scope.path())?);
                        }
                        Facet::ChildNames => {}
                        _ => debug_assert!(false, "{facet} requested for the synthesized root"),
                    }
                    Ok(hasher.finish())
                }
            },
        }
    }

    fn compute(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Value> {
        let (root, include_root) = settings(scope)?;
        let input = scope.input("in")?;
        match facet {
            Facet::Globals | Facet::SetNames => scope.pass_through(facet, "in"),
            Facet::Set => {
                let set = input.set(scope.set_name()?)?;
                if set.is_empty() {
                    return Ok(Value::PathSet(set));
                }
                Ok(Value::from(re_rooted(&set, &root, include_root)))
            }
            _ => match source_path(scope.path(), &root, include_root) {
                Some(source) => Ok(match facet {
                    Facet::Bound => Value::Box3f(input.bound(&source)?),
                    Facet::Transform => Value::M44f(input.transform(&source)?),
                    Facet::Attributes => Value::Compound(input.attributes(&source)?),
                    Facet::Object => Value::Object(input.object(&source)?),
                    _ => Value::Names(input.child_names(&source)?),
                }),
                None => match facet {
                    Facet::Bound => Ok(Value::Box3f(scope.output()?.child_bounds_union(scope.path())?)),
                    Facet::ChildNames => Ok(Value::names(root.name().map(str::to_string))),
                    _ => {
                        debug_assert!(false, "{facet} requested for the synthesized root");
                        scope.pass_through(facet, "in")
                    }
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_path() {
        let root = ScenePath::parse("/a/b");
        assert_eq!(source_path(&ScenePath::parse("/c"), &root, false), Some(ScenePath::parse("/a/b/c")));
        assert_eq!(source_path(&ScenePath::root(), &root, true), None);
        assert_eq!(source_path(&ScenePath::parse("/b/c"), &root, true), Some(ScenePath::parse("/a/b/c")));
        assert_eq!(source_path(&ScenePath::parse("/zz/c"), &root, true), Some(ScenePath::parse("/a/zz/c")));
        assert_eq!(
            source_path(&ScenePath::parse("/c"), &ScenePath::root(), true),
            Some(ScenePath::parse("/c"))
        );
    }

    #[test]
    fn test_re_rooted_sets() {
        let set = PathMatcher::from_strs(["/a/b/c", "/a/d", "/e"]);
        let root = ScenePath::parse("/a");
        let mut paths = re_rooted(&set, &root, false).paths();
        paths.sort();
        assert_eq!(paths, vec!["/b/c", "/d"]);

        let mut paths = re_rooted(&set, &root, true).paths();
        paths.sort();
        assert_eq!(paths, vec!["/a/b/c", "/a/d"]);
    }
}
