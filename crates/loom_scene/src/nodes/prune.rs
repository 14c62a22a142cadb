// SPDX-License-Identifier: MIT OR Apache-2.0
//! Removing filtered locations and everything below them.

use crate::scene_node::{SceneNode, SceneScope};
use crate::scene_plug::{scene_plug, split_facet, Facet};
use loom_graph::{Direction, Fingerprint, MatchResult, PathMatcher, PlugSpec, PlugType, Result, ScenePath, Value};

/// Removes every location matched by `filter`
pub struct Prune;

fn adjusts_bound(scope: &SceneScope<'_, '_, '_>) -> Result<bool> {
    Ok(scope.get_bool("adjustBounds")? && scope.filter_match(scope.path())?.contains(MatchResult::DESCENDANT))
}

/// Set members that survive the prune
fn surviving(scope: &SceneScope<'_, '_, '_>, input: &PathMatcher) -> Result<PathMatcher> {
    let mut set = input.clone();
    for member in input.paths() {
        let path = ScenePath::parse(&member);
        let flags = scope.filter_match(&path)?;
        if flags.contains(MatchResult::EXACT) || flags.contains(MatchResult::ANCESTOR) {
            set.remove_path(&path);
        }
    }
    Ok(set)
}

impl SceneNode for Prune {
    fn type_name(&self) -> &str {
        "Prune"
    }

    fn declare(&self) -> Vec<PlugSpec> {
        vec![
            scene_plug("in", Direction::In),
            PlugSpec::input("filter", PlugType::Int),
            PlugSpec::input("adjustBounds", PlugType::Bool),
        ]
    }

    fn affects(&self, input: &str) -> Vec<String> {
        match input {
            "filter" => [Facet::Bound, Facet::ChildNames, Facet::Set]
                .into_iter()
                .map(|facet| facet.on("out"))
                .collect(),
            "adjustBounds" => vec![Facet::Bound.on("out")],
            _ => match split_facet(input) {
                Some((_, facet)) => {
                    let mut outputs = vec![facet.on("out")];
                    if matches!(facet, Facet::ChildNames | Facet::Transform | Facet::Object) {
                        outputs.push(Facet::Bound.on("out"));
                    }
                    outputs
                }
                None => Vec::new(),
            },
        }
    }

    fn hash(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Fingerprint> {
        let input = scope.input("in")?;
        match facet {
            Facet::ChildNames => {
                let mut hasher = scope.path_hasher(facet);
                hasher.append_fingerprint(input.child_names_hash(scope.path())?);
                for name in input.child_names(scope.path())?.iter() {
                    hasher.append_fingerprint(scope.filter_hash(&scope.path().child(name.as_str()))?);
                }
                Ok(hasher.finish())
            }
            Facet::Bound if adjusts_bound(scope)? => {
                let mut hasher = scope.path_hasher(facet);
                scope.append_plugs(&mut hasher, &["adjustBounds"])?;
                hasher
                    .append_fingerprint(scope.filter_hash(scope.path())?)
                    .append_fingerprint(scope.output()?.child_bounds_union_hash(scope.path())?)
                    .append_fingerprint(input.object_hash(scope.path())?);
                Ok(hasher.finish())
            }
            Facet::Set => {
                let set_name = scope.set_name()?;
                let mut hasher = scope.hasher(facet);
                hasher.append(set_name).append_fingerprint(input.set_hash(set_name)?);
                for member in input.set(set_name)?.paths() {
                    hasher.append_fingerprint(scope.filter_hash(&ScenePath::parse(&member))?);
                }
                Ok(hasher.finish())
            }
            _ => scope.pass_through_hash(facet, "in"),
        }
    }

    fn compute(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Value> {
        let input = scope.input("in")?;
        match facet {
            Facet::ChildNames => {
                let mut kept = Vec::new();
                for name in input.child_names(scope.path())?.iter() {
                    let child = scope.path().child(name.as_str());
                    if !scope.filter_match(&child)?.contains(MatchResult::EXACT) {
                        kept.push(name.clone());
                    }
                }
                Ok(Value::names(kept))
            }
            Facet::Bound if adjusts_bound(scope)? => {
                let mut bound = scope.output()?.child_bounds_union(scope.path())?;
                bound.extend_by_box(&input.object(scope.path())?.bound);
                Ok(Value::Box3f(bound))
            }
            Facet::Set => {
                let set = input.set(scope.set_name()?)?;
                Ok(Value::from(surviving(scope, &set)?))
            }
            _ => scope.pass_through(facet, "in"),
        }
    }
}
