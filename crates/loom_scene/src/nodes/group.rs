// SPDX-License-Identifier: MIT OR Apache-2.0
//! Parenting several input scenes under a new location.
//!
//! Children of every connected `inN` scene become children of `/name`.
//! Clashing names get a numeric suffix, earlier inputs keeping theirs.

use super::empty_facet;
use crate::query::SceneQuery;
use crate::scene_node::{SceneNode, SceneScope};
use crate::scene_plug::{per_location_outputs, scene_plug, split_facet, Facet};
use loom_graph::{
    Box3f, CompoundValue, Direction, Fingerprint, FingerprintHasher, Graph, M44f, NodeId, PathMatcher, PlugId,
    PlugSpec, PlugType, Result, ScenePath, V3f, Value,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Parents its input scenes under `/name`
pub struct Group;

/// Output child name and where it comes from
struct Mapped {
    name: String,
    input: usize,
    source: String,
}

/// Index of an `inN` plug name
fn input_index(name: &str) -> Option<usize> {
    name.strip_prefix("in")?.parse().ok()
}

/// Add the next free `inN` scene input to a group
pub fn add_group_input(graph: &Graph, node: NodeId) -> Result<PlugId> {
    let next = {
        let state = graph.read();
        state
            .node(node)?
            .plugs()
            .filter_map(|(name, _)| input_index(name))
            .max()
            .map_or(0, |index| index + 1)
    };
    graph.add_plug(node, scene_plug(&format!("in{next}"), Direction::In))
}

/// `name` with its trailing digits replaced by the first free number
fn unique_name(name: &str, used: &HashSet<String>) -> String {
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    (1..)
        .map(|n| format!("{stem}{n}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| stem.to_string())
}

/// Connected inputs in index order
fn inputs<'s, 'a>(scope: &SceneScope<'_, 's, 'a>) -> Result<Vec<SceneQuery<'s, 'a>>> {
    let mut names: Vec<(usize, &str)> = scope
        .node()
        .plugs()
        .filter_map(|(name, _)| input_index(name).map(|index| (index, name)))
        .filter(|(_, name)| scope.is_connected(&Facet::ChildNames.on(name)))
        .collect();
    names.sort_unstable();
    names.into_iter().map(|(_, name)| scope.input(name)).collect()
}

fn mapping(inputs: &[SceneQuery<'_, '_>]) -> Result<Vec<Mapped>> {
    let mut used = HashSet::new();
    let mut mapped = Vec::new();
    for (input, query) in inputs.iter().enumerate() {
        for source in query.child_names(&ScenePath::root())?.iter() {
            let name = if used.contains(source) {
                unique_name(source, &used)
            } else {
                source.clone()
            };
            used.insert(name.clone());
            mapped.push(Mapped {
                name,
                input,
                source: source.clone(),
            });
        }
    }
    Ok(mapped)
}

fn mapping_hash(inputs: &[SceneQuery<'_, '_>]) -> Result<Fingerprint> {
    let mut hasher = FingerprintHasher::new();
    for query in inputs {
        hasher.append_fingerprint(query.child_names_hash(&ScenePath::root())?);
    }
    Ok(hasher.finish())
}

fn group_transform(scope: &SceneScope<'_, '_, '_>) -> Result<M44f> {
    Ok(M44f::from_trs(
        scope.get_v3f("translate")?,
        scope.get_v3f("rotate")?,
        scope.get_v3f("scale")?,
    ))
}

/// Where a location below `/name` comes from
enum Branch<'m> {
    Root,
    Group,
    Input(&'m Mapped, ScenePath),
    Missing,
}

fn branch<'m>(path: &ScenePath, name: &str, mapped: &'m [Mapped]) -> Branch<'m> {
    if path.is_root() {
        return Branch::Root;
    }
    if path.names()[0] != name {
        return Branch::Missing;
    }
    if path.len() == 1 {
        return Branch::Group;
    }
    match mapped.iter().find(|m| m.name == path.names()[1]) {
        Some(m) => {
            let source = ScenePath::from_names([m.source.clone()]).join(&path.strip_prefix_len(2));
            Branch::Input(m, source)
        }
        None => Branch::Missing,
    }
}

impl SceneNode for Group {
    fn type_name(&self) -> &str {
        "Group"
    }

    fn declare(&self) -> Vec<PlugSpec> {
        vec![
            PlugSpec::input("name", PlugType::String).with_default("group"),
            PlugSpec::input("translate", PlugType::V3f),
            PlugSpec::input("rotate", PlugType::V3f),
            PlugSpec::input("scale", PlugType::V3f).with_default(V3f::ONE),
            scene_plug("in0", Direction::In),
        ]
    }

    fn affects(&self, input: &str) -> Vec<String> {
        match input {
            "name" => {
                let mut outputs = per_location_outputs();
                outputs.push(Facet::Set.on("out"));
                outputs
            }
            "translate" | "rotate" | "scale" => vec![Facet::Transform.on("out"), Facet::Bound.on("out")],
            _ => match split_facet(input) {
                Some((_, Facet::ChildNames)) => {
                    let mut outputs = per_location_outputs();
                    outputs.push(Facet::Set.on("out"));
                    outputs
                }
                Some((_, Facet::Transform)) => vec![Facet::Transform.on("out"), Facet::Bound.on("out")],
                Some((_, facet)) => vec![facet.on("out")],
                None => Vec::new(),
            },
        }
    }

    fn hash(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Fingerprint> {
        let inputs = inputs(scope)?;
        let mut hasher = scope.path_hasher(facet);
        match facet {
            Facet::Globals => {
                for query in &inputs {
                    hasher.append_fingerprint(query.globals_hash()?);
                }
                return Ok(hasher.finish());
            }
            Facet::SetNames => {
                for query in &inputs {
                    hasher.append_fingerprint(query.set_names_hash()?);
                }
                return Ok(hasher.finish());
            }
            Facet::Set => {
                let set_name = scope.set_name()?;
                scope.append_plugs(&mut hasher, &["name"])?;
                hasher.append(set_name).append_fingerprint(mapping_hash(&inputs)?);
                for query in &inputs {
                    hasher.append_fingerprint(query.set_hash(set_name)?);
                }
                return Ok(hasher.finish());
            }
            _ => {}
        }

        let name = scope.get_string("name")?;
        let mapped = mapping(&inputs)?;
        match branch(scope.path(), &name, &mapped) {
            Branch::Input(m, source) => inputs[m.input].hash_at(facet, &source),
            Branch::Root => {
                hasher.append(&name);
                if facet == Facet::Bound {
                    scope.append_plugs(&mut hasher, &["translate", "rotate", "scale"])?;
                    hasher.append_fingerprint(scope.output()?.bound_hash(&ScenePath::from_names([name]))?);
                }
                Ok(hasher.finish())
            }
            Branch::Group => {
                hasher.append(&name);
                match facet {
                    Facet::Transform => scope.append_plugs(&mut hasher, &["translate", "rotate", "scale"])?,
                    Facet::Bound => {
                        for m in &mapped {
                            let child = ScenePath::from_names([m.source.clone()]);
                            hasher
                                .append(&m.input)
                                .append_fingerprint(inputs[m.input].bound_hash(&child)?)
                                .append_fingerprint(inputs[m.input].transform_hash(&child)?);
                        }
                    }
                    Facet::ChildNames => {
                        hasher.append_fingerprint(mapping_hash(&inputs)?);
                    }
                    _ => {}
                }
                Ok(hasher.finish())
            }
            Branch::Missing => {
                hasher.append(&name).append_fingerprint(mapping_hash(&inputs)?);
                Ok(hasher.finish())
            }
        }
    }

    fn compute(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Value> {
        let inputs = inputs(scope)?;
        match facet {
            Facet::Globals => {
                let mut globals = CompoundValue::new();
                for query in inputs.iter().rev() {
                    globals.extend(query.globals()?.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                return Ok(Value::Compound(Arc::new(globals)));
            }
            Facet::SetNames => {
                let mut names: Vec<String> = Vec::new();
                for query in &inputs {
                    for set in query.set_names()?.iter() {
                        if !names.contains(set) {
                            names.push(set.clone());
                        }
                    }
                }
                return Ok(Value::names(names));
            }
            Facet::Set => {
                let set_name = scope.set_name()?;
                let group = ScenePath::from_names([scope.get_string("name")?]);
                let mut set = PathMatcher::new();
                let input_sets = inputs.iter().map(|q| q.set(set_name)).collect::<Result<Vec<_>>>()?;
                for m in mapping(&inputs)? {
                    let members = input_sets[m.input].sub_tree(&ScenePath::from_names([m.source]));
                    set.add_paths_with_prefix(&members, &group.child(m.name));
                }
                return Ok(Value::from(set));
            }
            _ => {}
        }

        let name = scope.get_string("name")?;
        let mapped = mapping(&inputs)?;
        match branch(scope.path(), &name, &mapped) {
            Branch::Input(m, source) => {
                let query = &inputs[m.input];
                Ok(match facet {
                    Facet::Bound => Value::Box3f(query.bound(&source)?),
                    Facet::Transform => Value::M44f(query.transform(&source)?),
                    Facet::Attributes => Value::Compound(query.attributes(&source)?),
                    Facet::Object => Value::Object(query.object(&source)?),
                    _ => Value::Names(query.child_names(&source)?),
                })
            }
            Branch::Root => match facet {
                Facet::ChildNames => Ok(Value::names([name])),
                Facet::Bound => {
                    let bound = scope.output()?.bound(&ScenePath::from_names([name]))?;
                    Ok(Value::Box3f(group_transform(scope)?.transform_box(&bound)))
                }
                _ => empty_facet(facet),
            },
            Branch::Group => match facet {
                Facet::Transform => Ok(Value::M44f(group_transform(scope)?)),
                Facet::ChildNames => Ok(Value::names(mapped.into_iter().map(|m| m.name))),
                Facet::Bound => {
                    let mut bound = Box3f::EMPTY;
                    for m in &mapped {
                        let child = ScenePath::from_names([m.source.clone()]);
                        let query = &inputs[m.input];
                        bound.extend_by_box(&query.transform(&child)?.transform_box(&query.bound(&child)?));
                    }
                    Ok(Value::Box3f(bound))
                }
                _ => empty_facet(facet),
            },
            Branch::Missing => empty_facet(facet),
        }
    }
}
