// SPDX-License-Identifier: MIT OR Apache-2.0
//! Creating and editing named sets.

use crate::scene_node::{SceneNode, SceneScope};
use crate::scene_plug::{scene_plug, split_facet, Facet};
use loom_graph::{Direction, Fingerprint, GraphError, PathMatcher, PlugSpec, PlugType, Result, Value};
use serde::{Deserialize, Serialize};

/// How the `paths` are combined with an existing set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetMode {
    /// Replace the set
    Create,
    /// Add to the set
    Add,
    /// Remove from the set
    Remove,
}

impl SetMode {
    /// Mode for the `mode` plug value
    pub fn from_index(index: i64) -> Result<Self> {
        match index {
            0 => Ok(Self::Create),
            1 => Ok(Self::Add),
            2 => Ok(Self::Remove),
            _ => Err(GraphError::evaluation(format!("invalid set mode {index}"))),
        }
    }

    /// Value of the `mode` plug
    pub fn index(self) -> i64 {
        self as i64
    }
}

/// Writes the set `name`, passing everything else through
pub struct SetNode;

impl SceneNode for SetNode {
    fn type_name(&self) -> &str {
        "Set"
    }

    fn declare(&self) -> Vec<PlugSpec> {
        vec![
            scene_plug("in", Direction::In),
            PlugSpec::input("mode", PlugType::Int),
            PlugSpec::input("name", PlugType::String).with_default("set"),
            PlugSpec::input("paths", PlugType::Names),
        ]
    }

    fn affects(&self, input: &str) -> Vec<String> {
        match input {
            "name" => vec![Facet::SetNames.on("out"), Facet::Set.on("out")],
            "mode" | "paths" => vec![Facet::Set.on("out")],
            _ => split_facet(input).map(|(_, facet)| facet.on("out")).into_iter().collect(),
        }
    }

    fn hash(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Fingerprint> {
        match facet {
            Facet::SetNames => {
                let mut hasher = scope.hasher(facet);
                hasher.append_fingerprint(scope.pass_through_hash(facet, "in")?);
                scope.append_plugs(&mut hasher, &["name"])?;
                Ok(hasher.finish())
            }
            Facet::Set if scope.get_string("name")? == scope.set_name()? => {
                let mut hasher = scope.hasher(facet);
                hasher.append(scope.set_name()?);
                scope.append_plugs(&mut hasher, &["mode", "paths"])?;
                if SetMode::from_index(scope.get_int("mode")?)? != SetMode::Create {
                    hasher.append_fingerprint(scope.pass_through_hash(facet, "in")?);
                }
                Ok(hasher.finish())
            }
            _ => scope.pass_through_hash(facet, "in"),
        }
    }

    fn compute(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Value> {
        match facet {
            Facet::SetNames => {
                let name = scope.get_string("name")?;
                let mut names = scope.input("in")?.set_names()?.as_ref().clone();
                if !name.is_empty() && !names.contains(&name) {
                    names.push(name);
                }
                Ok(Value::names(names))
            }
            Facet::Set if scope.get_string("name")? == scope.set_name()? => {
                let paths = PathMatcher::from_strs(scope.get_names("paths")?.iter());
                let set = match SetMode::from_index(scope.get_int("mode")?)? {
                    SetMode::Create => paths,
                    SetMode::Add => {
                        let mut set = scope.input("in")?.set(scope.set_name()?)?.as_ref().clone();
                        set.add_paths(&paths);
                        set
                    }
                    SetMode::Remove => {
                        let mut set = scope.input("in")?.set(scope.set_name()?)?.as_ref().clone();
                        set.remove_paths(&paths);
                        set
                    }
                };
                Ok(Value::from(set))
            }
            _ => scope.pass_through(facet, "in"),
        }
    }
}
