// SPDX-License-Identifier: MIT OR Apache-2.0
//! Adding render options to the globals.

use crate::scene_node::{SceneNode, SceneScope};
use crate::scene_plug::{scene_plug, split_facet, Facet};
use loom_graph::{Direction, Fingerprint, PlugSpec, PlugType, Result, Value};
use std::sync::Arc;

/// Prefix of option entries in the globals
pub const OPTION_PREFIX: &str = "option:";

/// Merges each entry of `options` into the globals as `option:<name>`
pub struct Options;

impl SceneNode for Options {
    fn type_name(&self) -> &str {
        "Options"
    }

    fn declare(&self) -> Vec<PlugSpec> {
        vec![
            scene_plug("in", Direction::In),
            PlugSpec::input("options", PlugType::Compound),
        ]
    }

    fn affects(&self, input: &str) -> Vec<String> {
        match input {
            "options" => vec![Facet::Globals.on("out")],
            _ => split_facet(input).map(|(_, facet)| facet.on("out")).into_iter().collect(),
        }
    }

    fn hash(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Fingerprint> {
        if facet != Facet::Globals {
            return scope.pass_through_hash(facet, "in");
        }
        let mut hasher = scope.hasher(facet);
        hasher.append_fingerprint(scope.pass_through_hash(facet, "in")?);
        scope.append_plugs(&mut hasher, &["options"])?;
        Ok(hasher.finish())
    }

    fn compute(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Value> {
        if facet != Facet::Globals {
            return scope.pass_through(facet, "in");
        }
        let mut globals = scope.input("in")?.globals()?.as_ref().clone();
        for (name, value) in scope.get_compound("options")?.iter() {
            globals.insert(format!("{OPTION_PREFIX}{name}"), value.clone());
        }
        Ok(Value::Compound(Arc::new(globals)))
    }
}
