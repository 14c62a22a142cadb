// SPDX-License-Identifier: MIT OR Apache-2.0
//! A scene holding a single object at `/name`.

use super::{empty_facet, split_names};
use crate::scene_node::{SceneNode, SceneScope};
use crate::scene_plug::Facet;
use loom_graph::context::SET_NAME;
use loom_graph::{
    Box3f, Fingerprint, M44f, ObjectValue, PathMatcher, PlugSpec, PlugType, Result, ScenePath, V3f, Value,
};
use std::sync::Arc;

/// Emits one object location below the root
pub struct ObjectSource;

enum Location {
    Root,
    Object,
    Missing,
}

fn classify(scope: &SceneScope<'_, '_, '_>) -> Result<Location> {
    let path = scope.path();
    if path.is_root() {
        return Ok(Location::Root);
    }
    let name = scope.get_string("name")?;
    Ok(if path.len() == 1 && path.name() == Some(name.as_str()) {
        Location::Object
    } else {
        Location::Missing
    })
}

fn local_transform(scope: &SceneScope<'_, '_, '_>) -> Result<M44f> {
    Ok(M44f::from_trs(
        scope.get_v3f("translate")?,
        scope.get_v3f("rotate")?,
        scope.get_v3f("scale")?,
    ))
}

impl SceneNode for ObjectSource {
    fn type_name(&self) -> &str {
        "ObjectSource"
    }

    fn declare(&self) -> Vec<PlugSpec> {
        vec![
            PlugSpec::input("name", PlugType::String).with_default("object"),
            PlugSpec::input("type", PlugType::String).with_default("mesh"),
            PlugSpec::input("objectBound", PlugType::Box3f)
                .with_default(Box3f::new(V3f::splat(-0.5), V3f::splat(0.5))),
            PlugSpec::input("parameters", PlugType::Compound),
            PlugSpec::input("translate", PlugType::V3f),
            PlugSpec::input("rotate", PlugType::V3f),
            PlugSpec::input("scale", PlugType::V3f).with_default(V3f::ONE),
            PlugSpec::input("attributes", PlugType::Compound),
            PlugSpec::input("sets", PlugType::String),
        ]
    }

    fn affects(&self, input: &str) -> Vec<String> {
        let facets: &[Facet] = match input {
            "name" => &[
                Facet::Bound,
                Facet::Transform,
                Facet::Attributes,
                Facet::Object,
                Facet::ChildNames,
                Facet::Set,
            ],
            "type" | "parameters" => &[Facet::Object],
            "objectBound" => &[Facet::Bound, Facet::Object],
            "translate" | "rotate" | "scale" => &[Facet::Transform, Facet::Bound],
            "attributes" => &[Facet::Attributes],
            "sets" => &[Facet::SetNames, Facet::Set],
            _ => &[],
        };
        facets.iter().map(|facet| facet.on("out")).collect()
    }

    fn hash(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Fingerprint> {
        let mut hasher = scope.path_hasher(facet);
        scope.append_plugs(&mut hasher, &["name"])?;
        match facet {
            Facet::Bound => scope.append_plugs(&mut hasher, &["objectBound", "translate", "rotate", "scale"])?,
            Facet::Transform => scope.append_plugs(&mut hasher, &["translate", "rotate", "scale"])?,
            Facet::Attributes => scope.append_plugs(&mut hasher, &["attributes"])?,
            Facet::Object => scope.append_plugs(&mut hasher, &["type", "objectBound", "parameters"])?,
            Facet::ChildNames | Facet::Globals => {}
            Facet::SetNames => scope.append_plugs(&mut hasher, &["sets"])?,
            Facet::Set => {
                scope.hash_variable(&mut hasher, SET_NAME);
                scope.append_plugs(&mut hasher, &["sets"])?;
            }
        }
        Ok(hasher.finish())
    }

    fn compute(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Value> {
        match facet {
            Facet::Globals => return empty_facet(facet),
            Facet::SetNames => return Ok(Value::names(split_names(&scope.get_string("sets")?))),
            Facet::Set => {
                let mut set = PathMatcher::new();
                let set_name = scope.set_name()?;
                if split_names(&scope.get_string("sets")?).iter().any(|s| s == set_name) {
                    set.add_path(&ScenePath::from_names([scope.get_string("name")?]));
                }
                return Ok(Value::from(set));
            }
            _ => {}
        }

        match (classify(scope)?, facet) {
            (Location::Root, Facet::Bound) => {
                let bound = scope.get_box3f("objectBound")?;
                Ok(Value::Box3f(local_transform(scope)?.transform_box(&bound)))
            }
            (Location::Root, Facet::ChildNames) => Ok(Value::names([scope.get_string("name")?])),
            (Location::Object, Facet::Bound) => Ok(Value::Box3f(scope.get_box3f("objectBound")?)),
            (Location::Object, Facet::Transform) => Ok(Value::M44f(local_transform(scope)?)),
            (Location::Object, Facet::Attributes) => Ok(Value::Compound(scope.get_compound("attributes")?)),
            (Location::Object, Facet::Object) => {
                let mut object = ObjectValue::new(scope.get_string("type")?, scope.get_box3f("objectBound")?);
                object.parameters = scope.get_compound("parameters")?.as_ref().clone();
                Ok(Value::Object(Arc::new(object)))
            }
            _ => empty_facet(facet),
        }
    }
}
