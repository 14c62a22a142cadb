// SPDX-License-Identifier: MIT OR Apache-2.0
//! The composite scene plug and its facets.
//!
//! A scene plug describes one location of a hierarchy at a time: the
//! location is taken from the `scene:path` context variable. Each facet is
//! a separate child plug so that it hashes and caches independently.

use loom_graph::{Direction, PlugSpec, PlugType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One independently cached aspect of a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facet {
    /// Bound of the location and its descendants, in local space
    Bound,
    /// Local-to-parent transform
    Transform,
    /// Attributes declared at the location
    Attributes,
    /// Payload at the location
    Object,
    /// Names of the immediate children
    ChildNames,
    /// Scene-wide options and outputs
    Globals,
    /// Names of every set
    SetNames,
    /// Members of the set named by `scene:setName`
    Set,
}

impl Facet {
    /// Every facet, in declaration order
    pub const ALL: [Facet; 8] = [
        Facet::Bound,
        Facet::Transform,
        Facet::Attributes,
        Facet::Object,
        Facet::ChildNames,
        Facet::Globals,
        Facet::SetNames,
        Facet::Set,
    ];

    /// Facets that vary with `scene:path`
    pub const PER_LOCATION: [Facet; 5] = [
        Facet::Bound,
        Facet::Transform,
        Facet::Attributes,
        Facet::Object,
        Facet::ChildNames,
    ];

    /// Child plug name
    pub fn name(self) -> &'static str {
        match self {
            Facet::Bound => "bound",
            Facet::Transform => "transform",
            Facet::Attributes => "attributes",
            Facet::Object => "object",
            Facet::ChildNames => "childNames",
            Facet::Globals => "globals",
            Facet::SetNames => "setNames",
            Facet::Set => "set",
        }
    }

    /// Facet for a child plug name
    pub fn from_name(name: &str) -> Option<Facet> {
        Facet::ALL.into_iter().find(|facet| facet.name() == name)
    }

    /// Value type
    pub fn plug_type(self) -> PlugType {
        match self {
            Facet::Bound => PlugType::Box3f,
            Facet::Transform => PlugType::M44f,
            Facet::Attributes | Facet::Globals => PlugType::Compound,
            Facet::Object => PlugType::Object,
            Facet::ChildNames | Facet::SetNames => PlugType::Names,
            Facet::Set => PlugType::PathSet,
        }
    }

    /// True if the facet reads `scene:path`
    pub fn reads_path(self) -> bool {
        Facet::PER_LOCATION.contains(&self)
    }

    /// Full name of this facet on the scene plug `scene`
    pub fn on(self, scene: &str) -> String {
        format!("{scene}.{}", self.name())
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declaration of a scene plug named `name`
pub fn scene_plug(name: &str, direction: Direction) -> PlugSpec {
    let children = Facet::ALL
        .into_iter()
        .map(|facet| PlugSpec::input(facet.name(), facet.plug_type()))
        .collect();
    PlugSpec::composite(name, direction, children)
}

/// Splits `"in.bound"` into the scene plug name and facet
pub fn split_facet(plug: &str) -> Option<(&str, Facet)> {
    let (scene, facet) = plug.rsplit_once('.')?;
    Some((scene, Facet::from_name(facet)?))
}

/// Full names of the per-location facets of `out`
pub fn per_location_outputs() -> Vec<String> {
    Facet::PER_LOCATION.into_iter().map(|facet| facet.on("out")).collect()
}
