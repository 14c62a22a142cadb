// SPDX-License-Identifier: MIT OR Apache-2.0
//! Constraining filtered locations to a target location.
//!
//! The constrained transform is worked out in world space from the parent's
//! full transform and the target's full transform, then brought back into
//! the parent's space. Ancestors of constrained locations get their bounds
//! recomputed from their children.

use crate::query::SceneQuery;
use crate::scene_node::{SceneNode, SceneScope};
use crate::scene_plug::{scene_plug, split_facet, Facet};
use loom_graph::{
    Direction, Fingerprint, GraphError, M44f, MatchResult, PlugSpec, PlugType, Result, ScenePath,
    Value,
};
use serde::{Deserialize, Serialize};

/// Point on the target the constraint follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetMode {
    /// Origin of the target
    Origin,
    /// Minimum corner of the target bound
    BoundMin,
    /// Maximum corner of the target bound
    BoundMax,
    /// Center of the target bound
    BoundCenter,
}

impl TargetMode {
    /// Mode for the `targetMode` plug value
    pub fn from_index(index: i64) -> Result<Self> {
        match index {
            0 => Ok(Self::Origin),
            1 => Ok(Self::BoundMin),
            2 => Ok(Self::BoundMax),
            3 => Ok(Self::BoundCenter),
            _ => Err(GraphError::evaluation(format!("invalid target mode {index}"))),
        }
    }

    /// Value of the `targetMode` plug
    pub fn index(self) -> i64 {
        self as i64
    }
}

/// How the constrained transform follows the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Copy the target position on the enabled axes
    Point,
    /// Treat the target as an extra parent
    Parent,
}

/// Constraint node of either kind
pub struct ConstraintNode {
    kind: ConstraintKind,
}

impl ConstraintNode {
    /// Constraint of the given kind
    pub fn new(kind: ConstraintKind) -> Self {
        Self { kind }
    }

    /// Kind of constraint
    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    fn constrain(&self, target: &M44f, full_input: &M44f, input: &M44f, scope: &SceneScope<'_, '_, '_>) -> Result<M44f> {
        Ok(match self.kind {
            ConstraintKind::Point => {
                let enabled = [
                    scope.get_bool("xEnabled")?,
                    scope.get_bool("yEnabled")?,
                    scope.get_bool("zEnabled")?,
                ];
                let mut translation = full_input.translation();
                let position = target.translation();
                for (axis, _) in enabled.iter().enumerate().filter(|(_, on)| **on) {
                    translation.set(axis, position.get(axis));
                }
                let mut result = *full_input;
                result.set_translation(translation);
                result
            }
            ConstraintKind::Parent => *input * *target,
        })
    }
}

/// A resolved target location and the scene holding it
struct Target<'s, 'a> {
    scene: SceneQuery<'s, 'a>,
    path: ScenePath,
}

fn is_constrained(scope: &SceneScope<'_, '_, '_>) -> Result<bool> {
    Ok(scope.filter_match(scope.path())?.contains(MatchResult::EXACT))
}

/// Target to follow, or `None` when the input passes through unchanged
fn resolve_target<'s, 'a>(scope: &SceneScope<'_, 's, 'a>) -> Result<Option<Target<'s, 'a>>> {
    let target = scope.get_string("target")?;
    if target.is_empty() {
        return Ok(None);
    }
    let scene = if scope.is_connected(&Facet::ChildNames.on("targetScene")) {
        scope.input("targetScene")?
    } else {
        scope.input("in")?
    };
    let path = ScenePath::parse(&target);
    if !scene.exists(&path)? {
        if scope.get_bool("ignoreMissingTarget")? {
            return Ok(None);
        }
        return Err(GraphError::evaluation(format!("Constraint target does not exist: \"{target}\"")));
    }
    Ok(Some(Target { scene, path }))
}

impl SceneNode for ConstraintNode {
    fn type_name(&self) -> &str {
        match self.kind {
            ConstraintKind::Point => "PointConstraint",
            ConstraintKind::Parent => "ParentConstraint",
        }
    }

    fn declare(&self) -> Vec<PlugSpec> {
        let mut plugs = vec![
            scene_plug("in", Direction::In),
            PlugSpec::input("filter", PlugType::Int),
            scene_plug("targetScene", Direction::In),
            PlugSpec::input("target", PlugType::String),
            PlugSpec::input("ignoreMissingTarget", PlugType::Bool),
            PlugSpec::input("targetMode", PlugType::Int),
            PlugSpec::input("targetOffset", PlugType::V3f),
        ];
        if self.kind == ConstraintKind::Point {
            for axis in ["xEnabled", "yEnabled", "zEnabled"] {
                plugs.push(PlugSpec::input(axis, PlugType::Bool).with_default(true));
            }
        }
        plugs
    }

    fn affects(&self, input: &str) -> Vec<String> {
        let mut outputs = vec![Facet::Transform.on("out"), Facet::Bound.on("out")];
        match split_facet(input) {
            Some(("in", facet)) if !matches!(facet, Facet::Transform | Facet::Bound) => outputs.push(facet.on("out")),
            _ => {}
        }
        outputs
    }

    fn hash(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Fingerprint> {
        match facet {
            Facet::Transform if is_constrained(scope)? => {
                let Some(target) = resolve_target(scope)? else {
                    return scope.pass_through_hash(facet, "in");
                };
                let input = scope.input("in")?;
                let path = scope.path();
                let parent = path.parent().unwrap_or_else(ScenePath::root);

                let mut hasher = scope.path_hasher(facet);
                hasher
                    .append_fingerprint(input.full_transform_hash(&parent)?)
                    .append_fingerprint(target.scene.full_transform_hash(&target.path)?)
                    .append_fingerprint(input.transform_hash(path)?);
                scope.append_plugs(
                    &mut hasher,
                    &["target", "ignoreMissingTarget", "targetMode", "targetOffset"],
                )?;
                if TargetMode::from_index(scope.get_int("targetMode")?)? != TargetMode::Origin {
                    hasher.append_fingerprint(target.scene.bound_hash(&target.path)?);
                }
                if self.kind == ConstraintKind::Point {
                    scope.append_plugs(&mut hasher, &["xEnabled", "yEnabled", "zEnabled"])?;
                }
                Ok(hasher.finish())
            }
            Facet::Bound if scope.filter_match(scope.path())?.contains(MatchResult::DESCENDANT) => {
                let mut hasher = scope.path_hasher(facet);
                hasher
                    .append_fingerprint(scope.filter_hash(scope.path())?)
                    .append_fingerprint(scope.output()?.child_bounds_union_hash(scope.path())?)
                    .append_fingerprint(scope.input("in")?.object_hash(scope.path())?);
                Ok(hasher.finish())
            }
            _ => scope.pass_through_hash(facet, "in"),
        }
    }

    fn compute(&self, facet: Facet, scope: &SceneScope<'_, '_, '_>) -> Result<Value> {
        match facet {
            Facet::Transform if is_constrained(scope)? => {
                let Some(target) = resolve_target(scope)? else {
                    return scope.pass_through(facet, "in");
                };
                let input = scope.input("in")?;
                let path = scope.path();
                let parent = path.parent().unwrap_or_else(ScenePath::root);

                let parent_full = input.full_transform(&parent)?;
                let local = input.transform(path)?;
                let full_input = local * parent_full;

                let mut target_full = target.scene.full_transform(&target.path)?;
                let mode = TargetMode::from_index(scope.get_int("targetMode")?)?;
                if mode != TargetMode::Origin {
                    let bound = target.scene.bound(&target.path)?;
                    if !bound.is_empty() {
                        target_full.translate(match mode {
                            TargetMode::BoundMin => bound.min,
                            TargetMode::BoundMax => bound.max,
                            _ => bound.center(),
                        });
                    }
                }
                target_full.translate(scope.get_v3f("targetOffset")?);

                let constrained = self.constrain(&target_full, &full_input, &local, scope)?;
                Ok(Value::M44f(constrained * parent_full.inverse()))
            }
            Facet::Bound if scope.filter_match(scope.path())?.contains(MatchResult::DESCENDANT) => {
                let mut bound = scope.output()?.child_bounds_union(scope.path())?;
                bound.extend_by_box(&scope.input("in")?.object(scope.path())?.bound);
                Ok(Value::Box3f(bound))
            }
            _ => scope.pass_through(facet, "in"),
        }
    }
}
