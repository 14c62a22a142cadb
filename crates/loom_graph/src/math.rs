// SPDX-License-Identifier: MIT OR Apache-2.0
//! Small linear algebra types used by plug values.
//!
//! Matrices follow the row-vector convention: points transform as `p * M`,
//! the translation lives in the last row, and `local * parent` yields the
//! world transform of a child.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// 2D vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct V2f {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
}

impl V2f {
    /// Create a new vector
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// 3D vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct V3f {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl V3f {
    /// The zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    /// The unit vector
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    /// Create a new vector
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Same value in all components
    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    /// Component-wise minimum
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Component-wise maximum
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    /// Component by index (0 = x, 1 = y, anything else = z)
    pub fn get(self, axis: usize) -> f32 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Set a component by index
    pub fn set(&mut self, axis: usize, value: f32) {
        match axis {
            0 => self.x = value,
            1 => self.y = value,
            _ => self.z = value,
        }
    }

    /// Approximate equality, used by tests and constraint checks
    pub fn approx_eq(self, other: Self, tolerance: f32) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.z - other.z).abs() <= tolerance
    }
}

impl Add for V3f {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for V3f {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for V3f {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Axis-aligned bounding box. The empty box has `min > max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Box3f {
    /// Minimum corner
    pub min: V3f,
    /// Maximum corner
    pub max: V3f,
}

impl Default for Box3f {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Box3f {
    /// The empty box
    pub const EMPTY: Self = Self {
        min: V3f::splat(f32::INFINITY),
        max: V3f::splat(f32::NEG_INFINITY),
    };

    /// Create a box from its corners
    pub const fn new(min: V3f, max: V3f) -> Self {
        Self { min, max }
    }

    /// True if the box contains no points
    pub fn is_empty(&self) -> bool {
        self.max.x < self.min.x || self.max.y < self.min.y || self.max.z < self.min.z
    }

    /// Grow to include a point
    pub fn extend_by(&mut self, point: V3f) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grow to include another box
    pub fn extend_by_box(&mut self, other: &Box3f) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Union of two boxes
    pub fn union(mut self, other: &Box3f) -> Self {
        self.extend_by_box(other);
        self
    }

    /// Center point
    pub fn center(&self) -> V3f {
        (self.min + self.max) * 0.5
    }

    /// Size along each axis
    pub fn size(&self) -> V3f {
        if self.is_empty() {
            V3f::ZERO
        } else {
            self.max - self.min
        }
    }
}

/// 4x4 matrix, row major, row-vector convention
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct M44f(pub [[f32; 4]; 4]);

impl Default for M44f {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl M44f {
    /// The identity matrix
    pub const IDENTITY: Self = Self([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    /// Pure translation
    pub fn from_translation(t: V3f) -> Self {
        let mut m = Self::IDENTITY;
        m.0[3][0] = t.x;
        m.0[3][1] = t.y;
        m.0[3][2] = t.z;
        m
    }

    /// Pure scale
    pub fn from_scale(s: V3f) -> Self {
        let mut m = Self::IDENTITY;
        m.0[0][0] = s.x;
        m.0[1][1] = s.y;
        m.0[2][2] = s.z;
        m
    }

    /// Rotation from XYZ euler angles in degrees, X applied first
    pub fn from_rotation_degrees(r: V3f) -> Self {
        let (sx, cx) = r.x.to_radians().sin_cos();
        let (sy, cy) = r.y.to_radians().sin_cos();
        let (sz, cz) = r.z.to_radians().sin_cos();
        let rx = Self([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, cx, sx, 0.0],
            [0.0, -sx, cx, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let ry = Self([
            [cy, 0.0, -sy, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [sy, 0.0, cy, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let rz = Self([
            [cz, sz, 0.0, 0.0],
            [-sz, cz, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        rx * ry * rz
    }

    /// Scale, then rotate, then translate
    pub fn from_trs(translate: V3f, rotate: V3f, scale: V3f) -> Self {
        Self::from_scale(scale) * Self::from_rotation_degrees(rotate) * Self::from_translation(translate)
    }

    /// Translation component
    pub fn translation(&self) -> V3f {
        V3f::new(self.0[3][0], self.0[3][1], self.0[3][2])
    }

    /// Replace the translation component
    pub fn set_translation(&mut self, t: V3f) {
        self.0[3][0] = t.x;
        self.0[3][1] = t.y;
        self.0[3][2] = t.z;
    }

    /// Translate in local space, equivalent to `from_translation(t) * self`
    pub fn translate(&mut self, t: V3f) {
        for i in 0..4 {
            self.0[3][i] += t.x * self.0[0][i] + t.y * self.0[1][i] + t.z * self.0[2][i];
        }
    }

    /// Transform a point
    pub fn transform_point(&self, p: V3f) -> V3f {
        let m = &self.0;
        let x = p.x * m[0][0] + p.y * m[1][0] + p.z * m[2][0] + m[3][0];
        let y = p.x * m[0][1] + p.y * m[1][1] + p.z * m[2][1] + m[3][1];
        let z = p.x * m[0][2] + p.y * m[1][2] + p.z * m[2][2] + m[3][2];
        let w = p.x * m[0][3] + p.y * m[1][3] + p.z * m[2][3] + m[3][3];
        if w != 0.0 && w != 1.0 {
            V3f::new(x / w, y / w, z / w)
        } else {
            V3f::new(x, y, z)
        }
    }

    /// Bound of the eight transformed corners
    pub fn transform_box(&self, b: &Box3f) -> Box3f {
        if b.is_empty() {
            return *b;
        }
        let mut out = Box3f::EMPTY;
        for i in 0..8 {
            let corner = V3f::new(
                if i & 1 == 0 { b.min.x } else { b.max.x },
                if i & 2 == 0 { b.min.y } else { b.max.y },
                if i & 4 == 0 { b.min.z } else { b.max.z },
            );
            out.extend_by(self.transform_point(corner));
        }
        out
    }

    /// Inverse by Gauss-Jordan elimination. Singular matrices yield identity.
    pub fn inverse(&self) -> Self {
        let mut a = self.0;
        let mut inv = Self::IDENTITY.0;

        for col in 0..4 {
            let mut pivot = col;
            for row in (col + 1)..4 {
                if a[row][col].abs() > a[pivot][col].abs() {
                    pivot = row;
                }
            }
            if a[pivot][col].abs() < f32::EPSILON {
                tracing::warn!("Inverting a singular matrix");
                return Self::IDENTITY;
            }
            a.swap(col, pivot);
            inv.swap(col, pivot);

            let d = a[col][col];
            for k in 0..4 {
                a[col][k] /= d;
                inv[col][k] /= d;
            }
            for row in 0..4 {
                if row != col {
                    let f = a[row][col];
                    if f != 0.0 {
                        for k in 0..4 {
                            a[row][k] -= f * a[col][k];
                            inv[row][k] -= f * inv[col][k];
                        }
                    }
                }
            }
        }

        Self(inv)
    }

    /// Element-wise approximate equality
    pub fn approx_eq(&self, other: &Self, tolerance: f32) -> bool {
        self.0
            .iter()
            .flatten()
            .zip(other.0.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

impl Mul for M44f {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let mut out = [[0.0f32; 4]; 4];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.0[i][k] * rhs.0[k][j]).sum();
            }
        }
        Self(out)
    }
}
