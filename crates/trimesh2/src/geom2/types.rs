//! Tolerances and the 2D affine map.

use nalgebra::{Matrix2, Vector2};

/// Numerical tolerance for generic geometric predicates (point equality,
/// near-zero denominators). Scale-agnostic; callers should avoid extreme
/// coordinate scalings.
pub const EPS: f64 = 1e-9;

/// Barycentric classification band: a located point whose `u`, `v`, or
/// `1-(u+v)` falls below this is treated as lying on the corresponding edge
/// rather than strictly inside the triangle.
pub const BARY_EPS: f64 = 0.01;

/// Guard on the incircle determinant sign: quads within this band of
/// cocircularity count as already Delaunay, so the flip-repair loop cannot
/// oscillate between the two diagonals of a cocircular quad.
pub const INCIRCLE_EPS: f64 = 1e-12;

/// 2D affine map: `x ↦ M x + t`.
#[derive(Clone, Copy, Debug)]
pub struct Aff2 {
    pub m: Matrix2<f64>,
    pub t: Vector2<f64>,
}

impl Aff2 {
    #[inline]
    pub fn identity() -> Self {
        Self {
            m: Matrix2::identity(),
            t: Vector2::zeros(),
        }
    }

    #[inline]
    pub fn apply(&self, p: Vector2<f64>) -> Vector2<f64> {
        self.m * p + self.t
    }

    /// Inverse map if `m` is invertible, `None` when `det(M) ≈ 0`.
    pub fn inverse(&self) -> Option<Self> {
        self.m.try_inverse().map(|minv| Self {
            m: minv,
            t: -minv * self.t,
        })
    }

    /// Composition `self ∘ other`.
    #[inline]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            m: self.m * other.m,
            t: self.m * other.t + self.t,
        }
    }
}
