//! Planar primitives consumed by the mesh and subdivision layers.
//!
//! Purpose
//! - Keep all closed-form scalar geometry (triangle math, segment predicates,
//!   outline containment) in one eps-explicit place so the topology code in
//!   `mesh2`/`subdivision` stays purely combinatorial.
//!
//! Conventions
//! - Points and vectors are `nalgebra::Vector2<f64>`.
//! - Triangles are counter-clockwise; predicates that assume orientation
//!   (`tri::in_circumcircle`) say so.
//! - Barycentric coordinates follow the `(u, v)` convention of
//!   `tri::barycentric`: `u` along `p0→p2`, `v` along `p0→p1`.

pub mod tri;
mod types;
mod util;

pub use types::{Aff2, BARY_EPS, EPS, INCIRCLE_EPS};
pub use util::{aabb, intersect_segments, outline_contains, tri_intersects_tri};
