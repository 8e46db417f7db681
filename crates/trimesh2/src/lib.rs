//! Planar triangle-mesh kernel: an indexed triangle mesh (`Mesh2`) plus an
//! incremental Delaunay subdivision engine (`SubdivisionTree`).
//!
//! Purpose
//! - `mesh2::Mesh2` owns vertex/edge/face topology as flat index arenas with
//!   free-lists and supports the local mutations Delaunay refinement needs:
//!   face subdivision, edge splitting, and edge turning (the Lawson flip).
//! - `subdivision::SubdivisionTree` wraps a mesh, keeps a point-location tree
//!   mirroring the refinement history, and builds triangulations from point
//!   sets or constrained outlines one insertion at a time.
//!
//! API Policy
//! - Handles (`VertexId`/`EdgeId`/`FaceId`) are opaque arena indices, stable
//!   for an entity's lifetime and recycled after removal. Passing a stale
//!   handle to an accessor is a programmer error and panics. The geometric
//!   no-op cases (duplicate point, point outside the bound, point on a
//!   constrained edge) are absorbed silently rather than reported as errors.

pub mod geom2;
pub mod mesh2;
pub mod subdivision;

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Convenience re-exports so call sites read like the math.
pub use nalgebra::{Matrix2 as Mat2, Vector2 as Vec2};

/// Common exports for quick imports in callers.
pub mod prelude {
    pub use crate::geom2::{tri, Aff2, BARY_EPS, EPS};
    pub use crate::mesh2::{
        EdgeId, EdgeSplit, EdgeTurn, FaceId, FaceSubdivision, JsonError, Mesh2, MeshJson, VertexId,
    };
    pub use crate::subdivision::SubdivisionTree;
    pub use nalgebra::{Matrix2 as Mat2, Vector2 as Vec2};
}
