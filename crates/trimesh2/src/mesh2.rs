//! Indexed planar triangle mesh.
//!
//! Purpose
//! - Own all vertex/edge/face topology as flat arenas with free-lists, and
//!   provide the local mutations incremental Delaunay refinement needs:
//!   `subdivide_face`, `split_edge`, and `turn_edge` (the Lawson flip).
//!
//! Why this design
//! - The face/edge/vertex cross-references form cycles; `usize`-newtype
//!   handles into `Vec<Option<Slot>>` arenas break them without shared
//!   ownership. Removal never shifts indices: a slot is set to `None` and its
//!   index pushed on a per-kind free-list for reuse, so handles stay stable
//!   for an entity's lifetime and are recycled after removal.
//! - Per-vertex incident-edge sets live as `(start, end)` slices into one
//!   shared append-only buffer. Updates append the vertex's new slice and
//!   leave the old one as garbage; a compacting rebuild runs once the garbage
//!   fraction passes 1/3. Lookups stay O(1) slice reads and updates are
//!   amortized O(degree).
//!
//! Conventions
//! - Faces are counter-clockwise; `edges[i]` of a face connects
//!   `verts[i] → verts[(i+1) % 3]`.
//! - An edge stores its faces in front/back order: the front face is the one
//!   whose CCW traversal runs the edge from its stored `verts[0]`.
//! - Passing a stale handle to any accessor panics (programmer error by
//!   contract); no operation here returns `Result` except `from_json`, which
//!   consumes external data.

use std::collections::HashMap;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom2::{self, tri, Aff2, EPS};
use crate::subdivision::SubdivisionTree;

/// Identifier types for clarity. Opaque arena indices; stable while the
/// entity lives, recycled after removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexId(pub usize);
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EdgeId(pub usize);
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FaceId(pub usize);

#[derive(Clone, Copy, Debug)]
struct FaceSlot {
    /// CCW edges; `edges[i]` connects `verts[i] → verts[(i+1) % 3]`.
    edges: [EdgeId; 3],
    verts: [VertexId; 3],
}

#[derive(Clone, Copy, Debug)]
struct EdgeSlot {
    /// Front/back incident faces; a boundary edge has one `None`.
    faces: [Option<FaceId>; 2],
    /// Endpoints in creation order.
    verts: [VertexId; 2],
}

#[derive(Clone, Copy, Debug)]
struct VertSlot {
    /// Slice bounds into the shared incidence buffer.
    start: usize,
    end: usize,
}

/// Result of [`Mesh2::subdivide_face`]: the inserted vertex and the three
/// fan faces, in CCW order around the old boundary.
#[derive(Clone, Copy, Debug)]
pub struct FaceSubdivision {
    pub vertex: VertexId,
    pub faces: [FaceId; 3],
}

/// Result of [`Mesh2::split_edge`]: the inserted vertex and the replacement
/// face pair per originally-incident face (`back` is `None` for a boundary
/// edge). Pairs are grouped so callers can mirror the mutation without
/// re-deriving which new face replaced which old one.
#[derive(Clone, Copy, Debug)]
pub struct EdgeSplit {
    pub vertex: VertexId,
    pub front: Option<[FaceId; 2]>,
    pub back: Option<[FaceId; 2]>,
}

/// Result of [`Mesh2::turn_edge`]: the new diagonal and the two faces of the
/// re-triangulated quad.
#[derive(Clone, Copy, Debug)]
pub struct EdgeTurn {
    pub edge: EdgeId,
    pub faces: [FaceId; 2],
}

/// Plain-data interchange record: `f` holds vertex-index triples per face,
/// `p` holds x,y coordinate pairs deduplicated in first-seen face order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshJson {
    pub f: Vec<u32>,
    pub p: Vec<f64>,
}

/// Decode failures for [`Mesh2::from_json`] — the one recoverable-error
/// surface of the crate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JsonError {
    #[error("point array length {0} is not a multiple of 2")]
    RaggedPoints(usize),
    #[error("face array length {0} is not a multiple of 3")]
    RaggedFaces(usize),
    #[error("face vertex index {index} out of range for {points} points")]
    IndexOutOfRange { index: u32, points: usize },
}

/// Indexed planar triangle mesh. `Clone` performs the deep structural copy
/// (arenas, free-lists, incidence buffer, point table).
#[derive(Clone, Debug, Default)]
pub struct Mesh2 {
    faces: Vec<Option<FaceSlot>>,
    face_free: Vec<usize>,
    edges: Vec<Option<EdgeSlot>>,
    edge_free: Vec<usize>,
    verts: Vec<Option<VertSlot>>,
    vert_free: Vec<usize>,
    /// Point table, 1:1 with `verts` while a vertex lives.
    points: Vec<Option<Vector2<f64>>>,
    /// Shared incidence buffer: per-vertex edge lists as `(start, end)`
    /// slices, appended on update, compacted when > 1/3 garbage.
    vert_edge: Vec<EdgeId>,
    vert_edge_dirty: usize,
}

impl Mesh2 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delaunay triangulation of a point set (bounding-triangle artifacts
    /// already stripped).
    pub fn from_points(points: &[Vector2<f64>]) -> Self {
        match SubdivisionTree::around(points) {
            Some(mut tree) => {
                tree.add_points(points);
                tree.snapshot()
            }
            None => Self::new(),
        }
    }

    /// Constrained triangulation of the closed outline's interior.
    pub fn from_outline(outline: &[Vector2<f64>]) -> Self {
        match SubdivisionTree::around(outline) {
            Some(mut tree) => {
                tree.intersect_outline(outline);
                tree.snapshot()
            }
            None => Self::new(),
        }
    }

    // ───────────────────────────── slot access ─────────────────────────────

    fn face(&self, f: FaceId) -> &FaceSlot {
        self.faces[f.0].as_ref().expect("stale face id")
    }

    fn edge(&self, e: EdgeId) -> &EdgeSlot {
        self.edges[e.0].as_ref().expect("stale edge id")
    }

    fn edge_mut(&mut self, e: EdgeId) -> &mut EdgeSlot {
        self.edges[e.0].as_mut().expect("stale edge id")
    }

    fn vert(&self, v: VertexId) -> &VertSlot {
        self.verts[v.0].as_ref().expect("stale vertex id")
    }

    pub fn has_face(&self, f: FaceId) -> bool {
        self.faces.get(f.0).is_some_and(|s| s.is_some())
    }

    pub fn has_edge(&self, e: EdgeId) -> bool {
        self.edges.get(e.0).is_some_and(|s| s.is_some())
    }

    pub fn has_vertex(&self, v: VertexId) -> bool {
        self.verts.get(v.0).is_some_and(|s| s.is_some())
    }

    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| FaceId(i)))
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| EdgeId(i)))
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.verts
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| VertexId(i)))
    }

    pub fn face_count(&self) -> usize {
        self.faces.len() - self.face_free.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len() - self.edge_free.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.verts.len() - self.vert_free.len()
    }

    // ──────────────────────── incidence bookkeeping ────────────────────────

    fn add_vertex_edge(&mut self, v: VertexId, e: EdgeId) {
        let VertSlot { start, end } = *self.vert(v);
        let n = end - start;
        let new_start = self.vert_edge.len();
        self.vert_edge.extend_from_within(start..end);
        self.vert_edge.push(e);
        self.verts[v.0] = Some(VertSlot {
            start: new_start,
            end: new_start + n + 1,
        });
        self.vert_edge_dirty += n;
        self.maybe_compact();
    }

    fn remove_vertex_edge(&mut self, v: VertexId, e: EdgeId) {
        let VertSlot { start, end } = *self.vert(v);
        let n = end - start;
        let new_start = self.vert_edge.len();
        for i in start..end {
            let cur = self.vert_edge[i];
            if cur != e {
                self.vert_edge.push(cur);
            }
        }
        let new_end = self.vert_edge.len();
        self.verts[v.0] = Some(VertSlot {
            start: new_start,
            end: new_end,
        });
        self.vert_edge_dirty += n;
        self.maybe_compact();
    }

    fn maybe_compact(&mut self) {
        let total = self.vert_edge.len();
        if total > 0 && self.vert_edge_dirty as f64 / total as f64 > 0.33 {
            let src = std::mem::take(&mut self.vert_edge);
            let mut out = Vec::with_capacity(src.len() - self.vert_edge_dirty);
            for slot in self.verts.iter_mut().flatten() {
                let range = slot.start..slot.end;
                slot.start = out.len();
                out.extend_from_slice(&src[range]);
                slot.end = out.len();
            }
            self.vert_edge = out;
            self.vert_edge_dirty = 0;
        }
    }

    // ─────────────────────────── vertices & edges ───────────────────────────

    /// Inserts `p` and returns a fresh (or recycled) vertex handle with no
    /// incident edges.
    pub fn create_vertex(&mut self, p: Vector2<f64>) -> VertexId {
        let i = match self.vert_free.pop() {
            Some(i) => i,
            None => {
                self.verts.push(None);
                self.points.push(None);
                self.verts.len() - 1
            }
        };
        self.verts[i] = Some(VertSlot { start: 0, end: 0 });
        self.points[i] = Some(p);
        VertexId(i)
    }

    /// Removes `v`, cascading through every incident face (and thereby any
    /// edge left faceless). The point slot becomes a hole, not compacted.
    pub fn remove_vertex(&mut self, v: VertexId) {
        for f in self.faces_of_vertex(v) {
            self.remove_face(f);
        }
        self.verts[v.0] = None;
        self.points[v.0] = None;
        self.vert_free.push(v.0);
    }

    fn create_edge(&mut self, v0: VertexId, v1: VertexId) -> EdgeId {
        let i = match self.edge_free.pop() {
            Some(i) => i,
            None => {
                self.edges.push(None);
                self.edges.len() - 1
            }
        };
        self.edges[i] = Some(EdgeSlot {
            faces: [None, None],
            verts: [v0, v1],
        });
        let e = EdgeId(i);
        self.add_vertex_edge(v0, e);
        self.add_vertex_edge(v1, e);
        e
    }

    fn remove_edge(&mut self, e: EdgeId) {
        let [v0, v1] = self.edge(e).verts;
        self.remove_vertex_edge(v0, e);
        self.remove_vertex_edge(v1, e);
        self.edges[e.0] = None;
        self.edge_free.push(e.0);
    }

    // ────────────────────────────────faces ──────────────────────────────────

    /// Creates the face `(v0, v1, v2)`, reusing any edge already connecting a
    /// pair and creating the rest. The vertices must be CCW and distinct;
    /// this is not validated.
    pub fn create_face(&mut self, v0: VertexId, v1: VertexId, v2: VertexId) -> FaceId {
        let e0 = match self.edge_between(v0, v1) {
            Some(e) => e,
            None => self.create_edge(v0, v1),
        };
        let e1 = match self.edge_between(v1, v2) {
            Some(e) => e,
            None => self.create_edge(v1, v2),
        };
        let e2 = match self.edge_between(v2, v0) {
            Some(e) => e,
            None => self.create_edge(v2, v0),
        };

        let i = match self.face_free.pop() {
            Some(i) => i,
            None => {
                self.faces.push(None);
                self.faces.len() - 1
            }
        };
        self.faces[i] = Some(FaceSlot {
            edges: [e0, e1, e2],
            verts: [v0, v1, v2],
        });
        let f = FaceId(i);

        // Front slot when the face traverses the edge from its stored
        // origin, back slot otherwise.
        self.attach_face(e0, v0, f);
        self.attach_face(e1, v1, f);
        self.attach_face(e2, v2, f);

        f
    }

    fn attach_face(&mut self, e: EdgeId, source: VertexId, f: FaceId) {
        let slot = self.edge_mut(e);
        if slot.verts[0] == source {
            slot.faces[0] = Some(f);
        } else {
            slot.faces[1] = Some(f);
        }
    }

    /// Removes `f`; any of its edges left with zero incident faces is removed
    /// as well.
    pub fn remove_face(&mut self, f: FaceId) {
        let slot = self.faces[f.0].take().expect("stale face id");
        self.face_free.push(f.0);

        for e in slot.edges {
            let edge = self.edge_mut(e);
            if edge.faces[0] == Some(f) {
                edge.faces[0] = None;
            } else {
                edge.faces[1] = None;
            }
            if edge.faces == [None, None] {
                self.remove_edge(e);
            }
        }
    }

    // ───────────────────────────── accessors ────────────────────────────────

    /// CCW edges of `f`.
    pub fn edges_of_face(&self, f: FaceId) -> [EdgeId; 3] {
        self.face(f).edges
    }

    /// CCW edges of `f`, rotated so the first edge leaves `v`.
    pub fn edges_of_face_from(&self, f: FaceId, v: VertexId) -> [EdgeId; 3] {
        let slot = self.face(f);
        let i = slot
            .verts
            .iter()
            .position(|&w| w == v)
            .expect("vertex not on face");
        rotate3(slot.edges, i)
    }

    /// CCW vertices of `f`.
    pub fn verts_of_face(&self, f: FaceId) -> [VertexId; 3] {
        self.face(f).verts
    }

    /// CCW vertices of `f`, rotated so the first vertex is the source of `e`.
    pub fn verts_of_face_from(&self, f: FaceId, e: EdgeId) -> [VertexId; 3] {
        let slot = self.face(f);
        let i = slot
            .edges
            .iter()
            .position(|&d| d == e)
            .expect("edge not on face");
        rotate3(slot.verts, i)
    }

    /// CCW corner points of `f`.
    pub fn points_of_face(&self, f: FaceId) -> [Vector2<f64>; 3] {
        self.verts_of_face(f).map(|v| self.point_of_vertex(v))
    }

    /// CCW corner points of `f`, rotated so the first two are the endpoints
    /// of `e` in face order.
    pub fn points_of_face_from(&self, f: FaceId, e: EdgeId) -> [Vector2<f64>; 3] {
        self.verts_of_face_from(f, e).map(|v| self.point_of_vertex(v))
    }

    /// Front/back incident faces of `e`.
    pub fn faces_of_edge(&self, e: EdgeId) -> [Option<FaceId>; 2] {
        self.edge(e).faces
    }

    /// The face on the other side of `e` from `f`, if any.
    pub fn opposite_face(&self, e: EdgeId, f: FaceId) -> Option<FaceId> {
        let [a, b] = self.edge(e).faces;
        if a == Some(f) {
            b
        } else {
            a
        }
    }

    /// Endpoints of `e` in creation order.
    pub fn verts_of_edge(&self, e: EdgeId) -> [VertexId; 2] {
        self.edge(e).verts
    }

    /// Endpoints of `e` reordered so `v` comes last.
    pub fn verts_of_edge_from(&self, e: EdgeId, v: VertexId) -> [VertexId; 2] {
        let [a, b] = self.edge(e).verts;
        if a == v {
            [b, a]
        } else {
            [a, b]
        }
    }

    /// Endpoint coordinates of `e`.
    pub fn points_of_edge(&self, e: EdgeId) -> [Vector2<f64>; 2] {
        self.verts_of_edge(e).map(|v| self.point_of_vertex(v))
    }

    pub fn point_of_vertex(&self, v: VertexId) -> Vector2<f64> {
        debug_assert!(self.has_vertex(v));
        self.points[v.0].expect("stale vertex id")
    }

    /// Incident edges of `v` as an O(1) slice (unspecified order; creation
    /// order until a compaction or removal reshuffles the buffer tail).
    pub fn edges_of_vertex(&self, v: VertexId) -> &[EdgeId] {
        let VertSlot { start, end } = *self.vert(v);
        &self.vert_edge[start..end]
    }

    /// Faces incident to `v`, deduplicated, in reverse incidence-edge order.
    pub fn faces_of_vertex(&self, v: VertexId) -> Vec<FaceId> {
        let mut res = Vec::new();
        for &e in self.edges_of_vertex(v).iter().rev() {
            for f in self.edge(e).faces.into_iter().flatten() {
                if !res.contains(&f) {
                    res.push(f);
                }
            }
        }
        res
    }

    /// The edge connecting `v0` and `v1`, if one exists. O(degree of `v0`).
    pub fn edge_between(&self, v0: VertexId, v1: VertexId) -> Option<EdgeId> {
        self.edges_of_vertex(v0)
            .iter()
            .copied()
            .find(|&e| {
                let [a, b] = self.edge(e).verts;
                a == v1 || b == v1
            })
    }

    /// The live vertex whose point equals `p` within tolerance, if any. O(V).
    pub fn vertex_of_point(&self, p: Vector2<f64>) -> Option<VertexId> {
        self.points.iter().enumerate().find_map(|(i, slot)| {
            slot.and_then(|q| ((q - p).norm() < EPS).then_some(VertexId(i)))
        })
    }

    /// Flat display list: vertex-index triples of every live face.
    pub fn index_list(&self) -> Vec<usize> {
        let mut res = Vec::with_capacity(self.face_count() * 3);
        for slot in self.faces.iter().flatten() {
            res.extend(slot.verts.iter().map(|v| v.0));
        }
        res
    }

    // ──────────────────────── refinement mutations ──────────────────────────

    /// Replaces `f` with three faces fanning `point` (default: centroid) to
    /// each boundary vertex pair. Total area is preserved.
    pub fn subdivide_face(&mut self, f: FaceId, point: Option<Vector2<f64>>) -> FaceSubdivision {
        let [v0, v1, v2] = self.verts_of_face(f);
        let p = point.unwrap_or_else(|| {
            tri::centroid(
                self.point_of_vertex(v0),
                self.point_of_vertex(v1),
                self.point_of_vertex(v2),
            )
        });

        self.remove_face(f);
        let v3 = self.create_vertex(p);

        FaceSubdivision {
            vertex: v3,
            faces: [
                self.create_face(v0, v1, v3),
                self.create_face(v1, v2, v3),
                self.create_face(v2, v0, v3),
            ],
        }
    }

    /// Splits `e` at `point` (default: midpoint), replacing each of its 1–2
    /// incident faces with two. Total area is preserved.
    pub fn split_edge(&mut self, e: EdgeId, point: Option<Vector2<f64>>) -> EdgeSplit {
        let [fa, fb] = self.edge(e).faces;
        let p = point.unwrap_or_else(|| {
            let [p0, p1] = self.points_of_edge(e);
            (p0 + p1) * 0.5
        });

        let m = self.create_vertex(p);

        let replace = |mesh: &mut Self, f: Option<FaceId>| -> Option<[FaceId; 2]> {
            let f = f?;
            let [v0, v1, v2] = mesh.verts_of_face_from(f, e);
            mesh.remove_face(f);
            Some([mesh.create_face(v0, m, v2), mesh.create_face(m, v1, v2)])
        };

        let front = replace(self, fa);
        let back = replace(self, fb);

        EdgeSplit {
            vertex: m,
            front,
            back,
        }
    }

    /// Turns (flips) interior edge `e`: the two incident triangles are
    /// replaced by the two triangles on the quad's other diagonal.
    /// Precondition: `e` has exactly two incident faces and the quad is
    /// convex (guaranteed when the flip is Delaunay-driven).
    pub fn turn_edge(&mut self, e: EdgeId) -> EdgeTurn {
        let [fa, fb] = self.edge(e).faces;
        let f0 = fa.expect("turn_edge on boundary edge");
        let f1 = fb.expect("turn_edge on boundary edge");

        let [a0, a1, a2] = self.verts_of_face_from(f0, e);
        let b2 = self.verts_of_face_from(f1, e)[2];

        self.remove_face(f0);
        self.remove_face(f1);

        let n0 = self.create_face(b2, a2, a0);
        let n1 = self.create_face(a2, b2, a1);
        let edge = self
            .edge_between(a2, b2)
            .expect("flip must create the new diagonal");

        EdgeTurn {
            edge,
            faces: [n0, n1],
        }
    }

    /// Drops every vertex with no incident face.
    pub fn clear_isolated_vertices(&mut self) {
        let isolated: Vec<VertexId> = self
            .vertex_ids()
            .filter(|&v| self.edges_of_vertex(v).is_empty())
            .collect();
        for v in isolated {
            self.remove_vertex(v);
        }
    }

    // ──────────────────────────── whole-mesh ops ────────────────────────────

    /// Sum of live-face areas.
    pub fn area(&self) -> f64 {
        self.face_ids()
            .map(|f| {
                let [p0, p1, p2] = self.points_of_face(f);
                tri::area(p0, p1, p2)
            })
            .sum()
    }

    /// Area-weighted centroid; zero vector for an empty (or zero-area) mesh.
    pub fn centroid(&self) -> Vector2<f64> {
        let mut acc = Vector2::zeros();
        let mut total = 0.0;
        for f in self.face_ids() {
            let [p0, p1, p2] = self.points_of_face(f);
            let a = tri::area(p0, p1, p2);
            acc += tri::centroid(p0, p1, p2) * a;
            total += a;
        }
        if total > 0.0 {
            acc / total
        } else {
            Vector2::zeros()
        }
    }

    /// Applies `transform` to every live point in place.
    pub fn transform(&mut self, transform: &Aff2) {
        for p in self.points.iter_mut().flatten() {
            *p = transform.apply(*p);
        }
    }

    /// Linear-scan point location: first live face containing `q` with its
    /// barycentric coordinates. A test oracle — `SubdivisionTree::locate` is
    /// the sub-linear path.
    pub fn intersects_point(&self, q: Vector2<f64>) -> Option<(FaceId, (f64, f64))> {
        self.face_ids().find_map(|f| {
            let [p0, p1, p2] = self.points_of_face(f);
            tri::barycentric(p0, p1, p2, q).map(|uv| (f, uv))
        })
    }

    /// Pairwise triangle-overlap scan against `other`. O(F₁·F₂); intended
    /// for small meshes and tests.
    pub fn intersects(&self, other: &Mesh2) -> bool {
        self.face_ids().any(|f| {
            let [p0, p1, p2] = self.points_of_face(f);
            other.face_ids().any(|g| {
                let [q0, q1, q2] = other.points_of_face(g);
                geom2::tri_intersects_tri(p0, p1, p2, q0, q1, q2)
            })
        })
    }

    // ───────────────────────────── interchange ──────────────────────────────

    /// Encodes the live faces as the `{f, p}` record, deduplicating points in
    /// first-seen face order.
    pub fn to_json(&self) -> MeshJson {
        let mut map: HashMap<usize, u32> = HashMap::new();
        let mut f = Vec::with_capacity(self.face_count() * 3);
        let mut p = Vec::new();

        for slot in self.faces.iter().flatten() {
            for v in slot.verts {
                let next = (p.len() / 2) as u32;
                let index = *map.entry(v.0).or_insert_with(|| {
                    let q = self.points[v.0].expect("face references live vertex");
                    p.push(q.x);
                    p.push(q.y);
                    next
                });
                f.push(index);
            }
        }

        MeshJson { f, p }
    }

    /// Decodes a `{f, p}` record produced by [`Mesh2::to_json`] (or any
    /// well-formed source). The rebuilt mesh is isomorphic, not
    /// index-identical, to the encoder's.
    pub fn from_json(json: &MeshJson) -> Result<Self, JsonError> {
        if json.p.len() % 2 != 0 {
            return Err(JsonError::RaggedPoints(json.p.len()));
        }
        if json.f.len() % 3 != 0 {
            return Err(JsonError::RaggedFaces(json.f.len()));
        }

        let n_points = json.p.len() / 2;
        if let Some(&index) = json.f.iter().find(|&&i| i as usize >= n_points) {
            return Err(JsonError::IndexOutOfRange {
                index,
                points: n_points,
            });
        }

        let mut mesh = Self::new();
        let verts: Vec<VertexId> = json
            .p
            .chunks_exact(2)
            .map(|xy| mesh.create_vertex(Vector2::new(xy[0], xy[1])))
            .collect();
        for face in json.f.chunks_exact(3) {
            mesh.create_face(
                verts[face[0] as usize],
                verts[face[1] as usize],
                verts[face[2] as usize],
            );
        }

        Ok(mesh)
    }
}

#[inline]
fn rotate3<T: Copy>(xs: [T; 3], i: usize) -> [T; 3] {
    [xs[i], xs[(i + 1) % 3], xs[(i + 2) % 3]]
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::vector;

    /// Structural consistency: faces agree with their edges, edges with
    /// their endpoint incidence lists, incidence lists with their edges.
    fn check_consistency(mesh: &Mesh2) {
        for f in mesh.face_ids() {
            let edges = mesh.edges_of_face(f);
            let verts = mesh.verts_of_face(f);
            for i in 0..3 {
                let e = edges[i];
                assert!(mesh.has_edge(e), "face {f:?} references dead edge {e:?}");
                let ends = mesh.verts_of_edge(e);
                let (a, b) = (verts[i], verts[(i + 1) % 3]);
                assert!(
                    ends == [a, b] || ends == [b, a],
                    "edge {e:?} endpoints {ends:?} disagree with face {f:?} corner pair ({a:?},{b:?})"
                );
                assert!(
                    mesh.faces_of_edge(e).contains(&Some(f)),
                    "edge {e:?} does not record face {f:?}"
                );
            }
        }
        for e in mesh.edge_ids() {
            let faces = mesh.faces_of_edge(e);
            assert!(
                faces[0].is_some() || faces[1].is_some(),
                "edge {e:?} has no incident face"
            );
            for f in faces.into_iter().flatten() {
                assert!(mesh.has_face(f));
                assert!(mesh.edges_of_face(f).contains(&e));
            }
            for v in mesh.verts_of_edge(e) {
                assert!(
                    mesh.edges_of_vertex(v).contains(&e),
                    "vertex {v:?} incidence list misses edge {e:?}"
                );
            }
        }
        for v in mesh.vertex_ids() {
            for &e in mesh.edges_of_vertex(v) {
                assert!(mesh.has_edge(e));
                assert!(mesh.verts_of_edge(e).contains(&v));
            }
        }
    }

    fn square_mesh() -> (Mesh2, [VertexId; 4]) {
        // Unit square split along the a–c diagonal, both faces CCW.
        let mut mesh = Mesh2::new();
        let a = mesh.create_vertex(vector![0.0, 0.0]);
        let b = mesh.create_vertex(vector![1.0, 0.0]);
        let c = mesh.create_vertex(vector![1.0, 1.0]);
        let d = mesh.create_vertex(vector![0.0, 1.0]);
        mesh.create_face(a, b, c);
        mesh.create_face(a, c, d);
        (mesh, [a, b, c, d])
    }

    #[test]
    fn create_face_shares_edges() {
        let (mesh, [a, _, c, _]) = square_mesh();
        assert_eq!(mesh.face_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
        // 4 rim edges + 1 shared diagonal.
        assert_eq!(mesh.edge_count(), 5);
        let diag = mesh.edge_between(a, c).unwrap();
        let faces = mesh.faces_of_edge(diag);
        assert!(faces[0].is_some() && faces[1].is_some());
        check_consistency(&mesh);
    }

    #[test]
    fn remove_face_drops_faceless_edges() {
        let (mut mesh, [a, _, c, _]) = square_mesh();
        let diag = mesh.edge_between(a, c).unwrap();
        let f = mesh.faces_of_edge(diag)[0].unwrap();
        mesh.remove_face(f);
        assert_eq!(mesh.face_count(), 1);
        // The diagonal survives (one face left); the removed face's two rim
        // edges are gone.
        assert!(mesh.has_edge(diag));
        assert_eq!(mesh.edge_count(), 3);
        check_consistency(&mesh);
    }

    #[test]
    fn remove_vertex_cascades() {
        let (mut mesh, [a, b, _, _]) = square_mesh();
        mesh.remove_vertex(a);
        // Both faces touched `a`; everything but the far rim edge b–c–d is
        // torn down.
        assert_eq!(mesh.face_count(), 0);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.edge_count(), 0);
        assert!(!mesh.has_vertex(a));
        assert!(mesh.has_vertex(b));
        check_consistency(&mesh);
    }

    #[test]
    fn slot_recycling_reuses_indices() {
        let mut mesh = Mesh2::new();
        let a = mesh.create_vertex(vector![0.0, 0.0]);
        let b = mesh.create_vertex(vector![1.0, 0.0]);
        let c = mesh.create_vertex(vector![0.0, 1.0]);
        let f = mesh.create_face(a, b, c);
        mesh.remove_face(f);
        let f2 = mesh.create_face(a, b, c);
        assert_eq!(f, f2, "freed face slot should be recycled before growth");
        mesh.remove_vertex(c);
        let c2 = mesh.create_vertex(vector![2.0, 2.0]);
        assert_eq!(c, c2, "freed vertex slot should be recycled before growth");
    }

    #[test]
    fn subdivide_face_preserves_area() {
        let (mut mesh, _) = square_mesh();
        let area0 = mesh.area();
        let f = mesh.face_ids().next().unwrap();
        let sub = mesh.subdivide_face(f, None);
        assert_eq!(mesh.face_count(), 4);
        assert!(mesh.has_vertex(sub.vertex));
        assert_eq!(mesh.faces_of_vertex(sub.vertex).len(), 3);
        assert!((mesh.area() - area0).abs() < 1e-12);
        check_consistency(&mesh);
    }

    #[test]
    fn split_interior_edge_yields_four_faces() {
        let (mut mesh, [a, _, c, _]) = square_mesh();
        let area0 = mesh.area();
        let diag = mesh.edge_between(a, c).unwrap();
        let split = mesh.split_edge(diag, None);
        assert!(split.front.is_some() && split.back.is_some());
        assert_eq!(mesh.face_count(), 4);
        assert_eq!(mesh.faces_of_vertex(split.vertex).len(), 4);
        assert!((mesh.area() - area0).abs() < 1e-12);
        check_consistency(&mesh);
    }

    #[test]
    fn split_boundary_edge_yields_two_faces() {
        let (mut mesh, [a, b, _, _]) = square_mesh();
        let area0 = mesh.area();
        let rim = mesh.edge_between(a, b).unwrap();
        let split = mesh.split_edge(rim, None);
        assert!(split.front.is_some() ^ split.back.is_some());
        assert_eq!(mesh.face_count(), 3);
        assert!((mesh.area() - area0).abs() < 1e-12);
        check_consistency(&mesh);
    }

    #[test]
    fn turn_edge_connects_former_apexes() {
        let (mut mesh, [a, b, c, d]) = square_mesh();
        let area0 = mesh.area();
        let diag = mesh.edge_between(a, c).unwrap();
        let turn = mesh.turn_edge(diag);
        // The old apexes b and d become the new diagonal.
        let ends = mesh.verts_of_edge(turn.edge);
        assert!(ends == [b, d] || ends == [d, b]);
        assert!(mesh.edge_between(a, c).is_none());
        assert_eq!(mesh.face_count(), 2);
        assert!((mesh.area() - area0).abs() < 1e-12);
        // Both new faces stay CCW.
        for f in turn.faces {
            let [p0, p1, p2] = mesh.points_of_face(f);
            assert!(tri::signed_area(p0, p1, p2) > 0.0);
        }
        check_consistency(&mesh);
    }

    #[test]
    fn rotated_accessors() {
        let (mesh, [a, b, c, _]) = square_mesh();
        let f = mesh.faces_of_edge(mesh.edge_between(a, b).unwrap())[0].unwrap();
        assert_eq!(mesh.verts_of_face(f), [a, b, c]);
        assert_eq!(mesh.edges_of_face_from(f, b)[0], mesh.edge_between(b, c).unwrap());
        let e = mesh.edge_between(b, c).unwrap();
        assert_eq!(mesh.verts_of_face_from(f, e), [b, c, a]);
        assert_eq!(mesh.verts_of_edge_from(e, b)[1], b);
    }

    #[test]
    fn incidence_buffer_compaction_keeps_slices_valid() {
        // Enough churn to trip the 1/3 dirty threshold several times.
        let mut mesh = Mesh2::new();
        let hub = mesh.create_vertex(vector![0.0, 0.0]);
        let rim: Vec<VertexId> = (0..12)
            .map(|i| {
                let ang = std::f64::consts::TAU * i as f64 / 12.0;
                mesh.create_vertex(vector![ang.cos(), ang.sin()])
            })
            .collect();
        let faces: Vec<FaceId> = (0..12)
            .map(|i| mesh.create_face(rim[i], rim[(i + 1) % 12], hub))
            .collect();
        assert_eq!(mesh.edges_of_vertex(hub).len(), 12);
        check_consistency(&mesh);
        for f in faces.iter().step_by(2) {
            mesh.remove_face(*f);
        }
        assert_eq!(mesh.face_count(), 6);
        check_consistency(&mesh);
    }

    #[test]
    fn centroid_and_transform() {
        let (mut mesh, _) = square_mesh();
        assert!((mesh.centroid() - vector![0.5, 0.5]).norm() < 1e-12);
        let f = Aff2 {
            m: nalgebra::Matrix2::identity() * 2.0,
            t: vector![1.0, 0.0],
        };
        mesh.transform(&f);
        assert!((mesh.area() - 4.0).abs() < 1e-12);
        assert!((mesh.centroid() - vector![2.0, 1.0]).norm() < 1e-12);
    }

    #[test]
    fn point_location_oracle() {
        let (mesh, _) = square_mesh();
        let (f, (u, v)) = mesh.intersects_point(vector![0.9, 0.5]).unwrap();
        assert!(mesh.has_face(f));
        assert!(u >= 0.0 && v >= 0.0 && u + v <= 1.0);
        assert!(mesh.intersects_point(vector![2.0, 0.5]).is_none());
    }

    #[test]
    fn mesh_overlap_scan() {
        let (mesh, _) = square_mesh();
        let mut other = mesh.clone();
        other.transform(&Aff2 {
            m: nalgebra::Matrix2::identity(),
            t: vector![0.5, 0.5],
        });
        assert!(mesh.intersects(&other));
        other.transform(&Aff2 {
            m: nalgebra::Matrix2::identity(),
            t: vector![5.0, 0.0],
        });
        assert!(!mesh.intersects(&other));
    }

    #[test]
    fn clear_isolated_vertices_only_drops_orphans() {
        let (mut mesh, _) = square_mesh();
        mesh.create_vertex(vector![9.0, 9.0]);
        assert_eq!(mesh.vertex_count(), 5);
        mesh.clear_isolated_vertices();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
    }

    #[test]
    fn json_round_trip() {
        let (mut mesh, [a, _, c, _]) = square_mesh();
        // Edit first so free-lists are non-trivial before encoding.
        let diag = mesh.edge_between(a, c).unwrap();
        mesh.split_edge(diag, None);

        let json = mesh.to_json();
        assert_eq!(json.f.len(), mesh.face_count() * 3);
        let back = Mesh2::from_json(&json).unwrap();
        assert_eq!(back.face_count(), mesh.face_count());
        assert_eq!(back.vertex_count(), mesh.vertex_count());
        assert!((back.area() - mesh.area()).abs() < 1e-12);

        // And through actual wire text.
        let text = serde_json::to_string(&json).unwrap();
        let parsed: MeshJson = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, json);
    }

    #[test]
    fn json_rejects_malformed_records() {
        assert_eq!(
            Mesh2::from_json(&MeshJson {
                f: vec![],
                p: vec![0.0],
            })
            .err(),
            Some(JsonError::RaggedPoints(1))
        );
        assert_eq!(
            Mesh2::from_json(&MeshJson {
                f: vec![0, 1],
                p: vec![0.0, 0.0],
            })
            .err(),
            Some(JsonError::RaggedFaces(2))
        );
        assert_eq!(
            Mesh2::from_json(&MeshJson {
                f: vec![0, 1, 7],
                p: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            })
            .err(),
            Some(JsonError::IndexOutOfRange {
                index: 7,
                points: 3
            })
        );
    }

    #[test]
    fn from_points_strips_bounding_artifacts() {
        let mesh = Mesh2::from_points(&[
            vector![0.0, 0.0],
            vector![1.0, 0.0],
            vector![1.0, 1.0],
            vector![0.0, 1.0],
        ]);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
        assert!((mesh.area() - 1.0).abs() < 1e-9);
        check_consistency(&mesh);
    }

    #[test]
    fn from_outline_keeps_interior_only() {
        let outline = [
            vector![0.0, 0.0],
            vector![1.0, 1.0],
            vector![0.0, 0.5],
            vector![-1.0, 1.0],
            vector![0.0, 0.0],
        ];
        let mesh = Mesh2::from_outline(&outline);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.edge_count(), 5);
        assert_eq!(mesh.face_count(), 2);
        check_consistency(&mesh);
    }
}
