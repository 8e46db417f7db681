//! Incremental Delaunay subdivision over a bounding triangle.
//!
//! Purpose
//! - Wrap a [`Mesh2`] seeded with one bounding triangle, insert points one at
//!   a time with sub-linear point location, and keep the triangulation
//!   Delaunay by Lawson edge flips after every insertion.
//! - Constrain the result to a closed outline (`intersect_outline`) and
//!   export the visible interior (`snapshot`).
//!
//! Why this design
//! - Point location uses an append-only history tree instead of walking the
//!   mesh: every refinement replaces one leaf (or two, for an edge split or
//!   flip) with internal nodes whose children are the replacement faces.
//!   Nodes store their corner points at creation time, so a dead face's
//!   geometry keeps routing descent even after its arena slot is recycled.
//!   Expected depth is O(log n) for random insertion order.
//! - Immutability/validity marks live in dense `u8` tables indexed by arena
//!   slot, not on the mesh entities, because they are engine policy (what
//!   refinement may touch, what the snapshot keeps) rather than topology.

use std::collections::HashMap;

use nalgebra::Vector2;

use crate::geom2::{self, tri, BARY_EPS};
use crate::mesh2::{EdgeId, FaceId, Mesh2, VertexId};

mod flags {
    /// Refinement must not subdivide or flip into this face.
    pub const FACE_IMMUTABLE: u8 = 0b01;
    /// Face is outside the constrained outline; dropped by `snapshot`.
    pub const FACE_INVALID: u8 = 0b10;
    /// Constrained edge: never split, never flipped.
    pub const EDGE_IMMUTABLE: u8 = 0b1;
    /// Bounding-triangle vertex; dropped (with its faces) by `snapshot`.
    pub const VERT_INVALID: u8 = 0b1;
}

/// Node of the point-location tree. Corners are frozen at creation; they
/// equal the face's corners for a leaf and the dead parent face's corners
/// for an internal node.
#[derive(Clone, Debug)]
struct Node {
    corners: [Vector2<f64>; 3],
    kind: NodeKind,
}

#[derive(Clone, Debug)]
enum NodeKind {
    Leaf(FaceId),
    /// Replacement faces; a flip and an edge split produce two children, a
    /// face subdivision three.
    Internal([Option<usize>; 3]),
}

/// How an inserted point relates to the leaf triangle it landed in: an exact
/// corner duplicate, within the [`BARY_EPS`] band of an edge, or strictly
/// interior.
enum Landing {
    Corner(usize),
    Edge(usize),
    Interior,
}

/// Incremental Delaunay triangulation engine.
#[derive(Clone, Debug)]
pub struct SubdivisionTree {
    mesh: Mesh2,
    nodes: Vec<Node>,
    /// Leaf node of each live face.
    leaf_of_face: HashMap<FaceId, usize>,
    face_flags: Vec<u8>,
    edge_flags: Vec<u8>,
    vert_flags: Vec<u8>,
}

impl SubdivisionTree {
    /// Engine over a single CCW bounding triangle. Its three vertices are
    /// marked invalid so `snapshot` strips them and every face they touch.
    pub fn new(bound: [Vector2<f64>; 3]) -> Self {
        let mut mesh = Mesh2::new();
        let verts = bound.map(|p| mesh.create_vertex(p));
        let face = mesh.create_face(verts[0], verts[1], verts[2]);

        let mut tree = Self {
            mesh,
            nodes: vec![Node {
                corners: bound,
                kind: NodeKind::Leaf(face),
            }],
            leaf_of_face: HashMap::from([(face, 0)]),
            face_flags: Vec::new(),
            edge_flags: Vec::new(),
            vert_flags: Vec::new(),
        };
        for v in verts {
            set_flag(&mut tree.vert_flags, v.0, flags::VERT_INVALID);
        }
        tree
    }

    /// Engine whose bounding triangle comfortably contains `points`. `None`
    /// for an empty slice.
    pub fn around(points: &[Vector2<f64>]) -> Option<Self> {
        let (center, half) = geom2::aabb(points)?;
        let r = (half.norm() * 4.0).max(1.0);
        Some(Self::new(tri::equilateral(center, r, 0.0)))
    }

    /// The triangulation as built so far, bounding artifacts included.
    pub fn mesh(&self) -> &Mesh2 {
        &self.mesh
    }

    pub fn is_face_immutable(&self, f: FaceId) -> bool {
        has_flag(&self.face_flags, f.0, flags::FACE_IMMUTABLE)
    }

    pub fn is_edge_immutable(&self, e: EdgeId) -> bool {
        has_flag(&self.edge_flags, e.0, flags::EDGE_IMMUTABLE)
    }

    // ───────────────────────────── location ─────────────────────────────────

    /// Locates the live face containing `q` via tree descent, together with
    /// `q`'s barycentric coordinates in that face. `None` when `q` lies
    /// outside the bounding triangle.
    pub fn locate(&self, q: Vector2<f64>) -> Option<(FaceId, (f64, f64))> {
        // Strict containment at the root. The slack below exists to route
        // across eps cracks between sibling triangles, not to admit points
        // outside the bound.
        let [r0, r1, r2] = self.nodes[0].corners;
        tri::barycentric(r0, r1, r2, q)?;

        let mut stack = vec![0usize];
        // Track the least-bad boundary leaf so points that fall in the eps
        // crack between sibling triangles still resolve.
        let mut best: Option<(FaceId, (f64, f64), f64)> = None;

        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            let [p0, p1, p2] = node.corners;
            let Some((u, v)) = tri::barycentric_eps(p0, p1, p2, q, BARY_EPS) else {
                continue;
            };
            match node.kind {
                NodeKind::Leaf(face) => {
                    let margin = u.min(v).min(1.0 - u - v);
                    if margin >= 0.0 {
                        return Some((face, (u, v)));
                    }
                    if best.is_none() || margin > best.as_ref().unwrap().2 {
                        best = Some((face, (u, v), margin));
                    }
                }
                NodeKind::Internal(children) => {
                    stack.extend(children.into_iter().flatten());
                }
            }
        }

        best.map(|(face, uv, _)| (face, uv))
    }

    fn classify(u: f64, v: f64) -> Landing {
        // Exact corner hits first: the quotients are single-rounding, so a
        // query bit-equal to a corner lands on these equalities exactly.
        // Near-corner points are not merged; they fall into an edge band
        // and get inserted by splitting. Weights: p0 = 1-u-v, p1 = v,
        // p2 = u.
        if u + v == 0.0 {
            Landing::Corner(0)
        } else if v == 1.0 {
            Landing::Corner(1)
        } else if u == 1.0 {
            Landing::Corner(2)
        } else if u < BARY_EPS {
            // Edge p0→p1 is the face's edge 0.
            Landing::Edge(0)
        } else if u + v > 1.0 - BARY_EPS {
            Landing::Edge(1)
        } else if v < BARY_EPS {
            Landing::Edge(2)
        } else {
            Landing::Interior
        }
    }

    // ─────────────────────────── tree maintenance ───────────────────────────

    /// Replaces the leaf of a (now removed) face with an internal node whose
    /// children are fresh leaves for `children` faces.
    fn branch(&mut self, parent_face: FaceId, children: &[FaceId]) {
        let parent = self
            .leaf_of_face
            .remove(&parent_face)
            .expect("branch parent must be a live leaf");

        let mut slots = [None, None, None];
        for (slot, &face) in slots.iter_mut().zip(children) {
            let node = self.nodes.len();
            self.nodes.push(Node {
                corners: self.mesh.points_of_face(face),
                kind: NodeKind::Leaf(face),
            });
            self.leaf_of_face.insert(face, node);
            // The arena may hand a child the parent's recycled slot; any
            // stale mark on it belongs to the dead face.
            clear_flag_slot(&mut self.face_flags, face.0);
            *slot = Some(node);
        }
        self.nodes[parent].kind = NodeKind::Internal(slots);
    }

    // ───────────────────────────── insertion ────────────────────────────────

    /// Inserts `q` into the triangulation and restores the Delaunay property
    /// around it. Returns the vertex now carrying `q`: a fresh one, or the
    /// existing vertex when `q` coincides exactly with a corner. `None` when
    /// the point is outside the bound, lands in or on an immutable region,
    /// or its leaf triangle is degenerate.
    pub fn add_point(&mut self, q: Vector2<f64>) -> Option<VertexId> {
        let (face, (u, v)) = self.locate(q)?;
        if self.is_face_immutable(face) {
            return None;
        }

        let verts = self.mesh.verts_of_face(face);
        let edges = self.mesh.edges_of_face(face);

        let mut repair: Vec<(FaceId, EdgeId)> = Vec::new();
        let vertex = match Self::classify(u, v) {
            Landing::Corner(i) => return Some(verts[i]),
            Landing::Edge(i) => {
                let edge = edges[i];
                if self.is_edge_immutable(edge) {
                    return None;
                }
                let [front_face, back_face] = self.mesh.faces_of_edge(edge);
                if let Some(other) = self.mesh.opposite_face(edge, face) {
                    if self.is_face_immutable(other) {
                        return None;
                    }
                }

                let split = self.mesh.split_edge(edge, Some(q));
                self.clear_new_edge_flags(split.vertex);
                for (parent, pair) in [front_face.zip(split.front), back_face.zip(split.back)]
                    .into_iter()
                    .flatten()
                {
                    self.branch(parent, &pair);
                    for f in pair {
                        repair.extend(self.mesh.edges_of_face(f).map(|e| (f, e)));
                    }
                }
                split.vertex
            }
            Landing::Interior => {
                let sub = self.mesh.subdivide_face(face, Some(q));
                self.clear_new_edge_flags(sub.vertex);
                self.branch(face, &sub.faces);
                for f in sub.faces {
                    repair.extend(self.mesh.edges_of_face(f).map(|e| (f, e)));
                }
                sub.vertex
            }
        };

        self.repair(repair);
        Some(vertex)
    }

    /// Inserts each point in order; no-op insertions are skipped silently.
    pub fn add_points(&mut self, points: &[Vector2<f64>]) {
        for &q in points {
            self.add_point(q);
        }
    }

    /// Edges of a freshly inserted vertex occupy fresh or recycled arena
    /// slots; a recycled slot may still carry a dead edge's constraint bit.
    fn clear_new_edge_flags(&mut self, v: VertexId) {
        for &e in self.mesh.edges_of_vertex(v) {
            clear_flag_slot(&mut self.edge_flags, e.0);
        }
    }

    /// Lawson flip repair: each work item is a candidate edge with the face
    /// to test it from. Insertion seeds every edge of every replacement
    /// face (a split point can sit slightly off its edge, so even the new
    /// spokes and halves may be non-Delaunay); a flip retires both incident
    /// faces and requeues the quad's four outer edges. The budget caps
    /// pathological cascades; on Delaunay-consistent input the loop drains
    /// long before hitting it.
    fn repair(&mut self, mut work: Vec<(FaceId, EdgeId)>) {
        let mut budget = 4 * self.mesh.face_count() + 64;

        while let Some((face, edge)) = work.pop() {
            if budget == 0 {
                break;
            }
            budget -= 1;

            // Items go stale when a neighboring flip retires their face, and
            // arena recycling can re-issue the id, so membership is the only
            // reliable liveness test.
            if !self.mesh.has_face(face)
                || !self.mesh.has_edge(edge)
                || !self.mesh.edges_of_face(face).contains(&edge)
            {
                continue;
            }
            if self.is_edge_immutable(edge) {
                continue;
            }
            let Some(other) = self.mesh.opposite_face(edge, face) else {
                continue;
            };
            if self.is_face_immutable(other) {
                continue;
            }

            let [p0, p1, p2] = self.mesh.points_of_face_from(face, edge);
            let far = self.mesh.verts_of_face_from(other, edge)[2];
            if !tri::in_circumcircle(p0, p1, p2, self.mesh.point_of_vertex(far)) {
                continue;
            }

            // Both parent entries must leave the map before the children go
            // in: a replacement face can recycle either retired id, and each
            // new triangle overlaps both parents, so both internal nodes
            // point at the same two leaves.
            let parent_a = self
                .leaf_of_face
                .remove(&face)
                .expect("flip face must be a live leaf");
            let parent_b = self
                .leaf_of_face
                .remove(&other)
                .expect("flip neighbor must be a live leaf");

            let turn = self.mesh.turn_edge(edge);
            clear_flag_slot(&mut self.edge_flags, turn.edge.0);
            let mut children = [None, None, None];
            for (slot, &f) in children.iter_mut().zip(&turn.faces) {
                let node = self.nodes.len();
                self.nodes.push(Node {
                    corners: self.mesh.points_of_face(f),
                    kind: NodeKind::Leaf(f),
                });
                self.leaf_of_face.insert(f, node);
                clear_flag_slot(&mut self.face_flags, f.0);
                *slot = Some(node);
            }
            self.nodes[parent_a].kind = NodeKind::Internal(children);
            self.nodes[parent_b].kind = NodeKind::Internal(children);

            // Only the quad's outer edges can have turned non-Delaunay.
            for f in turn.faces {
                for e in self.mesh.edges_of_face(f) {
                    if e != turn.edge {
                        work.push((f, e));
                    }
                }
            }
        }
    }

    // ──────────────────────────── constraints ───────────────────────────────

    /// Constrains the triangulation to the closed `outline` (last point may
    /// repeat the first): inserts its points, marks the edges between
    /// consecutive outline vertices immutable, and marks every face whose
    /// centroid falls outside the outline immutable and invalid.
    ///
    /// Points are inserted in reverse order, matching the outline's winding
    /// against the insertion fan so constraint edges materialize directly.
    pub fn intersect_outline(&mut self, outline: &[Vector2<f64>]) {
        let mut ring: Vec<Option<VertexId>> = vec![None; outline.len()];
        for i in (0..outline.len()).rev() {
            ring[i] = self.add_point(outline[i]);
        }

        let n = outline.len();
        for i in 0..n {
            let (Some(a), Some(b)) = (ring[i], ring[(i + 1) % n]) else {
                continue;
            };
            if a == b {
                continue;
            }
            if let Some(e) = self.mesh.edge_between(a, b) {
                set_flag(&mut self.edge_flags, e.0, flags::EDGE_IMMUTABLE);
            }
        }

        let faces: Vec<FaceId> = self.mesh.face_ids().collect();
        for f in faces {
            let [p0, p1, p2] = self.mesh.points_of_face(f);
            if !geom2::outline_contains(outline, tri::centroid(p0, p1, p2)) {
                set_flag(
                    &mut self.face_flags,
                    f.0,
                    flags::FACE_IMMUTABLE | flags::FACE_INVALID,
                );
            }
        }
    }

    // ────────────────────────────── export ──────────────────────────────────

    /// The visible triangulation: a mesh copy with invalid faces removed,
    /// bounding vertices removed (cascading through their faces), and any
    /// vertices thereby isolated dropped.
    pub fn snapshot(&self) -> Mesh2 {
        let mut mesh = self.mesh.clone();

        let invalid_faces: Vec<FaceId> = mesh
            .face_ids()
            .filter(|f| has_flag(&self.face_flags, f.0, flags::FACE_INVALID))
            .collect();
        for f in invalid_faces {
            mesh.remove_face(f);
        }

        let invalid_verts: Vec<VertexId> = mesh
            .vertex_ids()
            .filter(|v| has_flag(&self.vert_flags, v.0, flags::VERT_INVALID))
            .collect();
        for v in invalid_verts {
            mesh.remove_vertex(v);
        }

        mesh.clear_isolated_vertices();
        mesh
    }
}

fn set_flag(table: &mut Vec<u8>, i: usize, bits: u8) {
    if table.len() <= i {
        table.resize(i + 1, 0);
    }
    table[i] |= bits;
}

fn has_flag(table: &[u8], i: usize, bits: u8) -> bool {
    table.get(i).is_some_and(|&f| f & bits != 0)
}

fn clear_flag_slot(table: &mut [u8], i: usize) {
    if let Some(slot) = table.get_mut(i) {
        *slot = 0;
    }
}
