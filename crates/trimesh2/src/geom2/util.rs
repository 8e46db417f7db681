//! Segment, triangle-overlap and outline predicates plus the AABB helper
//! used to size bounding triangles.

use nalgebra::Vector2;

use super::tri;

#[inline]
fn cross2(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// True when segment `(p0,p1)` intersects segment `(q0,q1)` (closed test;
/// touching endpoints count).
pub fn intersect_segments(
    p0: Vector2<f64>,
    p1: Vector2<f64>,
    q0: Vector2<f64>,
    q1: Vector2<f64>,
) -> bool {
    let va = p1 - p0;
    let vb = q0 - q1;
    let vc = p0 - q0;

    let d = cross2(vb, va);
    let a = cross2(vc, vb);

    if (d > 0.0 && (a < 0.0 || a > d)) || (d <= 0.0 && (a > 0.0 || a < d)) {
        return false;
    }

    let b = cross2(va, vc);

    if (d > 0.0 && (b < 0.0 || b > d)) || (d <= 0.0 && (b > 0.0 || b < d)) {
        return false;
    }

    true
}

/// True when triangles `(p0,p1,p2)` and `(q0,q1,q2)` overlap: any pair of
/// edges intersects, or one triangle contains a corner of the other.
pub fn tri_intersects_tri(
    p0: Vector2<f64>,
    p1: Vector2<f64>,
    p2: Vector2<f64>,
    q0: Vector2<f64>,
    q1: Vector2<f64>,
    q2: Vector2<f64>,
) -> bool {
    let pe = [(p0, p1), (p1, p2), (p2, p0)];
    let qe = [(q0, q1), (q1, q2), (q2, q0)];

    for &(a0, a1) in &pe {
        for &(b0, b1) in &qe {
            if intersect_segments(a0, a1, b0, b1) {
                return true;
            }
        }
    }

    tri::barycentric(p0, p1, p2, q0).is_some() || tri::barycentric(q0, q1, q2, p0).is_some()
}

/// Even-odd (crossing-number) containment of `q` in the closed outline given
/// by `points`. Works whether or not the first point is repeated at the end;
/// the ring is closed implicitly.
pub fn outline_contains(points: &[Vector2<f64>], q: Vector2<f64>) -> bool {
    if points.len() < 3 {
        return false;
    }

    let mut inside = false;
    let n = points.len();

    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];

        if (a.y > q.y) != (b.y > q.y) {
            let x_cross = a.x + (q.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if q.x < x_cross {
                inside = !inside;
            }
        }
    }

    inside
}

/// Axis-aligned bounding box of `points` as `(center, half_extent)`;
/// `None` for an empty slice.
pub fn aabb(points: &[Vector2<f64>]) -> Option<(Vector2<f64>, Vector2<f64>)> {
    let first = *points.first()?;
    let mut min = first;
    let mut max = first;

    for p in &points[1..] {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }

    Some(((min + max) * 0.5, (max - min) * 0.5))
}
