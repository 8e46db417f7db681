//! Triangle scalar math: area, centroid, circumcenter, barycentric
//! containment, and the incircle determinant used by the Delaunay test.

use nalgebra::Vector2;

use super::types::INCIRCLE_EPS;

/// 2D cross product (scalar `z` of the 3D cross) of `b-a` and `c-a`.
#[inline]
pub fn cross(a: Vector2<f64>, b: Vector2<f64>, c: Vector2<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    ab.x * ac.y - ab.y * ac.x
}

/// Signed area of triangle `(p0,p1,p2)`; positive for CCW winding.
#[inline]
pub fn signed_area(p0: Vector2<f64>, p1: Vector2<f64>, p2: Vector2<f64>) -> f64 {
    0.5 * cross(p0, p1, p2)
}

/// Unsigned area `(1/2)|AB × AC|`.
#[inline]
pub fn area(p0: Vector2<f64>, p1: Vector2<f64>, p2: Vector2<f64>) -> f64 {
    signed_area(p0, p1, p2).abs()
}

#[inline]
pub fn centroid(p0: Vector2<f64>, p1: Vector2<f64>, p2: Vector2<f64>) -> Vector2<f64> {
    (p0 + p1 + p2) / 3.0
}

/// Circumcenter of `(p0,p1,p2)`; undefined (non-finite) for collinear input.
pub fn circumcenter(p0: Vector2<f64>, p1: Vector2<f64>, p2: Vector2<f64>) -> Vector2<f64> {
    let m0 = p0.norm_squared();
    let m1 = p1.norm_squared();
    let m2 = p2.norm_squared();

    let s01 = p0.y - p1.y;
    let s12 = p1.y - p2.y;
    let s20 = p2.y - p0.y;

    let d = 1.0 / (2.0 * (p0.x * s12 + p1.x * s20 + p2.x * s01));

    let x = (m0 * s12 + m1 * s20 + m2 * s01) * d;
    let y = (m0 * (p2.x - p1.x) + m1 * (p0.x - p2.x) + m2 * (p1.x - p0.x)) * d;

    Vector2::new(x, y)
}

/// Barycentric containment test: `Some((u, v))` iff `q` lies in the closed
/// triangle `(p0,p1,p2)`, with `u` the `p0→p2` component and `v` the `p0→p1`
/// component (so `u+v ≤ 1` on the far edge `p1p2`).
///
/// `u` and `v` are single-rounding quotients: a query bit-identical to a
/// corner yields exactly `(0,0)`, `(0,1)` or `(1,0)`, which is what lets the
/// subdivision engine classify duplicate insertions as exact no-ops.
/// Degenerate (zero-area) triangles return `None`.
pub fn barycentric(
    p0: Vector2<f64>,
    p1: Vector2<f64>,
    p2: Vector2<f64>,
    q: Vector2<f64>,
) -> Option<(f64, f64)> {
    barycentric_eps(p0, p1, p2, q, 0.0)
}

/// [`barycentric`] with a containment slack: accepts points up to `eps`
/// outside in barycentric units. The quotients themselves are unchanged, so
/// exact-corner results stay exact.
pub fn barycentric_eps(
    p0: Vector2<f64>,
    p1: Vector2<f64>,
    p2: Vector2<f64>,
    q: Vector2<f64>,
    eps: f64,
) -> Option<(f64, f64)> {
    let va = p2 - p0;
    let vb = p1 - p0;
    let vc = q - p0;

    let aa = va.dot(&va);
    let ab = va.dot(&vb);
    let ac = va.dot(&vc);
    let bb = vb.dot(&vb);
    let bc = vb.dot(&vc);

    let den = aa * bb - ab * ab;
    if !(den > 0.0) {
        return None;
    }

    let u = (bb * ac - ab * bc) / den;
    let v = (aa * bc - ab * ac) / den;

    if u < -eps || v < -eps || u + v > 1.0 + eps {
        return None;
    }

    Some((u, v))
}

/// True when `q` lies strictly inside the circumcircle of the CCW triangle
/// `(p0,p1,p2)`: the lifted-paraboloid 3×3 determinant, guarded by
/// `INCIRCLE_EPS` so cocircular points test as outside.
pub fn in_circumcircle(
    p0: Vector2<f64>,
    p1: Vector2<f64>,
    p2: Vector2<f64>,
    q: Vector2<f64>,
) -> bool {
    let qq = q.norm_squared();

    let a = p0.x - q.x;
    let b = p0.y - q.y;
    let c = p0.norm_squared() - qq;
    let d = p1.x - q.x;
    let e = p1.y - q.y;
    let f = p1.norm_squared() - qq;
    let g = p2.x - q.x;
    let h = p2.y - q.y;
    let i = p2.norm_squared() - qq;

    let det = a * (e * i - f * h) - b * (d * i - f * g) + c * (d * h - e * g);

    det > INCIRCLE_EPS
}

/// Corners of the CCW equilateral triangle with circumradius `r` around
/// `center`, rotated by `rad`.
pub fn equilateral(center: Vector2<f64>, r: f64, rad: f64) -> [Vector2<f64>; 3] {
    let third = std::f64::consts::TAU / 3.0;
    let corner = |ang: f64| center + Vector2::new(r * ang.cos(), r * ang.sin());
    [corner(rad), corner(rad + third), corner(rad + 2.0 * third)]
}
