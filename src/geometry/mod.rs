//! Geometric primitives shared by the tetrahedralizer and the softbody solver.
//!
//! Volume sign, the quality metric, the canonical face/edge tables and
//! barycentric reconstruction all live here because both subsystems need
//! byte-identical answers from them (the tetrahedralizer's quality filter and
//! the simulator's rest-volume bookkeeping must agree on what "volume" means).

use nalgebra::{Point3, Vector3};

/// Canonical face winding table: `TET_FACES[k]` lists the three local vertex
/// indices of face `k`, ordered so the face normal points outward for a
/// positively-oriented tet. Part of this crate's public layout contract.
pub const TET_FACES: [[usize; 3]; 4] = [[2, 1, 0], [0, 1, 3], [1, 2, 3], [2, 0, 3]];

/// Canonical edge table: the six unordered local-vertex pairs of a tet.
pub const TET_EDGES: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];

/// Signed volume of the tetrahedron `(p0, p1, p2, p3)`.
///
/// Positive for the canonical winding used throughout this crate; negative
/// indicates an inverted tet.
#[inline]
pub fn signed_volume(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>, p3: &Point3<f64>) -> f64 {
    (p1 - p0).dot(&(p2 - p0).cross(&(p3 - p0))) / 6.0
}

/// Circumcentre of a tetrahedron, via the standard linear-system solution.
///
/// Returns `None` if the tet is degenerate (near-zero volume), in which case
/// no finite circumsphere exists.
pub fn circumcenter(
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    p3: &Point3<f64>,
) -> Option<Point3<f64>> {
    let a = p1 - p0;
    let b = p2 - p0;
    let c = p3 - p0;

    let m = nalgebra::Matrix3::from_rows(&[a.transpose(), b.transpose(), c.transpose()]);
    let det = m.determinant();
    if det.abs() < 1e-10 {
        return None;
    }

    let rhs = Vector3::new(
        a.dot(&a) * 0.5,
        b.dot(&b) * 0.5,
        c.dot(&c) * 0.5,
    );
    let sol = m.try_inverse()? * rhs;
    Some(p0 + sol)
}

/// Tet quality `Q = 12·V / (sqrt(2)·rms^3)`, where `rms` is the root-mean-
/// square edge length over the six edges. `Q == 1` for a regular tet, `Q < 0`
/// signals an inverted orientation, `Q == 0` a degenerate (flat) tet.
pub fn quality(p0: &Point3<f64>, p1: &Point3<f64>, p2: &Point3<f64>, p3: &Point3<f64>) -> f64 {
    let pts = [p0, p1, p2, p3];
    let mut sum_sq = 0.0;
    for &[i, j] in &TET_EDGES {
        sum_sq += (pts[i] - pts[j]).norm_squared();
    }
    let rms = (sum_sq / 6.0).sqrt();
    if rms <= 0.0 {
        return 0.0;
    }
    let v = signed_volume(p0, p1, p2, p3);
    12.0 * v / (std::f64::consts::SQRT_2 * rms.powi(3))
}

/// Barycentric coordinates of `p` with respect to tet `(p0, p1, p2, p3)`.
///
/// Returns `(b0, b1, b2, b3)` with `b0 + b1 + b2 + b3 == 1`. The caller
/// typically stores only `(b1, b2, b3)` and reconstructs `b0` implicitly (see
/// [`crate::model`]).
pub fn barycentric(
    p: &Point3<f64>,
    p0: &Point3<f64>,
    p1: &Point3<f64>,
    p2: &Point3<f64>,
    p3: &Point3<f64>,
) -> (f64, f64, f64, f64) {
    let v0 = p1 - p0;
    let v1 = p2 - p0;
    let v2 = p3 - p0;
    let vp = p - p0;

    let m = nalgebra::Matrix3::from_columns(&[v0, v1, v2]);
    let Some(inv) = m.try_inverse() else {
        return (1.0, 0.0, 0.0, 0.0);
    };
    let sol = inv * vp;
    let (b1, b2, b3) = (sol.x, sol.y, sol.z);
    (1.0 - b1 - b2 - b3, b1, b2, b3)
}

/// Characteristic radius of a tet given its volume, `r = cbrt(3V / (4*pi))`.
///
/// Used by the simulator to size broadphase collision spheres.
#[inline]
pub fn characteristic_radius(volume: f64) -> f64 {
    (3.0 * volume.abs() / (4.0 * std::f64::consts::PI)).cbrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular_tet() -> [Point3<f64>; 4] {
        // Unit edge-length regular tetrahedron.
        [
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
        ]
    }

    #[test]
    fn regular_tet_has_unit_quality() {
        let [p0, p1, p2, p3] = regular_tet();
        let q = quality(&p0, &p1, &p2, &p3);
        assert!((q.abs() - 1.0).abs() < 1e-9, "expected |Q| == 1, got {q}");
    }

    #[test]
    fn degenerate_tet_has_zero_quality() {
        let p0 = Point3::new(0.0, 0.0, 0.0);
        let p1 = Point3::new(1.0, 0.0, 0.0);
        let p2 = Point3::new(2.0, 0.0, 0.0);
        let p3 = Point3::new(3.0, 0.0, 0.0);
        assert_eq!(quality(&p0, &p1, &p2, &p3), 0.0);
    }

    #[test]
    fn barycentric_reconstructs_point() {
        let [p0, p1, p2, p3] = regular_tet();
        let target = p0 + (p1 - p0) * 0.2 + (p2 - p0) * 0.3 + (p3 - p0) * 0.1;
        let (b0, b1, b2, b3) = barycentric(&target, &p0, &p1, &p2, &p3);
        let reconstructed = p0.coords * b0 + p1.coords * b1 + p2.coords * b2 + p3.coords * b3;
        assert!((reconstructed - target.coords).norm() < 1e-9);
    }

    #[test]
    fn circumcenter_is_equidistant() {
        let [p0, p1, p2, p3] = regular_tet();
        let c = circumcenter(&p0, &p1, &p2, &p3).unwrap();
        let d0 = (c - p0).norm();
        let d1 = (c - p1).norm();
        let d2 = (c - p2).norm();
        let d3 = (c - p3).norm();
        assert!((d0 - d1).abs() < 1e-9);
        assert!((d0 - d2).abs() < 1e-9);
        assert!((d0 - d3).abs() < 1e-9);
    }
}
