//! Geometric predicates abstraction.
//!
//! With feature `geogram` (default): uses [geogram_predicates] (FFI to C++ geogram).
//!
//! With feature `robust-predicates`: uses the pure-Rust [robust] crate instead — useful on
//! targets where linking the geogram C++ library is inconvenient.
//!
//! Only unweighted orientation and in-sphere tests are needed: the tetrahedralizer builds an
//! unweighted Delaunay mesh, it never lifts points onto a paraboloid for a power diagram.

#![allow(non_snake_case)]

use nalgebra::Point3;

#[cfg(not(any(feature = "geogram", feature = "robust-predicates")))]
compile_error!(
    "Exactly one of features 'geogram' or 'robust-predicates' must be enabled. Default is 'geogram'."
);

#[cfg(all(feature = "geogram", feature = "robust-predicates"))]
compile_error!("Features 'geogram' and 'robust-predicates' are mutually exclusive.");

/// Normalize a predicate result to sign: -1.0, 0.0, or 1.0.
#[cfg(feature = "robust-predicates")]
#[inline]
fn sign_f64(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

#[cfg(feature = "geogram")]
mod imp {
    use super::*;
    use geogram_predicates as gp;

    #[inline]
    pub fn orient_3d(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
        let r = gp::orient_3d(&to_arr(a), &to_arr(b), &to_arr(c), &to_arr(d));
        if r > 0i16 {
            1.0
        } else if r < 0i16 {
            -1.0
        } else {
            0.0
        }
    }

    #[inline]
    pub fn in_sphere_3d(
        a: &Point3<f64>,
        b: &Point3<f64>,
        c: &Point3<f64>,
        d: &Point3<f64>,
        p: &Point3<f64>,
    ) -> f64 {
        // geogram's in-sphere sign is inverted relative to robust's for the
        // same cases; negate to match.
        let r = -gp::in_sphere_3d_SOS(&to_arr(a), &to_arr(b), &to_arr(c), &to_arr(d), &to_arr(p));
        if r > 0i16 {
            1.0
        } else if r < 0i16 {
            -1.0
        } else {
            0.0
        }
    }

    #[inline]
    fn to_arr(p: &Point3<f64>) -> [f64; 3] {
        [p.x, p.y, p.z]
    }
}

#[cfg(feature = "robust-predicates")]
mod imp {
    use super::*;
    use robust::{Coord3D, insphere, orient3d};

    #[inline]
    fn coord3(p: &Point3<f64>) -> Coord3D<f64> {
        Coord3D {
            x: p.x,
            y: p.y,
            z: p.z,
        }
    }

    #[inline]
    pub fn orient_3d(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
        sign_f64(orient3d(coord3(a), coord3(b), coord3(c), coord3(d)))
    }

    #[inline]
    pub fn in_sphere_3d(
        a: &Point3<f64>,
        b: &Point3<f64>,
        c: &Point3<f64>,
        d: &Point3<f64>,
        p: &Point3<f64>,
    ) -> f64 {
        sign_f64(insphere(
            coord3(a),
            coord3(b),
            coord3(c),
            coord3(d),
            coord3(p),
        ))
    }
}

pub use imp::{in_sphere_3d, orient_3d};

#[cfg(test)]
mod tests {
    use super::*;

    /// A positively-oriented regular tetrahedron centered on the origin.
    fn regular_tet() -> (Point3<f64>, Point3<f64>, Point3<f64>, Point3<f64>) {
        let a = Point3::new(1.0, 1.0, 1.0);
        let b = Point3::new(1.0, -1.0, -1.0);
        let c = Point3::new(-1.0, 1.0, -1.0);
        let d = Point3::new(-1.0, -1.0, 1.0);
        assert!(orient_3d(&a, &b, &c, &d) > 0.0, "fixture must be positively oriented");
        (a, b, c, d)
    }

    #[test]
    fn in_sphere_3d_is_positive_for_the_circumcenter() {
        let (a, b, c, d) = regular_tet();
        // The circumcenter of a regular tetrahedron centered on the origin is the origin.
        let origin = Point3::origin();
        assert!(in_sphere_3d(&a, &b, &c, &d, &origin) > 0.0);
    }

    #[test]
    fn in_sphere_3d_is_negative_for_a_point_far_outside_the_circumsphere() {
        let (a, b, c, d) = regular_tet();
        let far = Point3::new(100.0, 100.0, 100.0);
        assert!(in_sphere_3d(&a, &b, &c, &d, &far) < 0.0);
    }

    #[test]
    fn in_sphere_3d_is_negative_for_a_vertex_of_the_tet_reflected_outward() {
        let (a, b, c, d) = regular_tet();
        // Reflecting `a` through the origin moves it well outside the circumsphere.
        let reflected = Point3::from(-a.coords);
        assert!(in_sphere_3d(&a, &b, &c, &d, &reflected) < 0.0);
    }
}
