//! Colliders: a position -> (outward normal, signed distance) query
//! (`spec.md` §3 "Collider", §9 "Polymorphism over colliders").
//!
//! Negative distance means penetration. The sign convention and the variant
//! set (plane, sphere in/out, box in/out, capsule, height-field) come
//! straight from `spec.md` §3; dynamic variants carry interior-mutable state
//! updated by the host once per step, per §9's "dynamic ones carry an
//! interior mutable state updated before each step."

use nalgebra::{Point3, Vector3};
use std::sync::RwLock;

/// A query result: outward unit normal and signed distance at a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColliderSample {
    pub normal: Vector3<f64>,
    pub signed_distance: f64,
}

/// A pure function of a query position producing a [`ColliderSample`].
///
/// `spec.md` describes a collider as "any callable"; concrete geometric
/// variants are provided below, and [`Dynamic`] adapts an arbitrary host
/// closure plus mutable state into the same trait.
pub trait Collider: Send + Sync {
    fn sample(&self, p: &Point3<f64>) -> ColliderSample;
}

/// Infinite plane through `point` with outward unit `normal`.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    pub point: Point3<f64>,
    pub normal: Vector3<f64>,
}

impl Collider for Plane {
    fn sample(&self, p: &Point3<f64>) -> ColliderSample {
        let n = self.normal.normalize();
        ColliderSample {
            normal: n,
            signed_distance: n.dot(&(p - self.point)),
        }
    }
}

/// Solid sphere. `inside = true` flips the normal/distance so the *interior*
/// is the free region (useful for a bounding cage).
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    pub center: Point3<f64>,
    pub radius: f64,
    pub inside: bool,
}

impl Collider for Sphere {
    fn sample(&self, p: &Point3<f64>) -> ColliderSample {
        let delta = p - self.center;
        let d = delta.norm();
        let normal = if d > 1e-12 {
            delta / d
        } else {
            Vector3::new(0.0, 1.0, 0.0)
        };
        if self.inside {
            ColliderSample {
                normal: -normal,
                signed_distance: self.radius - d,
            }
        } else {
            ColliderSample {
                normal,
                signed_distance: d - self.radius,
            }
        }
    }
}

/// Axis-aligned box spanning `half_extents` around `center`.
#[derive(Debug, Clone, Copy)]
pub struct BoxCollider {
    pub center: Point3<f64>,
    pub half_extents: Vector3<f64>,
    pub inside: bool,
}

impl Collider for BoxCollider {
    fn sample(&self, p: &Point3<f64>) -> ColliderSample {
        let local = p - self.center;
        let q = Vector3::new(
            local.x.abs() - self.half_extents.x,
            local.y.abs() - self.half_extents.y,
            local.z.abs() - self.half_extents.z,
        );
        let outside_dist = Vector3::new(q.x.max(0.0), q.y.max(0.0), q.z.max(0.0)).norm();
        let inside_dist = q.x.max(q.y).max(q.z).min(0.0);
        let d = outside_dist + inside_dist;

        // Gradient of the box SDF, central differences on the local point.
        let eps = 1e-5;
        let sdf = |l: Vector3<f64>| {
            let q = Vector3::new(
                l.x.abs() - self.half_extents.x,
                l.y.abs() - self.half_extents.y,
                l.z.abs() - self.half_extents.z,
            );
            Vector3::new(q.x.max(0.0), q.y.max(0.0), q.z.max(0.0)).norm()
                + q.x.max(q.y).max(q.z).min(0.0)
        };
        let grad = Vector3::new(
            sdf(local + Vector3::new(eps, 0.0, 0.0)) - sdf(local - Vector3::new(eps, 0.0, 0.0)),
            sdf(local + Vector3::new(0.0, eps, 0.0)) - sdf(local - Vector3::new(0.0, eps, 0.0)),
            sdf(local + Vector3::new(0.0, 0.0, eps)) - sdf(local - Vector3::new(0.0, 0.0, eps)),
        ) / (2.0 * eps);
        let normal = if grad.norm() > 1e-9 {
            grad.normalize()
        } else {
            Vector3::new(0.0, 1.0, 0.0)
        };

        if self.inside {
            ColliderSample {
                normal: -normal,
                signed_distance: -d,
            }
        } else {
            ColliderSample {
                normal,
                signed_distance: d,
            }
        }
    }
}

/// Capsule between `a` and `b` with `radius`.
#[derive(Debug, Clone, Copy)]
pub struct Capsule {
    pub a: Point3<f64>,
    pub b: Point3<f64>,
    pub radius: f64,
}

impl Collider for Capsule {
    fn sample(&self, p: &Point3<f64>) -> ColliderSample {
        let ab = self.b - self.a;
        let len_sq = ab.norm_squared();
        let t = if len_sq > 1e-12 {
            ((p - self.a).dot(&ab) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let closest = self.a + ab * t;
        let delta = p - closest;
        let d = delta.norm();
        let normal = if d > 1e-12 {
            delta / d
        } else {
            Vector3::new(0.0, 1.0, 0.0)
        };
        ColliderSample {
            normal,
            signed_distance: d - self.radius,
        }
    }
}

/// Analytic height-field sampled as `y = f(x, z)` over a regular grid, with
/// bilinear interpolation and a central-difference normal — the "analytic
/// height-field/mesh-SDF" variant of `spec.md` §3.
pub struct HeightField {
    pub origin: Point3<f64>,
    pub cell_size: f64,
    pub resolution: usize,
    pub heights: Vec<f64>,
}

impl HeightField {
    fn sample_height(&self, x: f64, z: f64) -> f64 {
        let gx = (x - self.origin.x) / self.cell_size;
        let gz = (z - self.origin.z) / self.cell_size;
        let max_i = self.resolution.saturating_sub(1) as f64;
        let gx = gx.clamp(0.0, max_i);
        let gz = gz.clamp(0.0, max_i);
        let x0 = gx.floor() as usize;
        let z0 = gz.floor() as usize;
        let x1 = (x0 + 1).min(self.resolution - 1);
        let z1 = (z0 + 1).min(self.resolution - 1);
        let fx = gx - x0 as f64;
        let fz = gz - z0 as f64;
        let h = |ix: usize, iz: usize| self.heights[iz * self.resolution + ix];
        let h00 = h(x0, z0);
        let h10 = h(x1, z0);
        let h01 = h(x0, z1);
        let h11 = h(x1, z1);
        let top = h00 * (1.0 - fx) + h10 * fx;
        let bottom = h01 * (1.0 - fx) + h11 * fx;
        top * (1.0 - fz) + bottom * fz
    }
}

impl Collider for HeightField {
    fn sample(&self, p: &Point3<f64>) -> ColliderSample {
        let h = self.sample_height(p.x, p.z);
        let eps = self.cell_size * 0.5;
        let dhdx =
            (self.sample_height(p.x + eps, p.z) - self.sample_height(p.x - eps, p.z)) / (2.0 * eps);
        let dhdz =
            (self.sample_height(p.x, p.z + eps) - self.sample_height(p.x, p.z - eps)) / (2.0 * eps);
        let normal = Vector3::new(-dhdx, 1.0, -dhdz).normalize();
        ColliderSample {
            normal,
            signed_distance: p.y - h,
        }
    }
}

/// Adapts a host-provided closure plus per-frame-refreshed state into a
/// [`Collider`]. `refresh` runs once per step before any kernel samples it.
pub struct Dynamic<S: Send + Sync, F: Fn(&Point3<f64>, &S) -> ColliderSample + Send + Sync> {
    state: RwLock<S>,
    sample_fn: F,
}

impl<S: Send + Sync, F: Fn(&Point3<f64>, &S) -> ColliderSample + Send + Sync> Dynamic<S, F> {
    pub fn new(state: S, sample_fn: F) -> Self {
        Self {
            state: RwLock::new(state),
            sample_fn,
        }
    }

    pub fn refresh(&self, new_state: S) {
        *self.state.write().expect("collider state lock poisoned") = new_state;
    }
}

impl<S: Send + Sync, F: Fn(&Point3<f64>, &S) -> ColliderSample + Send + Sync> Collider
    for Dynamic<S, F>
{
    fn sample(&self, p: &Point3<f64>) -> ColliderSample {
        let state = self.state.read().expect("collider state lock poisoned");
        (self.sample_fn)(p, &state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plane_reports_penetration_below_it() {
        let plane = Plane {
            point: Point3::origin(),
            normal: Vector3::new(0.0, 1.0, 0.0),
        };
        let sample = plane.sample(&Point3::new(0.0, -0.3, 0.0));
        assert!(sample.signed_distance < 0.0);
        assert!((sample.normal - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn sphere_outside_is_positive_beyond_radius() {
        let sphere = Sphere {
            center: Point3::origin(),
            radius: 1.0,
            inside: false,
        };
        let sample = sphere.sample(&Point3::new(2.0, 0.0, 0.0));
        assert!((sample.signed_distance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sphere_inside_penetrates_near_the_wall() {
        let cage = Sphere {
            center: Point3::origin(),
            radius: 1.0,
            inside: true,
        };
        let sample = cage.sample(&Point3::new(0.95, 0.0, 0.0));
        assert!(sample.signed_distance > 0.0);
        let sample_outside = cage.sample(&Point3::new(1.05, 0.0, 0.0));
        assert!(sample_outside.signed_distance < 0.0);
    }

    #[test]
    fn capsule_distance_matches_segment_clamp() {
        let capsule = Capsule {
            a: Point3::new(0.0, 0.0, 0.0),
            b: Point3::new(0.0, 1.0, 0.0),
            radius: 0.1,
        };
        let sample = capsule.sample(&Point3::new(0.1, 2.0, 0.0));
        // Clamped to the endpoint (0,1,0): distance = sqrt(0.01 + 1) - 0.1
        let expected = (0.01f64 + 1.0).sqrt() - 0.1;
        assert!((sample.signed_distance - expected).abs() < 1e-6);
    }

    #[test]
    fn dynamic_collider_reflects_refreshed_state() {
        let dyn_plane = Dynamic::new(0.0_f64, |p: &Point3<f64>, height: &f64| ColliderSample {
            normal: Vector3::new(0.0, 1.0, 0.0),
            signed_distance: p.y - *height,
        });
        assert!((dyn_plane.sample(&Point3::new(0.0, 0.5, 0.0)).signed_distance - 0.5).abs() < 1e-9);
        dyn_plane.refresh(1.0);
        assert!((dyn_plane.sample(&Point3::new(0.0, 0.5, 0.0)).signed_distance + 0.5).abs() < 1e-9);
    }
}
