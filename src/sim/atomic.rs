//! Lock-free numeric cells for buffers touched by concurrent kernels.
//!
//! The solver's data-parallel kernels mutate shared per-vertex/per-tet
//! buffers from many threads at once (`spec.md` §5): edge and volume solves
//! write the same `position` slot from several constraint threads, and the
//! broadphase accumulates a push vector into the same four vertices from
//! several neighbouring tets. Rather than reach for `unsafe` aliasing, every
//! buffer a kernel can write is built from these atomic cells; relaxed
//! ordering is enough because the kernels are already only correct up to
//! Jacobi-relaxed convergence, not exact synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

use nalgebra::{UnitQuaternion, Vector3};

/// An `f64` stored behind an `AtomicU64` bit pattern.
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }

    /// Adds `delta` via a compare-exchange loop; returns the prior value.
    #[inline]
    pub fn fetch_add(&self, delta: f64) -> f64 {
        let mut cur_bits = self.0.load(Ordering::Relaxed);
        loop {
            let cur = f64::from_bits(cur_bits);
            let new = cur + delta;
            match self.0.compare_exchange_weak(
                cur_bits,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return cur,
                Err(actual) => cur_bits = actual,
            }
        }
    }
}

impl Clone for AtomicF64 {
    fn clone(&self) -> Self {
        Self::new(self.load())
    }
}

/// A 3-vector of [`AtomicF64`] components.
#[derive(Debug, Default)]
pub struct AtomicVec3 {
    pub x: AtomicF64,
    pub y: AtomicF64,
    pub z: AtomicF64,
}

impl AtomicVec3 {
    pub fn new(v: Vector3<f64>) -> Self {
        Self {
            x: AtomicF64::new(v.x),
            y: AtomicF64::new(v.y),
            z: AtomicF64::new(v.z),
        }
    }

    #[inline]
    pub fn load(&self) -> Vector3<f64> {
        Vector3::new(self.x.load(), self.y.load(), self.z.load())
    }

    #[inline]
    pub fn store(&self, v: Vector3<f64>) {
        self.x.store(v.x);
        self.y.store(v.y);
        self.z.store(v.z);
    }

    #[inline]
    pub fn fetch_add(&self, delta: Vector3<f64>) {
        self.x.fetch_add(delta.x);
        self.y.fetch_add(delta.y);
        self.z.fetch_add(delta.z);
    }
}

impl Clone for AtomicVec3 {
    fn clone(&self) -> Self {
        Self::new(self.load())
    }
}

/// A unit quaternion stored as four independently-atomic components.
///
/// Only ever touched by the single tet-owning thread of the rotation
/// extraction kernel (`spec.md` §4.7 step 7); relaxed loads/stores are
/// sufficient, there is no cross-thread contention on one tet's slot.
#[derive(Debug)]
pub struct AtomicQuat {
    x: AtomicF64,
    y: AtomicF64,
    z: AtomicF64,
    w: AtomicF64,
}

impl AtomicQuat {
    pub fn identity() -> Self {
        Self::new(UnitQuaternion::identity())
    }

    pub fn new(q: UnitQuaternion<f64>) -> Self {
        Self {
            x: AtomicF64::new(q.i),
            y: AtomicF64::new(q.j),
            z: AtomicF64::new(q.k),
            w: AtomicF64::new(q.w),
        }
    }

    #[inline]
    pub fn load(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
            self.w.load(),
            self.x.load(),
            self.y.load(),
            self.z.load(),
        ))
    }

    #[inline]
    pub fn store(&self, q: UnitQuaternion<f64>) {
        self.x.store(q.i);
        self.y.store(q.j);
        self.z.store(q.k);
        self.w.store(q.w);
    }
}

impl Clone for AtomicQuat {
    fn clone(&self) -> Self {
        Self::new(self.load())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn fetch_add_is_lost_update_free_under_contention() {
        let cell = AtomicF64::new(0.0);
        (0..10_000).into_par_iter().for_each(|_| {
            cell.fetch_add(1.0);
        });
        assert_eq!(cell.load(), 10_000.0);
    }

    #[test]
    fn vec3_round_trips() {
        let v = AtomicVec3::new(Vector3::new(1.0, -2.0, 3.5));
        assert_eq!(v.load(), Vector3::new(1.0, -2.0, 3.5));
    }
}
