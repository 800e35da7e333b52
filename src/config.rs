//! Simulator configuration (`spec.md` §6, "Config (enumerated)").

use nalgebra::Vector3;

/// Tunables for [`crate::sim::simulation::SoftbodySimulation`].
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Physics ticks per second.
    pub steps_per_second: u32,
    /// XPBD substeps per tick.
    pub num_substeps: u32,
    /// World-space gravitational acceleration.
    pub gravity: Vector3<f64>,
    /// Velocity retention per predict step, `0 < damping <= 1`.
    pub damping: f64,
    /// Tangential velocity reduction at contacts, `0..=1`.
    pub friction: f64,
    /// Iterations in shape-match rotation extraction.
    pub rotation_steps: u32,
    /// XPBD edge-constraint compliance.
    pub edge_compliance: f64,
    /// XPBD volume-constraint compliance.
    pub vol_compliance: f64,
    /// Maximum anchors scanned per vertex per step.
    pub max_anchors: u32,
    /// Jacobi relaxation factor applied to edge/volume corrections
    /// (`spec.md` §9, "Concurrent position writes without coloring").
    pub relaxation: f64,
    /// Rest-space centroid-distance factor (relative to the sum of the two
    /// tets' characteristic radii) below which tet-tet broadphase pairs are
    /// assumed adjacent in the rest pose and skipped (`spec.md` §9, "Open
    /// questions" — exposed rather than hardcoded).
    pub self_collision_rest_factor: f64,
    /// Frame interval between host-visible position readbacks
    /// (`spec.md` §9, "Host-visible readback cadence").
    pub readback_interval_frames: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            steps_per_second: 60,
            num_substeps: 10,
            gravity: Vector3::new(0.0, -9.81, 0.0),
            damping: 0.99,
            friction: 0.2,
            rotation_steps: 2,
            edge_compliance: 0.0,
            vol_compliance: 0.0,
            max_anchors: 32,
            relaxation: 0.25,
            self_collision_rest_factor: 1.5,
            readback_interval_frames: 50,
        }
    }
}

impl SimConfig {
    /// Substep `dt`: `(1/steps_per_second) / num_substeps`.
    pub fn substep_dt(&self) -> f64 {
        (1.0 / self.steps_per_second as f64) / self.num_substeps as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substep_dt_divides_the_tick() {
        let cfg = SimConfig {
            steps_per_second: 60,
            num_substeps: 10,
            ..Default::default()
        };
        let dt = cfg.substep_dt();
        assert!((dt * 10.0 * 60.0 - 1.0).abs() < 1e-12);
    }
}
