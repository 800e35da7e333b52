//! Public softbody simulation API (`spec.md` §6 "Library surface").

use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::config::SimConfig;
use crate::device::ComputeDevice;
use crate::error::{Result, TetraError};
use crate::model::Model;
use crate::sim::collider::Collider;
use crate::sim::solver;
use crate::sim::state::{AnchorDef, DragState, Geometry, GeometryHandle, InstanceHandle, SimulationState};

/// Result of [`SoftbodySimulation::find_nearest_vertex`].
#[derive(Debug, Clone, Copy)]
pub struct NearestVertex {
    pub vertex_id: u32,
    pub position: Point3<f64>,
    pub along_ray: f64,
}

/// A softbody simulation bound to a [`ComputeDevice`].
///
/// Mirrors the suspension-point contract of `spec.md` §5: `update`, `bake`,
/// `reset_object` (here `spawn`), `read_positions`, and
/// `find_nearest_vertex` may block while the device finishes in-flight work.
pub struct SoftbodySimulation<D: ComputeDevice> {
    device: D,
    config: SimConfig,
    state: SimulationState,
    accumulated_time: f64,
    frame_counter: u32,
}

impl<D: ComputeDevice> SoftbodySimulation<D> {
    pub fn new(device: D, config: SimConfig) -> Self {
        let max_anchors = config.max_anchors as usize;
        Self {
            device,
            config,
            state: SimulationState::new(max_anchors),
            accumulated_time: 0.0,
            frame_counter: 0,
        }
    }

    pub fn add_geometry_from_model(&mut self, model: &Model) -> GeometryHandle {
        self.state.add_geometry(Geometry::from_model(model))
    }

    pub fn add_geometry_from_tet_mesh(
        &mut self,
        tet_verts: Vec<Point3<f64>>,
        tet_ids: Vec<[u32; 4]>,
    ) -> GeometryHandle {
        self.state.add_geometry(Geometry::from_tet_mesh(tet_verts, tet_ids))
    }

    pub fn add_instance(&mut self, geometry: GeometryHandle) -> Result<InstanceHandle> {
        self.state.add_instance(geometry)
    }

    pub fn add_collider(&mut self, collider: Box<dyn Collider>) {
        self.state.add_collider(collider);
    }

    pub fn add_anchor(&mut self, anchor: AnchorDef) -> Result<()> {
        self.state.add_anchor(anchor)
    }

    /// Allocates device buffers and the spatial grid for every registered
    /// instance. Must be called once before `spawn`/`update`.
    pub fn bake(&mut self) -> Result<()> {
        self.state.bake()
    }

    /// Activates (or re-activates) `instance` at the given world transform
    /// and initial velocity (`spec.md` §4.6 "Activate / reset instance").
    pub fn spawn(
        &mut self,
        instance: InstanceHandle,
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
        scale: f64,
        velocity: Vector3<f64>,
    ) -> Result<()> {
        if !self.state.is_baked() {
            return Err(TetraError::NotBaked);
        }
        let dt = 1.0 / self.config.steps_per_second as f64;
        self.state
            .reset_instance(instance, position, rotation, scale, velocity, dt)
    }

    pub fn despawn(&mut self, instance: InstanceHandle) -> Result<()> {
        self.state.deactivate(instance)
    }

    /// Advances simulated time by `dt` (saturated to 1/60s per call per
    /// `spec.md` §5), consuming whole fixed steps from the accumulator.
    pub fn update(&mut self, dt: f64) -> Result<()> {
        if !self.state.is_baked() {
            return Err(TetraError::NotBaked);
        }
        let dt = dt.min(1.0 / 60.0);
        self.accumulated_time += dt;
        let fixed_step = 1.0 / self.config.steps_per_second as f64;

        while self.accumulated_time >= fixed_step {
            solver::step(&self.state, &self.config, &self.device);
            self.accumulated_time -= fixed_step;
            self.frame_counter += 1;

            if self.frame_counter % self.config.readback_interval_frames == 0 {
                self.refresh_cached_positions();
            }
        }
        Ok(())
    }

    fn refresh_cached_positions(&self) {
        for record in &self.state.instances {
            let p = self
                .state
                .vertices
                .position[record.center_vertex as usize]
                .load();
            *record.cached_position.write().expect("cache lock poisoned") = Point3::from(p);
        }
    }

    /// Returns the host-visible cached position of every instance's centre
    /// vertex, last refreshed at the configured readback cadence.
    pub fn read_positions(&self) -> Vec<Point3<f64>> {
        self.state
            .instances
            .iter()
            .map(|record| *record.cached_position.read().expect("cache lock poisoned"))
            .collect()
    }

    /// Returns the current (not cached) position of every active vertex, for
    /// immediate full-resolution readback.
    pub fn read_all_vertex_positions(&self) -> Vec<Point3<f64>> {
        self.state
            .vertices
            .position
            .iter()
            .map(|p| Point3::from(p.load()))
            .collect()
    }

    /// Finds the active vertex with smallest perpendicular distance to the
    /// ray `origin + t * dir`, rejecting candidates beyond
    /// `max_perp_distance` (`spec.md` §4.7 "Mouse interaction").
    pub fn find_nearest_vertex(
        &self,
        origin: Point3<f64>,
        dir: Vector3<f64>,
        max_perp_distance: f64,
    ) -> Option<NearestVertex> {
        let dir = dir.normalize();
        let verts = &self.state.vertices;
        let mut best: Option<(NearestVertex, f64)> = None;

        for i in 0..verts.position.len() {
            if !self.state.is_active(verts.object_id[i]) {
                continue;
            }
            let pos = Point3::from(verts.position[i].load());
            let to_point = pos - origin;
            let along_ray = to_point.dot(&dir);
            let closest_on_ray = origin + dir * along_ray;
            let perp = (pos - closest_on_ray).norm();
            let better = best.as_ref().map_or(true, |(_, best_perp)| perp < *best_perp);
            if perp <= max_perp_distance && better {
                best = Some((
                    NearestVertex {
                        vertex_id: i as u32,
                        position: pos,
                        along_ray,
                    },
                    perp,
                ));
            }
        }
        best.map(|(v, _)| v)
    }

    pub fn start_drag(&self, vertex_id: u32, target: Point3<f64>, strength: f64) {
        *self.state.drag.write().expect("drag lock poisoned") = Some(DragState {
            vertex_id,
            target,
            strength,
        });
    }

    pub fn update_drag(&self, target: Point3<f64>) {
        if let Some(drag) = self.state.drag.write().expect("drag lock poisoned").as_mut() {
            drag.target = target;
        }
    }

    pub fn end_drag(&self) {
        *self.state.drag.write().expect("drag lock poisoned") = None;
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CpuDevice;

    fn rope_geometry(segments: usize) -> (Vec<Point3<f64>>, Vec<[u32; 4]>) {
        // A thin chain of degenerate-ish tets approximating a rope: each
        // segment is a tiny tet so edges carry the chain's bend/stretch.
        let mut verts = Vec::new();
        let mut tets = Vec::new();
        for i in 0..segments {
            let base = i as f64;
            let o = verts.len() as u32;
            verts.push(Point3::new(0.0, -base * 0.1, 0.0));
            verts.push(Point3::new(0.02, -base * 0.1, 0.0));
            verts.push(Point3::new(0.0, -base * 0.1, 0.02));
            verts.push(Point3::new(0.0, -(base + 1.0) * 0.1, 0.0));
            tets.push([o, o + 1, o + 2, o + 3]);
        }
        (verts, tets)
    }

    #[test]
    fn drag_moves_pinned_vertex_toward_target() {
        let (verts, tets) = rope_geometry(15);
        let mut sim = SoftbodySimulation::new(CpuDevice, SimConfig::default());
        let geo = sim.add_geometry_from_tet_mesh(verts, tets);
        let inst = sim.add_instance(geo).unwrap();
        sim.bake().unwrap();
        sim.spawn(
            inst,
            Point3::origin(),
            UnitQuaternion::identity(),
            1.0,
            Vector3::zeros(),
        )
        .unwrap();

        let target = Point3::new(0.0, 0.5, 0.0);
        sim.start_drag(0, target, 1.0);
        for _ in 0..200 {
            sim.update(1.0 / 60.0).unwrap();
        }
        let pos = sim.read_all_vertex_positions()[0];
        assert!((pos - target).norm() < 1e-2);
    }

    #[test]
    fn despawned_instance_is_a_no_op_for_update() {
        let (verts, tets) = rope_geometry(2);
        let mut sim = SoftbodySimulation::new(CpuDevice, SimConfig::default());
        let geo = sim.add_geometry_from_tet_mesh(verts, tets);
        let inst = sim.add_instance(geo).unwrap();
        sim.bake().unwrap();
        sim.spawn(
            inst,
            Point3::origin(),
            UnitQuaternion::identity(),
            1.0,
            Vector3::zeros(),
        )
        .unwrap();
        sim.despawn(inst).unwrap();
        let before = sim.read_all_vertex_positions();
        sim.update(1.0 / 60.0).unwrap();
        let after = sim.read_all_vertex_positions();
        for (b, a) in before.iter().zip(after.iter()) {
            assert!((b - a).norm() < 1e-12);
        }
    }
}
