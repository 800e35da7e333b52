//! Simulation state and lifecycle (`spec.md` §3 "Data model", §4.6).
//!
//! Vertices, tets, edges, instances, anchors and colliders all live in flat
//! arrays allocated once at [`SimulationState::bake`] and never resized
//! afterwards (`spec.md` §3, "Lifecycle"). Fields a substep kernel can write
//! concurrently are [`crate::sim::atomic`] cells; everything else is a plain
//! `Vec` mutated only by the host-side bake/reset/deactivate path.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use crate::error::{Result, TetraError};
use crate::model::Model;
use crate::sim::atomic::{AtomicF64, AtomicQuat, AtomicVec3};
use crate::sim::collider::Collider;
use crate::sim::grid::{GridMode, SpatialGrid};

/// Opaque handle to a registered geometry template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryHandle(pub usize);

/// Opaque handle to a spawned instance of a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceHandle(pub usize);

/// A registered, not-yet-instantiated tet-mesh template.
pub struct Geometry {
    pub tet_verts: Vec<Point3<f64>>,
    pub tet_ids: Vec<[u32; 4]>,
    pub edges: Vec<(u32, u32, f64)>,
}

/// Builds edge list (deduplicated, smaller id first) and per-vertex inverse
/// mass from a tet mesh (`spec.md` §3 invariants).
fn derive_edges_and_inv_mass(
    tet_verts: &[Point3<f64>],
    tet_ids: &[[u32; 4]],
) -> (Vec<(u32, u32, f64)>, Vec<f64>) {
    use crate::geometry::{signed_volume, TET_EDGES};
    use std::collections::BTreeMap;

    let mut edge_set: BTreeMap<(u32, u32), f64> = BTreeMap::new();
    let mut inv_mass = vec![0.0; tet_verts.len()];

    for t in tet_ids {
        let p = |i: u32| tet_verts[i as usize];
        let v = signed_volume(&p(t[0]), &p(t[1]), &p(t[2]), &p(t[3])).abs();
        if v > 1e-12 {
            let w = 4.0 / v;
            for &corner in t {
                inv_mass[corner as usize] += w;
            }
        }
        for e in TET_EDGES {
            let (a, b) = (t[e[0]], t[e[1]]);
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            let rest = (p(a) - p(b)).norm();
            edge_set.entry((lo, hi)).or_insert(rest);
        }
    }

    let edges = edge_set.into_iter().map(|((a, b), rest)| (a, b, rest)).collect();
    (edges, inv_mass)
}

impl Geometry {
    pub fn from_model(model: &Model) -> Self {
        let (edges, _inv_mass) = derive_edges_and_inv_mass(&model.tet_verts, &model.tet_ids);
        Self {
            tet_verts: model.tet_verts.clone(),
            tet_ids: model.tet_ids.clone(),
            edges,
        }
    }

    pub fn from_tet_mesh(tet_verts: Vec<Point3<f64>>, tet_ids: Vec<[u32; 4]>) -> Self {
        let (edges, _inv_mass) = derive_edges_and_inv_mass(&tet_verts, &tet_ids);
        Self {
            tet_verts,
            tet_ids,
            edges,
        }
    }
}

/// One registered, un-baked instance: which geometry, and (until baked)
/// nothing else — ranges are assigned at `bake` time.
struct PendingInstance {
    geometry: GeometryHandle,
}

/// Flat per-vertex buffers, sized at bake and never resized.
pub struct VertexBuffers {
    pub object_id: Vec<u32>,
    pub position: Vec<AtomicVec3>,
    pub prev_position: Vec<AtomicVec3>,
    pub rest_position: Vec<RwLock<Vector3<f64>>>,
    pub inv_mass: Vec<f64>,
}

/// Flat per-tet buffers, sized at bake and never resized.
pub struct TetBuffers {
    pub object_id: Vec<u32>,
    pub verts: Vec<[u32; 4]>,
    pub rest_volume: Vec<RwLock<f64>>,
    pub characteristic_radius: Vec<AtomicF64>,
    pub rest_centroid: Vec<RwLock<Vector3<f64>>>,
    pub centroid: Vec<AtomicVec3>,
    pub orientation: Vec<AtomicQuat>,
    /// Rotated-in-place rest corners, 4 per tet (`spec.md` §3 "Rest-pose
    /// record").
    pub rest_pose: Vec<AtomicVec3>,
    /// Linked-list pointer into the spatial grid's cell, `-1` terminated.
    pub next_tet: Vec<AtomicI64>,
}

/// Flat edge buffers: unordered pair plus rest length.
pub struct EdgeBuffers {
    pub v0: Vec<u32>,
    pub v1: Vec<u32>,
    pub rest_length: Vec<f64>,
}

/// One spawned instance's bookkeeping (`spec.md` §3 "Object (instance)").
pub struct InstanceRecord {
    pub vertex_start: u32,
    pub vertex_count: u32,
    pub tet_start: u32,
    pub tet_count: u32,
    /// Reference centre vertex used for body-level position readback.
    pub center_vertex: u32,
    /// `< eps` means inactive; kernels early-exit.
    pub size: AtomicF64,
    pub cached_position: RwLock<Point3<f64>>,
}

/// An anchor definition (`spec.md` §3 "Anchor").
pub struct AnchorDef {
    pub center: Point3<f64>,
    pub radius: f64,
    pub target: Option<Point3<f64>>,
    pub strength: f64,
}

impl AnchorDef {
    pub fn effective_target(&self) -> Point3<f64> {
        self.target.unwrap_or(self.center)
    }
}

/// One active mouse/pin drag (`spec.md` §4.7 "Drag").
pub struct DragState {
    pub vertex_id: u32,
    pub target: Point3<f64>,
    pub strength: f64,
}

/// All simulation state: vertices, tets, edges, instances, colliders,
/// anchors, and the spatial grid.
pub struct SimulationState {
    geometries: Vec<Geometry>,
    pending_instances: Vec<PendingInstance>,

    pub vertices: VertexBuffers,
    pub tets: TetBuffers,
    pub edges: EdgeBuffers,
    pub instances: Vec<InstanceRecord>,
    pub colliders: Vec<Box<dyn Collider>>,
    pub anchors: Vec<AnchorDef>,
    pub max_anchors: usize,
    pub drag: RwLock<Option<DragState>>,
    pub grid: Option<SpatialGrid>,
    baked: bool,
}

impl SimulationState {
    pub fn new(max_anchors: usize) -> Self {
        Self {
            geometries: Vec::new(),
            pending_instances: Vec::new(),
            vertices: VertexBuffers {
                object_id: Vec::new(),
                position: Vec::new(),
                prev_position: Vec::new(),
                rest_position: Vec::new(),
                inv_mass: Vec::new(),
            },
            tets: TetBuffers {
                object_id: Vec::new(),
                verts: Vec::new(),
                rest_volume: Vec::new(),
                characteristic_radius: Vec::new(),
                rest_centroid: Vec::new(),
                centroid: Vec::new(),
                orientation: Vec::new(),
                rest_pose: Vec::new(),
                next_tet: Vec::new(),
            },
            edges: EdgeBuffers {
                v0: Vec::new(),
                v1: Vec::new(),
                rest_length: Vec::new(),
            },
            instances: Vec::new(),
            colliders: Vec::new(),
            anchors: Vec::new(),
            max_anchors,
            drag: RwLock::new(None),
            grid: None,
            baked: false,
        }
    }

    pub fn is_baked(&self) -> bool {
        self.baked
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryHandle {
        self.geometries.push(geometry);
        GeometryHandle(self.geometries.len() - 1)
    }

    pub fn add_instance(&mut self, geometry: GeometryHandle) -> Result<InstanceHandle> {
        if geometry.0 >= self.geometries.len() {
            return Err(TetraError::UnknownHandle("geometry"));
        }
        self.pending_instances.push(PendingInstance { geometry });
        Ok(InstanceHandle(self.pending_instances.len() - 1))
    }

    pub fn add_collider(&mut self, collider: Box<dyn Collider>) {
        self.colliders.push(collider);
    }

    pub fn add_anchor(&mut self, anchor: AnchorDef) -> Result<()> {
        if self.anchors.len() >= self.max_anchors {
            return Err(TetraError::AnchorOverflow {
                max: self.max_anchors,
            });
        }
        self.anchors.push(anchor);
        Ok(())
    }

    /// Allocates buffers sized to the current instance/geometry counts, fills
    /// initial values at the identity transform, and builds the spatial
    /// grid with `cellsize = 2 * max tet characteristic radius`
    /// (`spec.md` §4.6 "Bake").
    pub fn bake(&mut self) -> Result<()> {
        let total_verts: usize = self
            .pending_instances
            .iter()
            .map(|inst| self.geometries[inst.geometry.0].tet_verts.len())
            .sum();
        let total_tets: usize = self
            .pending_instances
            .iter()
            .map(|inst| self.geometries[inst.geometry.0].tet_ids.len())
            .sum();

        if total_verts == 0 || total_tets == 0 {
            log::warn!(
                "bake skipped: {total_verts} vertices, {total_tets} tets registered"
            );
            return Err(TetraError::EmptyBake {
                vertex_count: total_verts,
                tet_count: total_tets,
            });
        }

        let mut max_radius = 0.0f64;
        let mut vertex_cursor = 0u32;
        let mut tet_cursor = 0u32;

        for (instance_idx, inst) in self.pending_instances.iter().enumerate() {
            let geo = &self.geometries[inst.geometry.0];
            let vertex_start = vertex_cursor;
            let tet_start = tet_cursor;

            let (_, inv_mass) = derive_edges_and_inv_mass(&geo.tet_verts, &geo.tet_ids);

            for (local_id, p) in geo.tet_verts.iter().enumerate() {
                self.vertices.object_id.push(instance_idx as u32);
                self.vertices.position.push(AtomicVec3::new(p.coords));
                self.vertices.prev_position.push(AtomicVec3::new(p.coords));
                self.vertices.rest_position.push(RwLock::new(p.coords));
                self.vertices.inv_mass.push(inv_mass[local_id]);
            }

            for t in &geo.tet_ids {
                let global = t.map(|v| v + vertex_start);
                let p = |i: u32| geo.tet_verts[i as usize];
                let centroid = nalgebra::center(
                    &nalgebra::center(&p(t[0]), &p(t[1])),
                    &nalgebra::center(&p(t[2]), &p(t[3])),
                );
                let volume = crate::geometry::signed_volume(&p(t[0]), &p(t[1]), &p(t[2]), &p(t[3]));
                let radius = crate::geometry::characteristic_radius(volume.abs());
                max_radius = max_radius.max(radius);

                self.tets.object_id.push(instance_idx as u32);
                self.tets.verts.push(global);
                self.tets.rest_volume.push(RwLock::new(volume));
                self.tets.characteristic_radius.push(AtomicF64::new(radius));
                self.tets.rest_centroid.push(RwLock::new(centroid.coords));
                self.tets.centroid.push(AtomicVec3::new(centroid.coords));
                self.tets.orientation.push(AtomicQuat::identity());
                for corner in t {
                    self.tets.rest_pose.push(AtomicVec3::new(p(*corner).coords));
                }
                self.tets.next_tet.push(AtomicI64::new(-1));
            }

            for &(a, b, rest) in &geo.edges {
                self.edges.v0.push(a + vertex_start);
                self.edges.v1.push(b + vertex_start);
                self.edges.rest_length.push(rest);
            }

            self.instances.push(InstanceRecord {
                vertex_start,
                vertex_count: geo.tet_verts.len() as u32,
                tet_start,
                tet_count: geo.tet_ids.len() as u32,
                center_vertex: vertex_start,
                size: AtomicF64::new(0.0),
                cached_position: RwLock::new(Point3::origin()),
            });

            vertex_cursor += geo.tet_verts.len() as u32;
            tet_cursor += geo.tet_ids.len() as u32;
        }

        let cell_size = (2.0 * max_radius).max(1e-3);
        self.grid = Some(SpatialGrid::new(GridMode::Hash, cell_size));
        self.baked = true;
        log::debug!(
            "baked {total_verts} vertices, {total_tets} tets, cellsize={cell_size}"
        );
        Ok(())
    }

    /// Applies `transform` to the instance's rest pose, resets velocities
    /// from `velocity`, and re-seeds its tets' orientation to identity
    /// (`spec.md` §4.6 "Activate / reset instance").
    pub fn reset_instance(
        &self,
        instance: InstanceHandle,
        position: Point3<f64>,
        rotation: UnitQuaternion<f64>,
        scale: f64,
        velocity: Vector3<f64>,
        dt: f64,
    ) -> Result<()> {
        let record = self
            .instances
            .get(instance.0)
            .ok_or(TetraError::ResetOutOfRange {
                id: instance.0,
                registered: self.instances.len(),
            })?;

        let transform = |local_rest: Vector3<f64>| -> Point3<f64> {
            position + rotation * (local_rest * scale)
        };

        let v_range = record.vertex_start as usize..(record.vertex_start + record.vertex_count) as usize;
        for i in v_range {
            let local_rest = *self.vertices.rest_position[i].read().unwrap();
            let world = transform(local_rest);
            self.vertices.position[i].store(world.coords);
            self.vertices.prev_position[i].store((world - velocity * dt).coords);
        }
        record.size.store(1.0);

        let t_range = record.tet_start as usize..(record.tet_start + record.tet_count) as usize;
        for i in t_range {
            let t = self.tets.verts[i];
            let p = |vid: u32| transform(*self.vertices.rest_position[vid as usize].read().unwrap());
            let corners = [p(t[0]), p(t[1]), p(t[2]), p(t[3])];
            let centroid = nalgebra::center(
                &nalgebra::center(&corners[0], &corners[1]),
                &nalgebra::center(&corners[2], &corners[3]),
            );
            let volume =
                crate::geometry::signed_volume(&corners[0], &corners[1], &corners[2], &corners[3]);
            *self.tets.rest_volume[i].write().unwrap() = volume;
            *self.tets.rest_centroid[i].write().unwrap() = centroid.coords;
            self.tets.centroid[i].store(centroid.coords);
            self.tets
                .characteristic_radius[i]
                .store(crate::geometry::characteristic_radius(volume.abs()));
            self.tets.orientation[i].store(UnitQuaternion::identity());
            for (corner_slot, corner_pos) in corners.iter().enumerate() {
                self.tets.rest_pose[i * 4 + corner_slot].store(corner_pos.coords);
            }
        }
        Ok(())
    }

    /// Sets `size` to 0; kernels skip the instance's vertices/tets
    /// (`spec.md` §4.6 "Deactivate").
    pub fn deactivate(&self, instance: InstanceHandle) -> Result<()> {
        let record = self
            .instances
            .get(instance.0)
            .ok_or(TetraError::ResetOutOfRange {
                id: instance.0,
                registered: self.instances.len(),
            })?;
        record.size.store(0.0);
        Ok(())
    }

    pub fn is_active(&self, object_id: u32) -> bool {
        self.instances[object_id as usize].size.load() >= 1e-6
    }
}
