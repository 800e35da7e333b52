//! XPBD constraint solver: the per-substep kernel pipeline plus the
//! once-per-step grid rebuild and broadphase.
//!
//! Kernels are dispatched through [`ComputeDevice`]; within one kernel,
//! `position` may be written by many threads at once (edges, volumes,
//! broadphase) and correctness rests on Jacobi relaxation rather than a
//! coloring pass.

use std::sync::atomic::Ordering;

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};

use crate::config::SimConfig;
use crate::device::ComputeDevice;
use crate::sim::collider::Collider;
use crate::sim::state::SimulationState;

/// Samples every registered collider against `pos`, pushing out of and
/// damping tangential velocity at any penetrated one. Skips a collider whose
/// sample is NaN rather than propagating it.
fn resolve_colliders(
    colliders: &[Box<dyn Collider>],
    mut pos: Vector3<f64>,
    mut prev: Vector3<f64>,
    friction: f64,
) -> (Vector3<f64>, Vector3<f64>) {
    for collider in colliders {
        let sample = collider.sample(&Point3::from(pos));
        if sample.signed_distance.is_nan() || sample.normal.iter().any(|c| c.is_nan()) {
            log::debug!("collider sample was NaN, skipping for this vertex/substep");
            continue;
        }
        if sample.signed_distance < 0.0 {
            pos += sample.normal * (-sample.signed_distance);
            let vel = pos - prev;
            let normal_component = sample.normal * vel.dot(&sample.normal);
            let tangential_component = vel - normal_component;
            let new_vel = normal_component + tangential_component * (1.0 - friction);
            prev = pos - new_vel;
        }
    }
    (pos, prev)
}

/// Runs one full physics step (all substeps plus the post-substep grid
/// rebuild and broadphase) against `state`.
pub fn step(state: &SimulationState, config: &SimConfig, device: &dyn ComputeDevice) {
    let sdt = config.substep_dt();
    for _ in 0..config.num_substeps {
        substep(state, config, device, sdt);
    }

    if let Some(grid) = &state.grid {
        grid.clear(device);
        grid.set_atomic_mode(true);
        update_tets_and_insert(state, config, device, grid);
        grid.set_atomic_mode(false);
        broadphase(state, config, device, grid);
    }
}

fn substep(state: &SimulationState, config: &SimConfig, device: &dyn ComputeDevice, sdt: f64) {
    predict(state, config, device, sdt);
    solve_edges(state, config, device, sdt);
    solve_volumes(state, config, device, sdt);
    post_collide(state, config, device);
    apply_drag(state);
    apply_anchors(state, config, device);
}

/// Step 1: integrate, then immediately resolve collisions so the constraint
/// solve below starts from a non-penetrating position.
fn predict(state: &SimulationState, config: &SimConfig, device: &dyn ComputeDevice, sdt: f64) {
    let verts = &state.vertices;
    device.dispatch(verts.position.len(), &|i| {
        if !state.is_active(verts.object_id[i]) || verts.inv_mass[i] <= 0.0 {
            return;
        }
        let pos = verts.position[i].load();
        let prev = verts.prev_position[i].load();
        let mut v = (pos - prev) * config.damping;
        v += config.gravity * sdt * sdt;
        let predicted = pos + v;
        let (pos2, prev2) = resolve_colliders(&state.colliders, predicted, pos, config.friction);
        verts.position[i].store(pos2);
        verts.prev_position[i].store(prev2);
    });
}

/// Step 2: per-edge XPBD distance constraint, Jacobi-relaxed.
fn solve_edges(state: &SimulationState, config: &SimConfig, device: &dyn ComputeDevice, sdt: f64) {
    let verts = &state.vertices;
    let edges = &state.edges;
    device.dispatch(edges.v0.len(), &|i| {
        let (a, b) = (edges.v0[i] as usize, edges.v1[i] as usize);
        if !state.is_active(verts.object_id[a]) {
            return;
        }
        let (w0, w1) = (verts.inv_mass[a], verts.inv_mass[b]);
        let w = w0 + w1;
        if w <= 0.0 {
            return;
        }
        let (p0, p1) = (verts.position[a].load(), verts.position[b].load());
        let delta = p0 - p1;
        let len = delta.norm();
        if len < 1e-12 {
            return;
        }
        let grad = delta / len;
        let c = len - edges.rest_length[i];
        let alpha = config.edge_compliance / (sdt * sdt);
        let s = -c / (w + alpha);
        let omega = config.relaxation;
        verts.position[a].fetch_add(grad * (s * w0 * omega));
        verts.position[b].fetch_add(grad * (-(s * w1 * omega)));
    });
}

/// Per-tet XPBD volume constraint via each vertex's opposite-face gradient.
fn solve_volumes(state: &SimulationState, config: &SimConfig, device: &dyn ComputeDevice, sdt: f64) {
    let verts = &state.vertices;
    let tets = &state.tets;
    device.dispatch(tets.verts.len(), &|i| {
        if !state.is_active(tets.object_id[i]) {
            return;
        }
        let t = tets.verts[i];
        let p = [
            verts.position[t[0] as usize].load(),
            verts.position[t[1] as usize].load(),
            verts.position[t[2] as usize].load(),
            verts.position[t[3] as usize].load(),
        ];
        let w = [
            verts.inv_mass[t[0] as usize],
            verts.inv_mass[t[1] as usize],
            verts.inv_mass[t[2] as usize],
            verts.inv_mass[t[3] as usize],
        ];
        let grad = [
            (p[3] - p[1]).cross(&(p[2] - p[1])) / 6.0,
            (p[2] - p[0]).cross(&(p[3] - p[0])) / 6.0,
            (p[3] - p[0]).cross(&(p[1] - p[0])) / 6.0,
            (p[1] - p[0]).cross(&(p[2] - p[0])) / 6.0,
        ];
        let weighted_norm: f64 = (0..4).map(|k| w[k] * grad[k].norm_squared()).sum();
        if weighted_norm <= 0.0 {
            return;
        }
        let volume = (p[1] - p[0]).dot(&(p[2] - p[0]).cross(&(p[3] - p[0]))) / 6.0;
        let rest_volume = *tets.rest_volume[i].read().unwrap();
        let c = volume - rest_volume;
        let alpha = config.vol_compliance / (sdt * sdt);
        let s = -c / (weighted_norm + alpha);
        let omega = config.relaxation;
        for k in 0..4 {
            verts.position[t[k] as usize].fetch_add(grad[k] * (s * w[k] * omega));
        }
    });
}

/// Step 4: re-apply colliders to snap the constraint-adjusted positions back
/// out of penetration.
fn post_collide(state: &SimulationState, config: &SimConfig, device: &dyn ComputeDevice) {
    let verts = &state.vertices;
    device.dispatch(verts.position.len(), &|i| {
        if !state.is_active(verts.object_id[i]) || verts.inv_mass[i] <= 0.0 {
            return;
        }
        let pos = verts.position[i].load();
        let prev = verts.prev_position[i].load();
        let (pos2, prev2) = resolve_colliders(&state.colliders, pos, prev, config.friction);
        verts.position[i].store(pos2);
        verts.prev_position[i].store(prev2);
    });
}

/// Moves the one actively-dragged vertex toward its target and halves its
/// implicit velocity, single-threaded.
fn apply_drag(state: &SimulationState) {
    let drag = state.drag.read().expect("drag lock poisoned");
    let Some(drag) = drag.as_ref() else {
        return;
    };
    let verts = &state.vertices;
    let i = drag.vertex_id as usize;
    let pos = verts.position[i].load();
    let new_pos = pos + (drag.target.coords - pos) * drag.strength;
    let prev = verts.prev_position[i].load();
    let vel = new_pos - prev;
    verts.position[i].store(new_pos);
    verts.prev_position[i].store(new_pos - vel * 0.5);
}

/// Pulls every vertex within an anchor's radius of influence toward
/// `target + (rest - center)`, weighted by `(1 - d/r) * strength`.
fn apply_anchors(state: &SimulationState, config: &SimConfig, device: &dyn ComputeDevice) {
    if state.anchors.is_empty() {
        return;
    }
    let verts = &state.vertices;
    device.dispatch(verts.position.len(), &|i| {
        if !state.is_active(verts.object_id[i]) {
            return;
        }
        let rest = *verts.rest_position[i].read().unwrap();
        let mut pos = verts.position[i].load();
        for anchor in state.anchors.iter().take(config.max_anchors as usize) {
            let offset = rest - anchor.center.coords;
            let d = offset.norm();
            if d < anchor.radius {
                let weight = (1.0 - d / anchor.radius) * anchor.strength;
                let target = anchor.effective_target().coords + offset;
                pos += (target - pos) * weight;
            }
        }
        verts.position[i].store(pos);
    });
}

/// Müller's iterative cross-product polar-decomposition refinement, seeded
/// from the identity each frame. Avoids drift from reusing last frame's
/// rotation as the seed.
fn extract_rotation(sigma: Matrix3<f64>, steps: u32) -> UnitQuaternion<f64> {
    let mut q = UnitQuaternion::identity();
    for _ in 0..steps {
        let r = q.to_rotation_matrix();
        let (r0, r1, r2) = (r.matrix().column(0), r.matrix().column(1), r.matrix().column(2));
        let (a0, a1, a2) = (sigma.column(0), sigma.column(1), sigma.column(2));
        let r0 = Vector3::new(r0[0], r0[1], r0[2]);
        let r1 = Vector3::new(r1[0], r1[1], r1[2]);
        let r2 = Vector3::new(r2[0], r2[1], r2[2]);
        let a0 = Vector3::new(a0[0], a0[1], a0[2]);
        let a1 = Vector3::new(a1[0], a1[1], a1[2]);
        let a2 = Vector3::new(a2[0], a2[1], a2[2]);

        let numerator = r0.cross(&a0) + r1.cross(&a1) + r2.cross(&a2);
        let denominator = (r0.dot(&a0) + r1.dot(&a1) + r2.dot(&a2)).abs() + 1e-9;
        let omega = numerator / denominator;
        let angle = omega.norm();
        if angle < 1e-9 {
            break;
        }
        let delta = UnitQuaternion::from_axis_angle(&nalgebra::Unit::new_normalize(omega), angle);
        q = UnitQuaternion::new_normalize((delta * q).into_inner());
    }
    q
}

/// Steps 6-7: recompute each tet's centroid and orientation via shape
/// matching, rotate its rest corners into the newly-aligned frame, and
/// insert it into the (now atomic-mode) spatial grid.
fn update_tets_and_insert(
    state: &SimulationState,
    config: &SimConfig,
    device: &dyn ComputeDevice,
    grid: &crate::sim::grid::SpatialGrid,
) {
    let verts = &state.vertices;
    let tets = &state.tets;
    device.dispatch(tets.verts.len(), &|i| {
        if !state.is_active(tets.object_id[i]) {
            return;
        }
        let t = tets.verts[i];
        let p = [
            verts.position[t[0] as usize].load(),
            verts.position[t[1] as usize].load(),
            verts.position[t[2] as usize].load(),
            verts.position[t[3] as usize].load(),
        ];
        let centroid = (p[0] + p[1] + p[2] + p[3]) / 4.0;
        tets.centroid[i].store(centroid);

        let refs = [
            tets.rest_pose[i * 4].load(),
            tets.rest_pose[i * 4 + 1].load(),
            tets.rest_pose[i * 4 + 2].load(),
            tets.rest_pose[i * 4 + 3].load(),
        ];
        let ref_mean = (refs[0] + refs[1] + refs[2] + refs[3]) / 4.0;

        let mut sigma = Matrix3::zeros();
        for j in 0..4 {
            let a = refs[j] - ref_mean;
            let b = p[j] - centroid;
            sigma += Matrix3::new(
                a.x * b.x, a.x * b.y, a.x * b.z,
                a.y * b.x, a.y * b.y, a.y * b.z,
                a.z * b.x, a.z * b.y, a.z * b.z,
            );
        }

        let q = extract_rotation(sigma, config.rotation_steps);
        tets.orientation[i].store(q);
        for j in 0..4 {
            let rotated = ref_mean + q * (refs[j] - ref_mean);
            tets.rest_pose[i * 4 + j].store(rotated);
        }

        grid.insert(i as i64, &Point3::from(centroid), &tets.next_tet[i]);
    });
}

/// Step 8: tet-tet broadphase response over the grid's 3x3x3 neighbourhood.
fn broadphase(
    state: &SimulationState,
    config: &SimConfig,
    device: &dyn ComputeDevice,
    grid: &crate::sim::grid::SpatialGrid,
) {
    let verts = &state.vertices;
    let tets = &state.tets;
    device.dispatch(tets.verts.len(), &|i| {
        if !state.is_active(tets.object_id[i]) {
            return;
        }
        let centroid_a = tets.centroid[i].load();
        let radius_a = tets.characteristic_radius[i].load();
        let object_a = tets.object_id[i];
        let rest_centroid_a = *tets.rest_centroid[i].read().unwrap();

        let mut diff = Vector3::zeros();
        for cell in grid.neighbor_cells(&Point3::from(centroid_a)) {
            let mut cur = grid.cell_head(cell);
            while cur != -1 {
                let j = cur as usize;
                if j != i {
                    let object_b = tets.object_id[j];
                    let radius_b = tets.characteristic_radius[j].load();
                    let rest_centroid_b = *tets.rest_centroid[j].read().unwrap();
                    let rest_adjacent = object_a == object_b
                        && (rest_centroid_a - rest_centroid_b).norm()
                            <= config.self_collision_rest_factor * (radius_a + radius_b);
                    if !rest_adjacent {
                        let centroid_b = tets.centroid[j].load();
                        let delta = centroid_a - centroid_b;
                        let d = delta.norm();
                        if d > 1e-9 && d < radius_a + radius_b {
                            diff += delta * (0.5 * (radius_a + radius_b - d) / d);
                        }
                    }
                }
                cur = tets.next_tet[j].load(Ordering::Relaxed);
            }
        }

        if diff.norm_squared() > 0.0 {
            for v in tets.verts[i] {
                verts.position[v as usize].fetch_add(diff);
            }
        }
    });
}
