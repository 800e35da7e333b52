//! Cross-module end-to-end scenarios (`spec.md` §8).

mod common;

use nalgebra::{Point3, UnitQuaternion, Vector3};
use tetrabody::config::SimConfig;
use tetrabody::device::CpuDevice;
use tetrabody::mesh::msh::{parse_msh, serialize_msh, MshMesh};
use tetrabody::mesh::{tet_mesh_stats, tetrahedralize, tetrahedralize_points, TetraOptions};
use tetrabody::sim::{Plane, SoftbodySimulation};

/// Scenario 1: tetrahedralize a unit icosphere with interior sampling.
#[test]
fn icosphere_tetrahedralizes_to_a_well_formed_interior_mesh() {
    let surface = common::icosphere(1.0, 2);
    let opts = TetraOptions {
        resolution: 8,
        min_quality: 0.001,
        verbose: false,
    };
    let mesh = tetrahedralize(&surface, &opts);

    assert!(
        mesh.tet_count() >= 50,
        "expected at least 50 tets, got {}",
        mesh.tet_count()
    );

    let eps = 1e-2;
    for t in &mesh.tet_ids {
        let p = |i: u32| mesh.tet_verts[i as usize];
        let centroid = nalgebra::center(
            &nalgebra::center(&p(t[0]), &p(t[1])),
            &nalgebra::center(&p(t[2]), &p(t[3])),
        );
        assert!(
            centroid.coords.norm() <= 1.0 + eps,
            "tet centroid {centroid:?} lies outside the unit sphere"
        );
    }

    let stats = tet_mesh_stats(&mesh.tet_verts, &mesh.tet_ids);
    let expected_volume = 4.0 * std::f64::consts::PI / 3.0;
    let rel_error = (stats.volume_sum - expected_volume).abs() / expected_volume;
    assert!(
        rel_error < 0.35,
        "summed tet volume {} too far from 4*pi/3 ({})",
        stats.volume_sum,
        expected_volume
    );
}

/// Scenario 2: an 8-corner unit cube (scaled to side 2) tetrahedralizes to
/// either 5 or 6 tets with total signed volume matching the cube's.
#[test]
fn cube_corners_yield_five_or_six_tets_with_exact_volume() {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(2.0, 0.0, 0.0),
        Point3::new(2.0, 2.0, 0.0),
        Point3::new(0.0, 2.0, 0.0),
        Point3::new(0.0, 0.0, 2.0),
        Point3::new(2.0, 0.0, 2.0),
        Point3::new(2.0, 2.0, 2.0),
        Point3::new(0.0, 2.0, 2.0),
    ];
    let opts = TetraOptions {
        min_quality: 0.0,
        ..Default::default()
    };
    let mesh = tetrahedralize_points(&points, &opts);
    assert!(
        (5..=6).contains(&mesh.tet_count()),
        "expected 5 or 6 tets, got {}",
        mesh.tet_count()
    );

    let stats = tet_mesh_stats(&mesh.tet_verts, &mesh.tet_ids);
    assert!((stats.volume_sum - 8.0).abs() < 1e-6);
}

/// A coarse capsule-shaped point cloud (stretched icosphere), built as a
/// softbody geometry template.
fn capsule_geometry() -> (Vec<Point3<f64>>, Vec<[u32; 4]>) {
    let surface = common::icosphere(0.1, 1);
    let stretched: Vec<Point3<f64>> = surface
        .positions
        .iter()
        .map(|p| Point3::new(p.x, p.y * 1.5, p.z))
        .collect();
    let opts = TetraOptions {
        min_quality: 1e-4,
        ..Default::default()
    };
    let mesh = tetrahedralize_points(&stretched, &opts);
    (mesh.tet_verts, mesh.tet_ids)
}

/// Scenario 3: a capsule-like softbody dropped onto a plane settles at rest
/// on the plane without sustained penetration.
#[test]
fn capsule_settles_on_a_plane_without_penetrating() {
    let (verts, tets) = capsule_geometry();
    assert!(!tets.is_empty(), "capsule fixture produced no tets");

    let config = SimConfig {
        steps_per_second: 180,
        num_substeps: 10,
        gravity: Vector3::new(0.0, -19.62, 0.0),
        friction: 0.5,
        ..Default::default()
    };
    let mut sim = SoftbodySimulation::new(CpuDevice, config);
    let geo = sim.add_geometry_from_tet_mesh(verts, tets);
    let inst = sim.add_instance(geo).unwrap();
    sim.add_collider(Box::new(Plane {
        point: Point3::origin(),
        normal: Vector3::new(0.0, 1.0, 0.0),
    }));
    sim.bake().unwrap();
    sim.spawn(
        inst,
        Point3::new(0.0, 3.0, 0.0),
        UnitQuaternion::identity(),
        1.0,
        Vector3::zeros(),
    )
    .unwrap();

    let dt = 1.0 / 180.0;
    let total_steps = (2.0 / dt) as usize;
    for _ in 0..total_steps {
        sim.update(dt).unwrap();
    }

    let positions = sim.read_all_vertex_positions();
    let min_y = positions.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    assert!(
        min_y > -0.05,
        "lowest vertex penetrated the plane: y = {min_y}"
    );
    assert!(
        min_y < 0.3,
        "softbody did not settle near the plane: lowest y = {min_y}"
    );
}

/// Scenario 4: two identical unit spheres repel via tet-tet broadphase and
/// do not collapse into each other with gravity off.
#[test]
fn two_spheres_repel_via_broadphase_with_gravity_off() {
    let surface = common::icosphere(0.5, 1);
    let opts = TetraOptions {
        min_quality: 1e-4,
        ..Default::default()
    };
    let mesh = tetrahedralize(&surface, &opts);
    assert!(!mesh.tet_ids.is_empty());

    let config = SimConfig {
        gravity: Vector3::zeros(),
        ..Default::default()
    };
    let mut sim = SoftbodySimulation::new(CpuDevice, config);
    let geo = sim.add_geometry_from_tet_mesh(mesh.tet_verts.clone(), mesh.tet_ids.clone());
    let left = sim.add_instance(geo).unwrap();
    let right = sim.add_instance(geo).unwrap();
    sim.bake().unwrap();
    sim.spawn(
        left,
        Point3::new(-0.4, 0.0, 0.0),
        UnitQuaternion::identity(),
        1.0,
        Vector3::zeros(),
    )
    .unwrap();
    sim.spawn(
        right,
        Point3::new(0.4, 0.0, 0.0),
        UnitQuaternion::identity(),
        1.0,
        Vector3::zeros(),
    )
    .unwrap();

    for _ in 0..60 {
        sim.update(1.0 / 60.0).unwrap();
    }

    let positions = sim.read_positions();
    let centroid_distance = (positions[0] - positions[1]).norm();
    assert!(
        centroid_distance >= 1.0 - 0.05,
        "spheres collapsed into each other: distance = {centroid_distance}"
    );
}

/// Scenario 6 (partial): a synthetic 33-node/64-tet mesh round-trips through
/// the Gmsh text format with the same node count and tet-id set.
#[test]
fn msh_round_trip_preserves_tet_set() {
    let mut nodes = Vec::with_capacity(33);
    for i in 0..33 {
        let f = i as f64;
        nodes.push(Point3::new(f * 0.1, (f * 0.37).sin(), (f * 0.19).cos()));
    }
    let mut tets = Vec::with_capacity(64);
    for i in 0..64u32 {
        let base = i % 30;
        tets.push([base, base + 1, base + 2, base + 3]);
    }
    let mesh = MshMesh { nodes, tets };

    let text = serialize_msh(&mesh);
    let parsed = parse_msh(&text);

    assert_eq!(parsed.nodes.len(), mesh.nodes.len());
    assert_eq!(parsed.tets.len(), mesh.tets.len());

    use std::collections::HashSet;
    let original: HashSet<[u32; 4]> = mesh.tets.iter().copied().collect();
    let round_tripped: HashSet<[u32; 4]> = parsed.tets.iter().copied().collect();
    assert_eq!(original, round_tripped);
}
