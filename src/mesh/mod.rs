//! Delaunay tetrahedralization: dense tet storage, the Bowyer–Watson driver,
//! and Gmsh `.msh` import/export.

pub mod arena;
pub mod msh;
pub mod tetrahedralizer;

pub use tetrahedralizer::{tetrahedralize, tetrahedralize_points, Point, SurfaceMesh, TetMesh, TetraOptions};

use nalgebra::Point3;

/// Tet-mesh statistics used by debug-time tooling: count, summed volume, and
/// quality range.
#[derive(Debug, Clone, Copy)]
pub struct TetMeshStats {
    pub count: usize,
    pub volume_sum: f64,
    pub min_quality: f64,
    pub max_quality: f64,
    pub avg_quality: f64,
}

pub fn tet_mesh_stats(tet_verts: &[Point3<f64>], tet_ids: &[[u32; 4]]) -> TetMeshStats {
    if tet_ids.is_empty() {
        return TetMeshStats {
            count: 0,
            volume_sum: 0.0,
            min_quality: 0.0,
            max_quality: 0.0,
            avg_quality: 0.0,
        };
    }

    let mut volume_sum = 0.0;
    let mut min_quality = f64::INFINITY;
    let mut max_quality = f64::NEG_INFINITY;
    let mut quality_sum = 0.0;

    for t in tet_ids {
        let p = |i: u32| tet_verts[i as usize];
        let (a, b, c, d) = (p(t[0]), p(t[1]), p(t[2]), p(t[3]));
        volume_sum += crate::geometry::signed_volume(&a, &b, &c, &d);
        let q = crate::geometry::quality(&a, &b, &c, &d);
        min_quality = min_quality.min(q);
        max_quality = max_quality.max(q);
        quality_sum += q;
    }

    TetMeshStats {
        count: tet_ids.len(),
        volume_sum,
        min_quality,
        max_quality,
        avg_quality: quality_sum / tet_ids.len() as f64,
    }
}

/// Extracts the boundary surface of a tet mesh: faces that appear in exactly
/// one tet.
pub fn boundary_faces(tet_ids: &[[u32; 4]]) -> Vec<[u32; 3]> {
    use std::collections::HashMap;

    let mut counts: HashMap<[u32; 3], ([u32; 3], u32)> = HashMap::new();
    for t in tet_ids {
        for face in &crate::geometry::TET_FACES {
            let raw = [t[face[0]], t[face[1]], t[face[2]]];
            let mut key = raw;
            key.sort_unstable();
            let entry = counts.entry(key).or_insert((raw, 0));
            entry.1 += 1;
        }
    }

    counts
        .into_values()
        .filter(|(_, count)| *count == 1)
        .map(|(raw, _)| raw)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tetrahedralizer::{tetrahedralize_points, TetraOptions};

    #[test]
    fn boundary_faces_appear_at_most_twice() {
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
        let stats = tet_mesh_stats(&mesh.tet_verts, &mesh.tet_ids);
        assert_eq!(stats.count, mesh.tet_count());
        assert!((stats.volume_sum - 8.0).abs() < 1e-6);

        let boundary = boundary_faces(&mesh.tet_ids);
        assert!(!boundary.is_empty());
    }
}
