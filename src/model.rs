//! Model processor: attaches a surface triangle soup to a tet mesh by
//! picking a host tet per surface vertex.

use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::geometry::barycentric;

/// Per-surface-vertex attachment record: the host tet and the vertex's
/// barycentric coordinates within it.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceAttachment {
    pub host_tet: u32,
    /// `(b1, b2, b3)`; `b0` is implicit as `1 - b1 - b2 - b3`.
    pub barycentrics: (f64, f64, f64),
}

/// A tet mesh with a surface skin attached for rendering.
pub struct Model {
    pub tet_verts: Vec<Point3<f64>>,
    pub tet_ids: Vec<[u32; 4]>,
    pub surface_positions: Vec<Point3<f64>>,
    pub surface_normals: Vec<Vector3<f64>>,
    pub attachments: Vec<SurfaceAttachment>,
}

/// Builds a [`Model`] by, for each surface vertex, selecting the tet whose
/// centroid is nearest to it and computing the vertex's barycentric
/// coordinates within that tet.
pub fn attach_surface(
    tet_verts: &[Point3<f64>],
    tet_ids: &[[u32; 4]],
    surface_positions: &[Point3<f64>],
    surface_normals: &[Vector3<f64>],
) -> Model {
    let centroids: Vec<Point3<f64>> = tet_ids
        .iter()
        .map(|t| {
            let p = |i: u32| tet_verts[i as usize];
            nalgebra::center(
                &nalgebra::center(&p(t[0]), &p(t[1])),
                &nalgebra::center(&p(t[2]), &p(t[3])),
            )
        })
        .collect();

    let attachments = surface_positions
        .iter()
        .map(|v| {
            let (host_tet, _) = centroids
                .iter()
                .enumerate()
                .map(|(i, c)| (i, (c - v).norm_squared()))
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
                .expect("tet mesh must have at least one tet to attach a surface to");

            let t = tet_ids[host_tet];
            let p = |i: u32| tet_verts[i as usize];
            let (_, b1, b2, b3) = barycentric(v, &p(t[0]), &p(t[1]), &p(t[2]), &p(t[3]));

            SurfaceAttachment {
                host_tet: host_tet as u32,
                barycentrics: (b1, b2, b3),
            }
        })
        .collect();

    Model {
        tet_verts: tet_verts.to_vec(),
        tet_ids: tet_ids.to_vec(),
        surface_positions: surface_positions.to_vec(),
        surface_normals: surface_normals.to_vec(),
        attachments,
    }
}

impl Model {
    /// Reconstructs a surface vertex's world position from its host tet's
    /// current (deformed) corners: `v0 + b1*(v1-v0) + b2*(v2-v0) + b3*(v3-v0)`.
    pub fn reconstruct_position(&self, surface_idx: usize, deformed_tet_verts: &[Point3<f64>]) -> Point3<f64> {
        let attach = self.attachments[surface_idx];
        let t = self.tet_ids[attach.host_tet as usize];
        let p = |i: u32| deformed_tet_verts[i as usize];
        let (v0, v1, v2, v3) = (p(t[0]), p(t[1]), p(t[2]), p(t[3]));
        let (b1, b2, b3) = attach.barycentrics;
        v0 + (v1 - v0) * b1 + (v2 - v0) * b2 + (v3 - v0) * b3
    }

    /// Rotates a surface normal by its host tet's orientation quaternion,
    /// rather than recomputing it from deformed geometry.
    pub fn reconstruct_normal(&self, surface_idx: usize, tet_orientations: &[UnitQuaternion<f64>]) -> Vector3<f64> {
        let attach = self.attachments[surface_idx];
        let q = tet_orientations[attach.host_tet as usize];
        q * self.surface_normals[surface_idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barycentric_attachment_reconstructs_rest_position() {
        let tet_verts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let tet_ids = vec![[0u32, 1, 2, 3]];
        let surface_positions = vec![Point3::new(0.2, 0.3, 0.1)];
        let surface_normals = vec![Vector3::new(0.0, 0.0, 1.0)];

        let model = attach_surface(&tet_verts, &tet_ids, &surface_positions, &surface_normals);
        let reconstructed = model.reconstruct_position(0, &tet_verts);
        assert!((reconstructed - surface_positions[0]).norm() < 1e-4);
    }
}
