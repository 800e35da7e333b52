//! # tetrabody
//!
//! A Delaunay tetrahedralizer (incremental Bowyer–Watson, guarded by a BVH
//! inside/outside classifier) paired with a real-time XPBD softbody
//! simulator running on an abstract compute device.
//!
//! The two subsystems share a small geometric core ([`geometry`],
//! [`predicates`]) but are otherwise independent: [`mesh`] turns a surface or
//! point cloud into a tet mesh, [`model`] attaches a render surface to one,
//! and [`sim`] drives that mesh forward in time under gravity, edge/volume
//! constraints, colliders and anchors.

#![deny(unused)]
#![warn(clippy::all, clippy::missing_const_for_fn)]

pub mod buffer;
pub mod bvh;
pub mod config;
pub mod device;
pub mod error;
pub mod geometry;
pub mod mesh;
pub mod model;
mod predicates;
pub mod sim;

pub use config::SimConfig;
pub use device::{ComputeDevice, CpuDevice};
pub use error::{Result, TetraError};
pub use mesh::{boundary_faces, tet_mesh_stats, tetrahedralize, tetrahedralize_points};
pub use mesh::{SurfaceMesh, TetMesh, TetMeshStats, TetraOptions};
pub use model::{attach_surface, Model, SurfaceAttachment};
pub use sim::{
    AnchorDef, BoxCollider, Capsule, Collider, ColliderSample, Dynamic, Geometry, GeometryHandle,
    HeightField, InstanceHandle, NearestVertex, Plane, SoftbodySimulation, Sphere,
};
