//! Real-time softbody simulator: state, spatial grid, colliders, and the
//! XPBD constraint solver (`spec.md` §3, §4.5–§4.7).

pub mod atomic;
pub mod collider;
pub mod grid;
pub mod solver;
pub mod state;
pub mod simulation;

pub use collider::{BoxCollider, Capsule, Collider, ColliderSample, Dynamic, HeightField, Plane, Sphere};
pub use simulation::{NearestVertex, SoftbodySimulation};
pub use state::{AnchorDef, Geometry, GeometryHandle, InstanceHandle};
