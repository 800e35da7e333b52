//! Caller-visible error types.
//!
//! Per the error-handling design: parameter and lifecycle errors surface to
//! the caller as [`TetraError`]; numerical degeneracies (`DegenerateTet`,
//! `WalkFailure`, `CollisionCallbackReturnedNaN`, `BVHBuildFailure`) are
//! absorbed locally and only logged (see the call sites in
//! [`crate::mesh::tetrahedralizer`] and [`crate::sim::solver`]).

use thiserror::Error;

/// Errors returned to callers of the meshing and simulation APIs.
#[derive(Debug, Error)]
pub enum TetraError {
    /// `bake()` was called with no vertices or no tets registered.
    #[error("cannot bake: simulation has {vertex_count} vertices and {tet_count} tets")]
    EmptyBake {
        vertex_count: usize,
        tet_count: usize,
    },

    /// `reset_object`/`spawn`/`despawn` referenced an instance id beyond the
    /// registered range.
    #[error("instance id {id} is out of range (registered: {registered})")]
    ResetOutOfRange { id: usize, registered: usize },

    /// More than `max_anchors` anchors were registered.
    #[error("anchor limit reached: {max} anchors already registered")]
    AnchorOverflow { max: usize },

    /// A geometry handle or instance handle referenced a row that was never
    /// registered with `add_geometry`/`add_instance`.
    #[error("unknown handle: {0}")]
    UnknownHandle(&'static str),

    /// The simulator was queried before `bake()` completed.
    #[error("simulation has not been baked yet")]
    NotBaked,
}

pub type Result<T> = std::result::Result<T, TetraError>;
