//! Abstract compute device (`spec.md` §9, "GPU binding to an abstract
//! compute device").
//!
//! The solver composes its substep into a fixed pipeline of data-parallel
//! kernels, each a barrier: every thread of one kernel finishes before the
//! next kernel starts, matching the ordering guarantee of `spec.md` §5. The
//! [`ComputeDevice`] trait is the interface that boundary crosses; the only
//! implementation shipped here is [`CpuDevice`], which dispatches kernels
//! across host threads via `rayon` — the in-process stand-in for an
//! accelerator the design notes call for in property tests. A real GPU
//! backend would implement the same trait against a shader-compute API, but
//! that integration lives outside this crate's scope (see `spec.md` §1).

use rayon::prelude::*;

/// A device capable of running data-parallel kernels over `0..count`.
///
/// `dispatch` is a full barrier: it does not return until every thread has
/// finished, mirroring the "between kernels, the host imposes a barrier"
/// contract of `spec.md` §5.
pub trait ComputeDevice: Send + Sync {
    /// Runs `kernel(i)` for every `i` in `0..count`, with no ordering
    /// guarantee between indices, and returns once all have completed.
    fn dispatch(&self, count: usize, kernel: &(dyn Fn(usize) + Sync));
}

/// Host-thread compute device backed by `rayon`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuDevice;

impl ComputeDevice for CpuDevice {
    fn dispatch(&self, count: usize, kernel: &(dyn Fn(usize) + Sync)) {
        (0..count).into_par_iter().for_each(kernel);
    }
}
