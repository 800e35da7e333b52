//! Spatial grid broadphase: fixed lattice or open-addressed hash, atomic
//! linked-list head per cell (`spec.md` §4.5).
//!
//! Each cell stores the id of its head tet; tets chain through their own
//! `next_tet` slot (owned by [`super::state::SimulationState`]). Insertion is
//! an atomic exchange on the cell head, mirroring the GPU kernel this models:
//! the inserting thread swaps its id into the cell and threads the prior head
//! through its own `next_tet`. A toggle switches the cell array between
//! "accepting concurrent inserts" and "safe for concurrent reads" — `spec.md`
//! §4.5's contract that "readers must not run concurrently with writers."

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use nalgebra::Point3;

use crate::device::ComputeDevice;

const LATTICE_DIM: i64 = 80;
const LATTICE_CELLS: usize = (LATTICE_DIM * LATTICE_DIM * LATTICE_DIM) as usize;
/// A prime near 2^20, used as the hash table's slot count.
const HASH_TABLE_SIZE: usize = 1_048_573;

const EMPTY: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridMode {
    /// Fixed 80³ cell cube, wrapped by modulo.
    Lattice,
    /// Open-addressed table indexed by a MurmurHash3-style integer hash.
    Hash,
}

/// MurmurHash3's 32-bit integer finalizer (fmix32), used to scramble a cell
/// coordinate into a table slot (`spec.md` §4.5, "MurmurHash3-style integer
/// hash of the cell coordinate").
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}

fn hash_coord(x: i64, y: i64, z: i64) -> u32 {
    let hx = fmix32(x as u32);
    let hy = fmix32((y as u32) ^ 0x9e3779b9);
    let hz = fmix32((z as u32) ^ 0x85ebca6b);
    fmix32(hx ^ hy.rotate_left(11) ^ hz.rotate_left(23))
}

/// Spatial partition over tet centroids, rebuilt every physics step.
pub struct SpatialGrid {
    mode: GridMode,
    cell_size: f64,
    cells: Vec<AtomicI64>,
    atomic_enabled: AtomicBool,
}

impl SpatialGrid {
    pub fn new(mode: GridMode, cell_size: f64) -> Self {
        let count = match mode {
            GridMode::Lattice => LATTICE_CELLS,
            GridMode::Hash => HASH_TABLE_SIZE,
        };
        let cells = (0..count).map(|_| AtomicI64::new(EMPTY)).collect();
        Self {
            mode,
            cell_size: cell_size.max(1e-6),
            cells,
            atomic_enabled: AtomicBool::new(false),
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Toggles between the "writers may insert concurrently" view and the
    /// "readers may traverse safely" view. Must straddle each insertion
    /// phase per `spec.md` §5.
    pub fn set_atomic_mode(&self, enabled: bool) {
        self.atomic_enabled.store(enabled, Ordering::SeqCst);
    }

    fn cell_coord(&self, pos: &Point3<f64>) -> (i64, i64, i64) {
        (
            (pos.x / self.cell_size).floor() as i64,
            (pos.y / self.cell_size).floor() as i64,
            (pos.z / self.cell_size).floor() as i64,
        )
    }

    fn index_for_coord(&self, coord: (i64, i64, i64)) -> usize {
        match self.mode {
            GridMode::Lattice => {
                let wrap = |v: i64| ((v % LATTICE_DIM) + LATTICE_DIM) % LATTICE_DIM;
                let (x, y, z) = (wrap(coord.0), wrap(coord.1), wrap(coord.2));
                (x * LATTICE_DIM * LATTICE_DIM + y * LATTICE_DIM + z) as usize
            }
            GridMode::Hash => (hash_coord(coord.0, coord.1, coord.2) as usize) % HASH_TABLE_SIZE,
        }
    }

    pub fn cell_index(&self, pos: &Point3<f64>) -> usize {
        self.index_for_coord(self.cell_coord(pos))
    }

    /// Resets every cell head to `-1`.
    pub fn clear(&self, device: &dyn ComputeDevice) {
        device.dispatch(self.cells.len(), &|i| {
            self.cells[i].store(EMPTY, Ordering::Relaxed);
        });
    }

    /// Atomically inserts `tet_id` into the cell covering `pos`, threading
    /// the previous head through `next_tet_slot`. Requires atomic mode.
    pub fn insert(&self, tet_id: i64, pos: &Point3<f64>, next_tet_slot: &AtomicI64) {
        debug_assert!(
            self.atomic_enabled.load(Ordering::SeqCst),
            "grid insert requires atomic mode enabled"
        );
        let idx = self.cell_index(pos);
        let prev = self.cells[idx].swap(tet_id, Ordering::AcqRel);
        next_tet_slot.store(prev, Ordering::Relaxed);
    }

    pub fn cell_head(&self, idx: usize) -> i64 {
        self.cells[idx].load(Ordering::Relaxed)
    }

    /// The 27 (3x3x3) cell indices surrounding `pos`'s cell, for broadphase
    /// candidate queries.
    pub fn neighbor_cells(&self, pos: &Point3<f64>) -> Vec<usize> {
        let (cx, cy, cz) = self.cell_coord(pos);
        let mut out = Vec::with_capacity(27);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    out.push(self.index_for_coord((cx + dx, cy + dy, cz + dz)));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CpuDevice;
    use rayon::prelude::*;

    #[test]
    fn clear_resets_every_cell() {
        let grid = SpatialGrid::new(GridMode::Lattice, 1.0);
        grid.set_atomic_mode(true);
        let next = AtomicI64::new(EMPTY);
        grid.insert(7, &Point3::new(0.5, 0.5, 0.5), &next);
        grid.clear(&CpuDevice);
        let idx = grid.cell_index(&Point3::new(0.5, 0.5, 0.5));
        assert_eq!(grid.cell_head(idx), EMPTY);
    }

    #[test]
    fn linked_list_visits_every_inserted_tet_exactly_once() {
        let grid = SpatialGrid::new(GridMode::Lattice, 1.0);
        grid.set_atomic_mode(true);
        let pos = Point3::new(0.2, 0.2, 0.2);
        let next_slots: Vec<AtomicI64> = (0..50).map(|_| AtomicI64::new(EMPTY)).collect();
        (0..50i64).into_par_iter().for_each(|i| {
            grid.insert(i, &pos, &next_slots[i as usize]);
        });

        let idx = grid.cell_index(&pos);
        let mut seen = vec![false; 50];
        let mut cur = grid.cell_head(idx);
        let mut visits = 0;
        while cur != EMPTY {
            assert!(!seen[cur as usize], "tet {cur} visited twice");
            seen[cur as usize] = true;
            cur = next_slots[cur as usize].load(Ordering::Relaxed);
            visits += 1;
        }
        assert_eq!(visits, 50);
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn lattice_wraps_negative_coordinates() {
        let grid = SpatialGrid::new(GridMode::Lattice, 1.0);
        let idx = grid.cell_index(&Point3::new(-1.0, -1.0, -1.0));
        assert!(idx < LATTICE_CELLS);
    }

    #[test]
    fn neighbor_cells_returns_27_entries() {
        let grid = SpatialGrid::new(GridMode::Hash, 1.0);
        assert_eq!(grid.neighbor_cells(&Point3::origin()).len(), 27);
    }
}
