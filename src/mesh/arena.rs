//! Dense arena-of-tets storage for a cyclic, pointer-graph tet mesh.
//!
//! Every tet is a slot in a handful of parallel arrays: vertex ids, face
//! neighbours, face planes, and a generation mark used for cycle detection
//! during the walk and for cavity flood-fills. Deletion is soft — a deleted
//! slot's vertex tuple becomes `[-1, next_free, -1, -1]`, threading a free
//! list through slot 1 so re-insertion can recycle space in O(1) without
//! shifting anything else.

use nalgebra::{Point3, Vector3};

use crate::geometry::TET_FACES;

/// Id of a vertex within the tetrahedralizer's point list. `-1` is only ever
/// used as the free-list sentinel in a deleted tet's slot 0.
pub type VId = i32;

/// Id of a tet within a [`TetArena`]. `-1` means "no neighbour" (boundary).
pub type TId = i32;

const NONE: TId = -1;
const DELETED: VId = -1;

#[derive(Debug, Clone, Copy)]
struct FacePlane {
    normal: Vector3<f64>,
    offset: f64,
}

impl FacePlane {
    fn signed_distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) - self.offset
    }
}

/// Dense storage for a live (and soft-deleted) set of tetrahedra.
pub struct TetArena {
    verts: Vec<[VId; 4]>,
    neighbors: Vec<[TId; 4]>,
    planes: Vec<[FacePlane; 4]>,
    mark: Vec<u32>,
    free_head: TId,
    live_count: usize,
}

impl TetArena {
    pub fn new() -> Self {
        Self {
            verts: Vec::new(),
            neighbors: Vec::new(),
            planes: Vec::new(),
            mark: Vec::new(),
            free_head: NONE,
            live_count: 0,
        }
    }

    pub fn num_slots(&self) -> usize {
        self.verts.len()
    }

    pub fn num_live(&self) -> usize {
        self.live_count
    }

    pub fn is_deleted(&self, id: TId) -> bool {
        self.verts[id as usize][0] == DELETED
    }

    pub fn verts(&self, id: TId) -> [VId; 4] {
        self.verts[id as usize]
    }

    pub fn neighbors(&self, id: TId) -> [TId; 4] {
        self.neighbors[id as usize]
    }

    pub fn set_neighbor(&mut self, id: TId, slot: usize, neighbor: TId) {
        self.neighbors[id as usize][slot] = neighbor;
    }

    pub fn mark_of(&self, id: TId) -> u32 {
        self.mark[id as usize]
    }

    pub fn set_mark(&mut self, id: TId, m: u32) {
        self.mark[id as usize] = m;
    }

    /// Allocates a tet, reusing a free-list slot if one is available.
    pub fn alloc(&mut self, verts: [VId; 4], neighbors: [TId; 4]) -> TId {
        self.live_count += 1;
        if self.free_head != NONE {
            let id = self.free_head;
            self.free_head = self.verts[id as usize][1];
            self.verts[id as usize] = verts;
            self.neighbors[id as usize] = neighbors;
            self.mark[id as usize] = 0;
            id
        } else {
            self.verts.push(verts);
            self.neighbors.push(neighbors);
            self.planes.push([FacePlane { normal: Vector3::zeros(), offset: 0.0 }; 4]);
            self.mark.push(0);
            (self.verts.len() - 1) as TId
        }
    }

    /// Soft-deletes a tet, threading it onto the free list.
    pub fn delete(&mut self, id: TId) {
        debug_assert!(!self.is_deleted(id), "double delete of tet {id}");
        self.verts[id as usize] = [DELETED, self.free_head, DELETED, DELETED];
        self.free_head = id;
        self.live_count -= 1;
    }

    /// Recomputes the outward face planes of a tet from its current vertex
    /// positions. `points` is the tetrahedralizer's full point list (indexed
    /// by [`VId`]).
    pub fn update_planes(&mut self, id: TId, points: &[Point3<f64>]) {
        let vids = self.verts[id as usize];
        let p = [
            points[vids[0] as usize],
            points[vids[1] as usize],
            points[vids[2] as usize],
            points[vids[3] as usize],
        ];
        for (k, face) in TET_FACES.iter().enumerate() {
            let (a, b, c) = (p[face[0]], p[face[1]], p[face[2]]);
            let mut normal = (b - a).cross(&(c - a));
            let norm = normal.norm();
            if norm > 1e-18 {
                normal /= norm;
            }
            let offset = normal.dot(&a.coords);
            self.planes[id as usize][k] = FacePlane { normal, offset };
        }
    }

    /// Signed distance of `p` to face `face_idx` of tet `id` (positive means
    /// `p` is on the same side as the tet's interior).
    pub fn face_signed_distance(&self, id: TId, face_idx: usize, p: &Point3<f64>) -> f64 {
        self.planes[id as usize][face_idx].signed_distance(p)
    }

    pub fn centroid(&self, id: TId, points: &[Point3<f64>]) -> Point3<f64> {
        let v = self.verts[id as usize];
        nalgebra::center(
            &nalgebra::center(&points[v[0] as usize], &points[v[1] as usize]),
            &nalgebra::center(&points[v[2] as usize], &points[v[3] as usize]),
        )
    }

    /// Iterates all slot ids, including deleted ones (callers should check
    /// [`TetArena::is_deleted`]).
    pub fn slot_ids(&self) -> impl Iterator<Item = TId> {
        0..self.verts.len() as TId
    }

    /// Finds which of `other`'s four face slots matches the vertex set
    /// `{a, b, c}`, used to re-point the tet across a cavity boundary at an
    /// already-existing neighbour.
    pub fn find_face_slot(&self, other: TId, a: VId, b: VId, c: VId) -> Option<usize> {
        let ov = self.verts[other as usize];
        for (slot, face) in TET_FACES.iter().enumerate() {
            let set = [ov[face[0]], ov[face[1]], ov[face[2]]];
            if contains_same(&set, a, b, c) {
                return Some(slot);
            }
        }
        None
    }
}

fn contains_same(set: &[VId; 3], a: VId, b: VId, c: VId) -> bool {
    let want = [a, b, c];
    want.iter().all(|w| set.contains(w)) && set.iter().all(|s| want.contains(s))
}

impl Default for TetArena {
    fn default() -> Self {
        Self::new()
    }
}
