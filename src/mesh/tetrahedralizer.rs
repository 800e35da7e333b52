//! Incremental Bowyer–Watson tetrahedralizer.

use std::collections::{HashMap, HashSet, VecDeque};

use log::{debug, warn};
use nalgebra::{Point3, Vector3};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

use crate::bvh::Bvh;
use crate::geometry::{quality, signed_volume, TET_FACES};
use crate::mesh::arena::{TId, TetArena, VId};
use crate::predicates;

/// A point with id and transient adjacency bookkeeping.
#[derive(Debug, Clone, Copy)]
pub struct Point {
    pub id: u32,
    pub position: Point3<f64>,
    pub adjacency_count: u32,
}

/// Input triangulated closed surface.
pub struct SurfaceMesh {
    pub positions: Vec<Point3<f64>>,
    pub faces: Vec<[u32; 3]>,
}

/// Tetrahedralizer options.
#[derive(Debug, Clone, Copy)]
pub struct TetraOptions {
    /// Interior sampling grid divisions along the longest AABB extent. `0`
    /// disables interior sampling.
    pub resolution: u32,
    /// Tets with `|quality| < min_quality` are dropped by the post-filter.
    pub min_quality: f64,
    pub verbose: bool,
}

impl Default for TetraOptions {
    fn default() -> Self {
        Self {
            resolution: 0,
            min_quality: 1e-3,
            verbose: false,
        }
    }
}

/// Output of a tetrahedralization: flat vertex/tet arrays plus the raw point
/// list for downstream attachment.
pub struct TetMesh {
    pub tet_verts: Vec<Point3<f64>>,
    pub tet_ids: Vec<[u32; 4]>,
    pub points: Vec<Point>,
}

impl TetMesh {
    pub fn tet_count(&self) -> usize {
        self.tet_ids.len()
    }
}

const DEDUP_SCALE: f64 = 1e6; // six decimal places
const PERTURB_EPS: f64 = 1e-4;

/// Tetrahedralizes a closed triangulated surface.
pub fn tetrahedralize(surface: &SurfaceMesh, opts: &TetraOptions) -> TetMesh {
    let bvh = Bvh::build(&surface.positions, &surface.faces);
    if bvh.is_none() {
        warn!("tetrahedralize: BVH build failed on degenerate surface, falling back to point-cloud mode");
    }
    run(&surface.positions, opts, bvh.as_ref())
}

/// Tetrahedralizes a raw point cloud; no interior sampling or containment
/// filtering is performed (there is no surface to sample against).
pub fn tetrahedralize_points(points: &[Point3<f64>], opts: &TetraOptions) -> TetMesh {
    run(points, opts, None)
}

fn run(input: &[Point3<f64>], opts: &TetraOptions, bvh: Option<&Bvh>) -> TetMesh {
    let mut points = dedup_and_perturb(input);

    if points.is_empty() {
        return TetMesh {
            tet_verts: Vec::new(),
            tet_ids: Vec::new(),
            points: Vec::new(),
        };
    }

    if let Some(bvh) = bvh {
        if opts.resolution > 0 {
            sample_interior(&mut points, opts.resolution, bvh);
        }
    }

    // Captured after interior sampling: every kept sample must be inserted
    // into the Bowyer-Watson mesh and survive into the output (spec.md §4.1
    // steps 5 and 7), not just the original dedup'd input points.
    let num_real = points.len();

    if points.len() < 4 {
        debug!("tetrahedralize: fewer than 4 points after dedup, returning empty mesh");
        return TetMesh {
            tet_verts: points.into_iter().map(|p| Point3::from(p)).collect(),
            tet_ids: Vec::new(),
            points: Vec::new(),
        };
    }

    let mut builder = Builder::new(points, num_real);
    builder.seed_super_tet();
    builder.insert_all();
    builder.finish(opts, bvh)
}

/// Six-decimal dedup plus an isotropic epsilon perturbation to break
/// degeneracies.
fn dedup_and_perturb(input: &[Point3<f64>]) -> Vec<Point3<f64>> {
    let mut seen: HashMap<(i64, i64, i64), ()> = HashMap::with_capacity(input.len());
    let mut rng = rand::thread_rng();
    let jitter = Uniform::new(-PERTURB_EPS, PERTURB_EPS);

    let mut out = Vec::with_capacity(input.len());
    for p in input {
        let key = (
            (p.x * DEDUP_SCALE).round() as i64,
            (p.y * DEDUP_SCALE).round() as i64,
            (p.z * DEDUP_SCALE).round() as i64,
        );
        if seen.insert(key, ()).is_some() {
            continue;
        }
        let jittered = Point3::new(
            p.x + jitter.sample(&mut rng),
            p.y + jitter.sample(&mut rng),
            p.z + jitter.sample(&mut rng),
        );
        out.push(jittered);
    }
    out
}

fn sample_interior(points: &mut Vec<Point3<f64>>, resolution: u32, bvh: &Bvh) {
    let (centroid, _radius) = bounds(points);
    let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
    let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points.iter() {
        min = min.inf(p);
        max = max.sup(p);
    }
    let extent = max - min;
    let h = extent.max() / resolution as f64;
    if h <= 0.0 {
        return;
    }

    let nx = ((extent.x / h).ceil() as i64).max(1);
    let ny = ((extent.y / h).ceil() as i64).max(1);
    let nz = ((extent.z / h).ceil() as i64).max(1);

    let mut kept = 0usize;
    for ix in 0..=nx {
        for iy in 0..=ny {
            for iz in 0..=nz {
                let p = Point3::new(
                    min.x + ix as f64 * h,
                    min.y + iy as f64 * h,
                    min.z + iz as f64 * h,
                );
                if bvh.is_inside(&p) && bvh.nearest_distance(&p) >= h / 2.0 {
                    points.push(p);
                    kept += 1;
                }
            }
        }
    }
    let _ = centroid;
    debug!("sample_interior: kept {kept} of {} candidate samples", (nx + 1) * (ny + 1) * (nz + 1));
}

fn bounds(points: &[Point3<f64>]) -> (Point3<f64>, f64) {
    let mut centroid = Vector3::zeros();
    for p in points {
        centroid += p.coords;
    }
    centroid /= points.len() as f64;
    let centroid = Point3::from(centroid);
    let radius = points
        .iter()
        .map(|p| (p - centroid).norm())
        .fold(0.0_f64, f64::max);
    (centroid, radius)
}

struct Builder {
    points: Vec<Point3<f64>>,
    num_real: usize,
    super_ids: [VId; 4],
    arena: TetArena,
    walk_epoch: u32,
    cavity_epoch: u32,
    last_tet: TId,
}

impl Builder {
    fn new(points: Vec<Point3<f64>>, num_real: usize) -> Self {
        Self {
            points,
            num_real,
            super_ids: [-1; 4],
            arena: TetArena::new(),
            walk_epoch: 0,
            cavity_epoch: 0,
            last_tet: -1,
        }
    }

    /// Appends the four super-tet vertices and seeds the arena with one
    /// enclosing tet.
    fn seed_super_tet(&mut self) {
        let (centroid, radius) = bounds(&self.points[..self.num_real]);
        let scale = 5.0 * radius.max(1.0);

        // Two orthogonal direction pairs of a regular tetrahedron's vertex
        // directions, guaranteeing the convex hull contains every input
        // point at this scale.
        let dirs = [
            Vector3::new(1.0, 1.0, 1.0).normalize(),
            Vector3::new(1.0, -1.0, -1.0).normalize(),
            Vector3::new(-1.0, 1.0, -1.0).normalize(),
            Vector3::new(-1.0, -1.0, 1.0).normalize(),
        ];

        for (i, d) in dirs.iter().enumerate() {
            let id = self.points.len() as VId;
            self.points.push(centroid + d * scale);
            self.super_ids[i] = id;
        }

        let [a, b, c, d] = self.super_ids;
        let verts = self.orient_positive([a, b, c, d]);
        let tet = self.arena.alloc(verts, [-1, -1, -1, -1]);
        self.arena.update_planes(tet, &self.points);
        self.last_tet = tet;
    }

    fn orient_positive(&self, v: [VId; 4]) -> [VId; 4] {
        let p = |i: VId| self.points[i as usize];
        if signed_volume(&p(v[0]), &p(v[1]), &p(v[2]), &p(v[3])) < 0.0 {
            [v[0], v[1], v[3], v[2]]
        } else {
            v
        }
    }

    fn insert_all(&mut self) {
        for idx in 0..self.num_real {
            self.insert_point(idx as VId);
        }
    }

    fn insert_point(&mut self, p_id: VId) {
        let p = self.points[p_id as usize];

        let Some(containing) = self.walk(self.last_tet, &p) else {
            warn!("insert_point: walk failed to locate vertex {p_id}, skipping");
            return;
        };

        let cavity = self.flood_cavity(containing, &p);

        // Boundary faces: a cavity tet's face whose neighbour is outside the
        // cavity.
        let cavity_set: HashSet<TId> = cavity.iter().copied().collect();
        let mut boundary: Vec<(VId, VId, VId, TId)> = Vec::new();
        for &t in &cavity {
            let verts = self.arena.verts(t);
            let neighbors = self.arena.neighbors(t);
            for (slot, face) in TET_FACES.iter().enumerate() {
                let n = neighbors[slot];
                if n == -1 || !cavity_set.contains(&n) {
                    boundary.push((verts[face[0]], verts[face[1]], verts[face[2]], n));
                }
            }
        }

        for &t in &cavity {
            self.arena.delete(t);
        }

        // Re-stitch: one new tet per boundary face.
        let mut new_tets: Vec<TId> = Vec::with_capacity(boundary.len());
        for &(a, b, c, outside) in &boundary {
            let verts = self.orient_positive([a, b, c, p_id]);
            let new_tet = self.arena.alloc(verts, [-1, -1, -1, -1]);
            new_tets.push(new_tet);

            if outside != -1 {
                self.arena.set_neighbor(new_tet, 0, outside);
                if let Some(slot) = self.arena.find_face_slot(outside, a, b, c) {
                    self.arena.set_neighbor(outside, slot, new_tet);
                }
            }
        }

        self.stitch_fan(&new_tets);

        for &t in &new_tets {
            self.arena.update_planes(t, &self.points);
        }

        if let Some(&t) = new_tets.first() {
            self.last_tet = t;
        }
    }

    /// Walks from `start` toward `p`, crossing the face whose parametric
    /// intersection `t` is smallest, stopping once all four faces report
    /// `t >= 1`.
    fn walk(&mut self, start: TId, p: &Point3<f64>) -> Option<TId> {
        self.walk_epoch += 1;
        let epoch = self.walk_epoch;
        let mut current = if start == -1 || self.arena.is_deleted(start) {
            self.arena.slot_ids().find(|&t| !self.arena.is_deleted(t))?
        } else {
            start
        };

        loop {
            if self.arena.mark_of(current) == epoch {
                return None; // cycle: walk failure
            }
            self.arena.set_mark(current, epoch);

            let centroid = self.arena.centroid(current, &self.points);
            let mut best_t = f64::INFINITY;
            let mut best_face = None;
            for face in 0..4 {
                let hp = self.arena.face_signed_distance(current, face, p);
                let hc = self.arena.face_signed_distance(current, face, &centroid);
                let denom = hp - hc;
                if denom >= 0.0 {
                    continue;
                }
                let t = -hc / denom;
                if t >= 0.0 && t < best_t {
                    best_t = t;
                    best_face = Some(face);
                }
            }

            match best_face {
                None => return Some(current), // all t >= 1 (or no crossing face): inside
                Some(_) if best_t >= 1.0 => return Some(current),
                Some(face) => {
                    let next = self.arena.neighbors(current)[face];
                    if next == -1 {
                        return Some(current); // at the outer boundary of the mesh
                    }
                    current = next;
                }
            }
        }
    }

    /// Flood-fills from `containing`, accepting tets whose open circumsphere
    /// contains `p`.
    fn flood_cavity(&mut self, containing: TId, p: &Point3<f64>) -> Vec<TId> {
        self.cavity_epoch += 1;
        let epoch = self.cavity_epoch;

        let mut cavity = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(containing);
        self.arena.set_mark(containing, u32::MAX - epoch); // distinct namespace from walk marks

        while let Some(t) = queue.pop_front() {
            if !self.violates(t, p) {
                continue;
            }
            cavity.push(t);
            for n in self.arena.neighbors(t) {
                if n == -1 || self.arena.is_deleted(n) {
                    continue;
                }
                let tag = u32::MAX - epoch;
                if self.arena.mark_of(n) == tag {
                    continue;
                }
                self.arena.set_mark(n, tag);
                queue.push_back(n);
            }
        }
        cavity
    }

    fn violates(&self, t: TId, p: &Point3<f64>) -> bool {
        let v = self.arena.verts(t);
        let pt = |i: VId| self.points[i as usize];
        let (a, b, c, d) = (pt(v[0]), pt(v[1]), pt(v[2]), pt(v[3]));

        if signed_volume(&a, &b, &c, &d).abs() < 1e-10 {
            debug!("violates: degenerate circumsphere determinant, treating as non-violating");
            return false;
        }

        predicates::in_sphere_3d(&a, &b, &c, &d, p) > 0.0
    }

    /// Cross-links the new tets created around the inserted point by sorting
    /// their non-boundary edges lexicographically.
    fn stitch_fan(&mut self, new_tets: &[TId]) {
        // For vertex layout [fa, fb, fc, p] (p at local index 3):
        //  face 1 = [0,1,3] opposite fc -> edge (fa, fb)
        //  face 2 = [1,2,3] opposite fa -> edge (fb, fc)
        //  face 3 = [2,0,3] opposite fb -> edge (fc, fa)
        const EDGE_FOR_SLOT: [[usize; 2]; 3] = [[0, 1], [1, 2], [2, 0]];

        let mut entries: Vec<(VId, VId, TId, usize)> = Vec::with_capacity(new_tets.len() * 3);
        for &t in new_tets {
            let v = self.arena.verts(t);
            for (i, slot) in [1usize, 2, 3].into_iter().enumerate() {
                let [e0, e1] = EDGE_FOR_SLOT[i];
                let (a, b) = (v[e0], v[e1]);
                let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                entries.push((lo, hi, t, slot));
            }
        }

        entries.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));

        let mut i = 0;
        while i + 1 < entries.len() {
            let (lo0, hi0, t0, s0) = entries[i];
            let (lo1, hi1, t1, s1) = entries[i + 1];
            if lo0 == lo1 && hi0 == hi1 {
                self.arena.set_neighbor(t0, s0, t1);
                self.arena.set_neighbor(t1, s1, t0);
                i += 2;
            } else {
                i += 1;
            }
        }
    }

    fn finish(self, opts: &TetraOptions, bvh: Option<&Bvh>) -> TetMesh {
        let Builder {
            points,
            num_real,
            super_ids,
            arena,
            ..
        } = self;

        let super_set: HashSet<VId> = super_ids.iter().copied().collect();
        let mut kept: Vec<[u32; 4]> = Vec::new();
        let mut adjacency = vec![0u32; num_real];

        for t in arena.slot_ids() {
            if arena.is_deleted(t) {
                continue;
            }
            let v = arena.verts(t);
            if v.iter().any(|id| super_set.contains(id)) {
                continue;
            }

            let pt = |i: VId| points[i as usize];
            let (a, b, c, d) = (pt(v[0]), pt(v[1]), pt(v[2]), pt(v[3]));
            let q = quality(&a, &b, &c, &d);
            if q.abs() < opts.min_quality {
                continue;
            }

            if let Some(bvh) = bvh {
                let centroid = nalgebra::center(&nalgebra::center(&a, &b), &nalgebra::center(&c, &d));
                if !bvh.is_inside(&centroid) {
                    continue;
                }
            }

            for id in &v {
                adjacency[*id as usize] += 1;
            }
            kept.push([v[0] as u32, v[1] as u32, v[2] as u32, v[3] as u32]);
        }

        let tet_verts: Vec<Point3<f64>> = points[..num_real].to_vec();
        let point_list = tet_verts
            .iter()
            .enumerate()
            .map(|(i, &position)| Point {
                id: i as u32,
                position,
                adjacency_count: adjacency[i],
            })
            .collect();

        TetMesh {
            tet_verts,
            tet_ids: kept,
            points: point_list,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_corners() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 2.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
            Point3::new(0.0, 0.0, 2.0),
            Point3::new(2.0, 0.0, 2.0),
            Point3::new(2.0, 2.0, 2.0),
            Point3::new(0.0, 2.0, 2.0),
        ]
    }

    #[test]
    fn empty_point_cloud_returns_empty_mesh() {
        let mesh = tetrahedralize_points(&[], &TetraOptions::default());
        assert_eq!(mesh.tet_count(), 0);
    }

    #[test]
    fn single_tet_input_yields_one_tet() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let opts = TetraOptions {
            min_quality: 0.0,
            ..Default::default()
        };
        let mesh = tetrahedralize_points(&points, &opts);
        assert_eq!(mesh.tet_count(), 1);
    }

    #[test]
    fn cube_corners_tetrahedralize_to_positive_volume() {
        let points = cube_corners();
        let opts = TetraOptions {
            min_quality: 0.0,
            ..Default::default()
        };
        let mesh = tetrahedralize_points(&points, &opts);
        assert!(mesh.tet_count() >= 5, "expected at least 5 tets, got {}", mesh.tet_count());

        let mut total_volume = 0.0;
        for t in &mesh.tet_ids {
            let p = |i: u32| mesh.tet_verts[i as usize];
            let v = signed_volume(&p(t[0]), &p(t[1]), &p(t[2]), &p(t[3]));
            assert!(v > 0.0, "tet has non-positive volume: {v}");
            total_volume += v;
        }
        assert!((total_volume - 8.0).abs() < 1e-6, "total volume was {total_volume}");
    }

    #[test]
    fn coincident_points_are_deduplicated() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let deduped = dedup_and_perturb(&points);
        assert_eq!(deduped.len(), 4);
    }
}
