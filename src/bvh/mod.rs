//! Bounding-volume hierarchy over a closed triangle surface.
//!
//! Used by the tetrahedralizer to classify points as inside/outside the
//! input surface (interior sampling, post-filter by containment) and to
//! reject interior samples that crowd the boundary (`spec.md` §4.2).

use nalgebra::{Point3, Vector3};

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Point3<f64>,
    max: Point3<f64>,
}

impl Aabb {
    fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    fn grow(&mut self, p: &Point3<f64>) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    fn centroid(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    /// Slab-test ray/AABB intersection; returns the entry `t` if it is >= 0.
    fn hit(&self, origin: &Point3<f64>, dir: &Vector3<f64>) -> Option<f64> {
        let mut tmin = f64::NEG_INFINITY;
        let mut tmax = f64::INFINITY;
        for axis in 0..3 {
            let o = origin[axis];
            let d = dir[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);
            if d.abs() < 1e-15 {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / d;
            let mut t0 = (lo - o) * inv;
            let mut t1 = (hi - o) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            tmin = tmin.max(t0);
            tmax = tmax.min(t1);
            if tmin > tmax {
                return None;
            }
        }
        if tmax < 0.0 {
            None
        } else {
            Some(tmin.max(0.0))
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Triangle {
    v: [Point3<f64>; 3],
    normal: Vector3<f64>,
}

impl Triangle {
    fn new(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Self {
        let normal = (b - a).cross(&(c - a));
        let normal = if normal.norm_squared() > 0.0 {
            normal.normalize()
        } else {
            Vector3::zeros()
        };
        Self { v: [a, b, c], normal }
    }

    fn aabb(&self) -> Aabb {
        let mut bb = Aabb::empty();
        for p in &self.v {
            bb.grow(p);
        }
        bb
    }

    /// Möller–Trumbore ray/triangle intersection. Returns `t` for hits in
    /// front of the ray origin.
    fn intersect(&self, origin: &Point3<f64>, dir: &Vector3<f64>) -> Option<f64> {
        const EPS: f64 = 1e-12;
        let edge1 = self.v[1] - self.v[0];
        let edge2 = self.v[2] - self.v[0];
        let pvec = dir.cross(&edge2);
        let det = edge1.dot(&pvec);
        if det.abs() < EPS {
            return None;
        }
        let inv_det = 1.0 / det;
        let tvec = origin - self.v[0];
        let u = tvec.dot(&pvec) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let qvec = tvec.cross(&edge1);
        let v = dir.dot(&qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = edge2.dot(&qvec) * inv_det;
        if t < 0.0 { None } else { Some(t) }
    }

    /// Squared distance from `p` to the closest point on the triangle.
    fn distance_squared(&self, p: &Point3<f64>) -> f64 {
        closest_point_on_triangle(p, &self.v[0], &self.v[1], &self.v[2])
            .metric_distance(p)
            .powi(2)
    }
}

fn closest_point_on_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Point3<f64> {
    // Standard Ericson "Real-Time Collision Detection" closest-point-on-triangle.
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

enum Node {
    Leaf { bounds: Aabb, tris: Vec<u32> },
    Inner { bounds: Aabb, left: Box<Node>, right: Box<Node> },
}

impl Node {
    fn bounds(&self) -> &Aabb {
        match self {
            Node::Leaf { bounds, .. } => bounds,
            Node::Inner { bounds, .. } => bounds,
        }
    }
}

const LEAF_SIZE: usize = 4;

/// Bounding-volume hierarchy over a triangle soup, used for inside/outside
/// classification and nearest-surface queries.
pub struct Bvh {
    tris: Vec<Triangle>,
    root: Option<Node>,
}

impl Bvh {
    /// Builds a BVH from a triangle soup given as flat positions and
    /// 3-index faces. Returns `None` if the input has no triangles
    /// (`spec.md` §7, `BVHBuildFailure`).
    pub fn build(positions: &[Point3<f64>], faces: &[[u32; 3]]) -> Option<Self> {
        if faces.is_empty() {
            return None;
        }
        let tris: Vec<Triangle> = faces
            .iter()
            .map(|f| {
                Triangle::new(
                    positions[f[0] as usize],
                    positions[f[1] as usize],
                    positions[f[2] as usize],
                )
            })
            .collect();
        let indices: Vec<u32> = (0..tris.len() as u32).collect();
        let root = Self::build_node(&tris, indices);
        Some(Self { tris, root: Some(root) })
    }

    fn build_node(tris: &[Triangle], mut indices: Vec<u32>) -> Node {
        let mut bounds = Aabb::empty();
        for &i in &indices {
            bounds = bounds.union(&tris[i as usize].aabb());
        }

        if indices.len() <= LEAF_SIZE {
            return Node::Leaf { bounds, tris: indices };
        }

        let extent = bounds.max - bounds.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };

        indices.sort_by(|&a, &b| {
            let ca = tris[a as usize].aabb().centroid()[axis];
            let cb = tris[b as usize].aabb().centroid()[axis];
            ca.partial_cmp(&cb).unwrap()
        });

        let mid = indices.len() / 2;
        let right_indices = indices.split_off(mid);
        let left = Self::build_node(tris, indices);
        let right = Self::build_node(tris, right_indices);
        Node::Inner {
            bounds,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Casts a ray and returns the nearest hit `(t, outward normal)`, if any.
    fn cast(&self, origin: &Point3<f64>, dir: &Vector3<f64>) -> Option<(f64, Vector3<f64>)> {
        let root = self.root.as_ref()?;
        let mut best: Option<(f64, Vector3<f64>)> = None;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.bounds().hit(origin, dir).is_none() {
                continue;
            }
            match node {
                Node::Leaf { tris, .. } => {
                    for &i in tris {
                        let tri = &self.tris[i as usize];
                        if let Some(t) = tri.intersect(origin, dir) {
                            if best.map_or(true, |(bt, _)| t < bt) {
                                best = Some((t, tri.normal));
                            }
                        }
                    }
                }
                Node::Inner { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
        best
    }

    /// Squared distance from `p` to the closest point on the surface, found
    /// by a conservative BVH-pruned search.
    pub fn nearest_distance(&self, p: &Point3<f64>) -> f64 {
        let Some(root) = self.root.as_ref() else {
            return f64::INFINITY;
        };
        let mut best = f64::INFINITY;
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let bb = node.bounds();
            let closest = p.coords.zip_map(&bb.min.coords, |c, lo| c.max(lo));
            let closest = closest.zip_map(&bb.max.coords, |c, hi| c.min(hi));
            let dist_to_box = (closest - p.coords).norm_squared();
            if dist_to_box > best {
                continue;
            }
            match node {
                Node::Leaf { tris, .. } => {
                    for &i in tris {
                        let d = self.tris[i as usize].distance_squared(p);
                        if d < best {
                            best = d;
                        }
                    }
                }
                Node::Inner { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }
        best.sqrt()
    }

    /// Classifies `p` as inside/outside the surface by the six-ray majority
    /// vote described in `spec.md` §4.2: cast rays along ±x, ±y, ±z and count
    /// how many indicate "entering" (ray direction aligned with the hit
    /// normal). Inside iff more than three of the six agree.
    pub fn is_inside(&self, p: &Point3<f64>) -> bool {
        const AXES: [Vector3<f64>; 6] = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.0, 0.0, -1.0),
        ];

        let mut votes = 0;
        for dir in AXES.iter() {
            if let Some((_, normal)) = self.cast(p, dir) {
                // Entering iff the ray travels against the outward normal.
                if dir.dot(&normal) < 0.0 {
                    votes += 1;
                }
            }
        }
        votes > 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cube() -> (Vec<Point3<f64>>, Vec<[u32; 3]>) {
        let positions = vec![
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(1.0, -1.0, -1.0),
            Point3::new(1.0, 1.0, -1.0),
            Point3::new(-1.0, 1.0, -1.0),
            Point3::new(-1.0, -1.0, 1.0),
            Point3::new(1.0, -1.0, 1.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(-1.0, 1.0, 1.0),
        ];
        // Outward-facing triangles for each of the 6 faces.
        let faces = vec![
            [0, 3, 2], [0, 2, 1], // -z
            [4, 5, 6], [4, 6, 7], // +z
            [0, 1, 5], [0, 5, 4], // -y
            [3, 7, 6], [3, 6, 2], // +y
            [0, 4, 7], [0, 7, 3], // -x
            [1, 2, 6], [1, 6, 5], // +x
        ];
        (positions, faces)
    }

    #[test]
    fn classifies_centroid_inside() {
        let (p, f) = unit_cube();
        let bvh = Bvh::build(&p, &f).unwrap();
        assert!(bvh.is_inside(&Point3::new(0.0, 0.0, 0.0)));
    }

    #[test]
    fn classifies_far_point_outside() {
        let (p, f) = unit_cube();
        let bvh = Bvh::build(&p, &f).unwrap();
        assert!(!bvh.is_inside(&Point3::new(5.0, 5.0, 5.0)));
    }

    #[test]
    fn empty_faces_fails_to_build() {
        let (p, _) = unit_cube();
        assert!(Bvh::build(&p, &[]).is_none());
    }

    #[test]
    fn nearest_distance_to_face_is_small() {
        let (p, f) = unit_cube();
        let bvh = Bvh::build(&p, &f).unwrap();
        let d = bvh.nearest_distance(&Point3::new(0.99, 0.0, 0.0));
        assert!(d < 0.02, "distance was {d}");
    }
}
