//! Shared fixtures for the integration tests in this directory.

use nalgebra::Point3;
use tetrabody::SurfaceMesh;

/// Builds an icosphere of the given radius, subdivided `detail` times from a
/// regular icosahedron (detail 0 = the base 20-face icosahedron).
pub fn icosphere(radius: f64, detail: u32) -> SurfaceMesh {
    let t = (1.0 + 5.0_f64.sqrt()) / 2.0;
    let mut positions: Vec<Point3<f64>> = [
        (-1.0, t, 0.0),
        (1.0, t, 0.0),
        (-1.0, -t, 0.0),
        (1.0, -t, 0.0),
        (0.0, -1.0, t),
        (0.0, 1.0, t),
        (0.0, -1.0, -t),
        (0.0, 1.0, -t),
        (t, 0.0, -1.0),
        (t, 0.0, 1.0),
        (-t, 0.0, -1.0),
        (-t, 0.0, 1.0),
    ]
    .iter()
    .map(|&(x, y, z)| Point3::new(x, y, z))
    .collect();

    let mut faces: Vec<[u32; 3]> = vec![
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    for p in positions.iter_mut() {
        *p = Point3::from(p.coords.normalize());
    }

    let mut midpoint_cache = std::collections::HashMap::new();
    for _ in 0..detail {
        let mut next_faces = Vec::with_capacity(faces.len() * 4);
        for f in &faces {
            let a = midpoint(&mut positions, &mut midpoint_cache, f[0], f[1]);
            let b = midpoint(&mut positions, &mut midpoint_cache, f[1], f[2]);
            let c = midpoint(&mut positions, &mut midpoint_cache, f[2], f[0]);
            next_faces.push([f[0], a, c]);
            next_faces.push([f[1], b, a]);
            next_faces.push([f[2], c, b]);
            next_faces.push([a, b, c]);
        }
        faces = next_faces;
    }

    for p in positions.iter_mut() {
        *p = Point3::from(p.coords * radius);
    }

    SurfaceMesh { positions, faces }
}

fn midpoint(
    positions: &mut Vec<Point3<f64>>,
    cache: &mut std::collections::HashMap<(u32, u32), u32>,
    a: u32,
    b: u32,
) -> u32 {
    let key = if a < b { (a, b) } else { (b, a) };
    if let Some(&id) = cache.get(&key) {
        return id;
    }
    let mid = Point3::from((positions[a as usize].coords + positions[b as usize].coords).normalize());
    let id = positions.len() as u32;
    positions.push(mid);
    cache.insert(key, id);
    id
}
