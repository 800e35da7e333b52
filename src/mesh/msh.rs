//! Gmsh-style `.msh` text import/export.
//!
//! Only the node and tetrahedral-element blocks are handled; other element
//! types in an `$Elements` section (points, lines, triangles) are skipped.
//! Node and element indices in the file format are 1-based; they are
//! translated to/from the crate's 0-based ids at the boundary.

use nalgebra::Point3;

/// A parsed (or to-be-serialized) tetrahedral mesh, independent of how it was
/// produced.
#[derive(Debug, Clone, PartialEq)]
pub struct MshMesh {
    pub nodes: Vec<Point3<f64>>,
    pub tets: Vec<[u32; 4]>,
}

/// Gmsh element-type code for a 4-node tetrahedron.
const MSH_ELEM_TET4: u32 = 4;

/// Parses a Gmsh-style `.msh` file's `$Nodes`/`$Elements` blocks.
///
/// Element records are recognised as tets either by an explicit type code of
/// `4`, or — for terser hand-written fixtures — by simply ending in four
/// integer indices after the element-id and type/tag columns.
pub fn parse_msh(text: &str) -> MshMesh {
    let mut nodes = Vec::new();
    let mut tets = Vec::new();

    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        match line.trim() {
            "$Nodes" => {
                let count: usize = lines.next().unwrap_or("0").trim().parse().unwrap_or(0);
                nodes.reserve(count);
                for _ in 0..count {
                    let Some(l) = lines.next() else { break };
                    let cols: Vec<&str> = l.split_whitespace().collect();
                    if cols.len() < 4 {
                        continue;
                    }
                    let x: f64 = cols[1].parse().unwrap_or(0.0);
                    let y: f64 = cols[2].parse().unwrap_or(0.0);
                    let z: f64 = cols[3].parse().unwrap_or(0.0);
                    nodes.push(Point3::new(x, y, z));
                }
            }
            "$Elements" => {
                let count: usize = lines.next().unwrap_or("0").trim().parse().unwrap_or(0);
                for _ in 0..count {
                    let Some(l) = lines.next() else { break };
                    let cols: Vec<i64> = l
                        .split_whitespace()
                        .filter_map(|c| c.parse::<i64>().ok())
                        .collect();
                    if cols.len() < 5 {
                        continue;
                    }
                    // elm-number elm-type number-of-tags <tags...> node-list...
                    let elm_type = cols[1] as u32;
                    let num_tags = cols[2] as usize;
                    let node_start = 3 + num_tags;
                    if elm_type != MSH_ELEM_TET4 || cols.len() < node_start + 4 {
                        continue;
                    }
                    let ids = &cols[node_start..node_start + 4];
                    tets.push([
                        (ids[0] - 1) as u32,
                        (ids[1] - 1) as u32,
                        (ids[2] - 1) as u32,
                        (ids[3] - 1) as u32,
                    ]);
                }
            }
            _ => {}
        }
    }

    MshMesh { nodes, tets }
}

/// Serializes a tet mesh to the same `$Nodes`/`$Elements` framing, so that
/// `parse_msh(serialize_msh(mesh))` round-trips.
pub fn serialize_msh(mesh: &MshMesh) -> String {
    let mut out = String::new();
    out.push_str("$Nodes\n");
    out.push_str(&format!("{}\n", mesh.nodes.len()));
    for (i, n) in mesh.nodes.iter().enumerate() {
        out.push_str(&format!("{} {} {} {}\n", i + 1, n.x, n.y, n.z));
    }
    out.push_str("$EndNodes\n");

    out.push_str("$Elements\n");
    out.push_str(&format!("{}\n", mesh.tets.len()));
    for (i, t) in mesh.tets.iter().enumerate() {
        out.push_str(&format!(
            "{} {} 0 {} {} {} {}\n",
            i + 1,
            MSH_ELEM_TET4,
            t[0] + 1,
            t[1] + 1,
            t[2] + 1,
            t[3] + 1
        ));
    }
    out.push_str("$EndElements\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MshMesh {
        MshMesh {
            nodes: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
            tets: vec![[0, 1, 2, 3]],
        }
    }

    #[test]
    fn round_trips_through_text() {
        let mesh = sample();
        let text = serialize_msh(&mesh);
        let parsed = parse_msh(&text);
        assert_eq!(parsed, mesh);
    }

    #[test]
    fn one_based_indices_become_zero_based() {
        let text = "$Nodes\n4\n1 0.0 0.0 0.0\n2 1.0 0.0 0.0\n3 0.0 1.0 0.0\n4 0.0 0.0 1.0\n$EndNodes\n$Elements\n1\n1 4 2 0 0 1 2 3 4\n$EndElements\n";
        let parsed = parse_msh(text);
        assert_eq!(parsed.nodes.len(), 4);
        assert_eq!(parsed.tets, vec![[0, 1, 2, 3]]);
    }

    #[test]
    fn truncated_element_record_is_skipped_not_panicking() {
        let text = "$Nodes\n1\n1 0.0 0.0 0.0\n$EndNodes\n$Elements\n1\n1 4 0\n$EndElements\n";
        let parsed = parse_msh(text);
        assert_eq!(parsed.nodes.len(), 1);
        assert!(parsed.tets.is_empty());
    }
}
