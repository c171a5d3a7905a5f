//! Shape geometry handed to the geometry kernel.
//!
//! Geometry is opaque to traversal and extraction; only the kernel looks
//! inside it.

use glam::DVec3;

/// Indexed triangle mesh. Closed, outward-oriented meshes bound a volume.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriangleMesh {
    pub vertices: Vec<DVec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<DVec3>, triangles: Vec<[u32; 3]>) -> Self {
        Self { vertices, triangles }
    }

    /// Closed axis-aligned box between two corners, outward-oriented.
    pub fn cuboid(min: DVec3, max: DVec3) -> Self {
        let (lo, hi) = (min.min(max), min.max(max));
        let vertices = (0..8)
            .map(|i| {
                DVec3::new(
                    if i & 1 == 0 { lo.x } else { hi.x },
                    if i & 2 == 0 { lo.y } else { hi.y },
                    if i & 4 == 0 { lo.z } else { hi.z },
                )
            })
            .collect();
        // corner index bits: x = 1, y = 2, z = 4
        let triangles = vec![
            [0, 3, 1], [0, 2, 3], // -z
            [4, 5, 7], [4, 7, 6], // +z
            [0, 1, 5], [0, 5, 4], // -y
            [2, 6, 7], [2, 7, 3], // +y
            [0, 4, 6], [0, 6, 2], // -x
            [1, 3, 7], [1, 7, 5], // +x
        ];
        Self { vertices, triangles }
    }

    /// Planar quad (two triangles) through four corners in order.
    pub fn quad(corners: [DVec3; 4]) -> Self {
        Self { vertices: corners.to_vec(), triangles: vec![[0, 1, 2], [0, 2, 3]] }
    }

    /// Triangle corner positions; `None` on an out-of-range index.
    pub fn triangle(&self, index: usize) -> Option<[DVec3; 3]> {
        let [a, b, c] = *self.triangles.get(index)?;
        Some([
            *self.vertices.get(a as usize)?,
            *self.vertices.get(b as usize)?,
            *self.vertices.get(c as usize)?,
        ])
    }
}

/// Geometry attached to an assembly node.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Mesh(TriangleMesh),
    Polyline { points: Vec<DVec3>, closed: bool },
    Point(DVec3),
    /// Several pieces measured together as one shape.
    Compound(Vec<Geometry>),
}

impl Geometry {
    /// Short kind name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Mesh(_) => "mesh",
            Self::Polyline { .. } => "polyline",
            Self::Point(_) => "point",
            Self::Compound(_) => "compound",
        }
    }

    /// Visit every non-compound piece, depth first.
    pub fn for_each_leaf<'a>(&'a self, f: &mut impl FnMut(&'a Geometry)) {
        match self {
            Self::Compound(parts) => parts.iter().for_each(|p| p.for_each_leaf(f)),
            leaf => f(leaf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cuboid_outward() {
        let mesh = TriangleMesh::cuboid(DVec3::ZERO, DVec3::ONE);
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.triangles.len(), 12);
        let center = DVec3::splat(0.5);
        for i in 0..mesh.triangles.len() {
            let [a, b, c] = mesh.triangle(i).unwrap();
            let normal = (b - a).cross(c - a);
            let mid = (a + b + c) / 3.0;
            assert!(normal.dot(mid - center) > 0.0, "triangle {i} faces inward");
        }
    }

    #[test]
    fn test_leaves() {
        let g = Geometry::Compound(vec![
            Geometry::Point(DVec3::ZERO),
            Geometry::Compound(vec![Geometry::Mesh(TriangleMesh::default())]),
        ]);
        let mut kinds = Vec::new();
        g.for_each_leaf(&mut |leaf| kinds.push(leaf.kind()));
        assert_eq!(kinds, vec!["point", "mesh"]);
    }
}
