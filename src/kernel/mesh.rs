//! Mass properties of meshes and polylines.

use glam::DVec3;

use super::{ComputeError, GeometryKernel, MassProperties, PropertyKind};
use crate::model::{Geometry, TriangleMesh};

/// Built-in kernel.
///
/// - Volume: divergence theorem over every mesh (signed tetrahedra from the
///   origin); an inward-oriented mesh counts with its absolute volume.
/// - Area: sum of triangle areas over every mesh.
/// - Length: sum of segment lengths over every polyline.
///
/// A compound is measured as one shape: the pieces that carry the measure
/// are accumulated together and the others are ignored.
#[derive(Clone, Copy, Debug, Default)]
pub struct MeshKernel;

/// Weighted sum of centroids; `value` is the total weight.
#[derive(Clone, Copy, Debug, Default)]
struct Accumulator {
    value: f64,
    moment: DVec3,
    pieces: usize,
}

impl Accumulator {
    #[inline]
    fn add(&mut self, weight: f64, centroid: DVec3) {
        self.value += weight;
        self.moment += centroid * weight;
    }

    fn finish(self, kind: PropertyKind, geometry: &Geometry) -> Result<MassProperties, ComputeError> {
        if self.pieces == 0 {
            return Err(ComputeError::Unsupported { kind, geometry: geometry.kind() });
        }
        if self.value.abs() <= f64::EPSILON {
            return Err(ComputeError::Degenerate(kind));
        }
        Ok(MassProperties { value: self.value, centroid: self.moment / self.value })
    }
}

impl GeometryKernel for MeshKernel {
    fn compute(&self, geometry: &Geometry, kind: PropertyKind) -> Result<MassProperties, ComputeError> {
        let mut acc = Accumulator::default();
        let mut failure = None;
        geometry.for_each_leaf(&mut |leaf| {
            if failure.is_some() {
                return;
            }
            let step = match (kind, leaf) {
                (PropertyKind::Volume, Geometry::Mesh(mesh)) => mesh_volume(mesh, &mut acc),
                (PropertyKind::Area, Geometry::Mesh(mesh)) => mesh_area(mesh, &mut acc),
                (PropertyKind::Length, Geometry::Polyline { points, closed }) => {
                    polyline_length(points, *closed, &mut acc)
                }
                _ => Ok(()),
            };
            if let Err(e) = step {
                failure = Some(e);
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }
        acc.finish(kind, geometry)
    }
}

fn check_finite(points: &[DVec3], what: &'static str) -> Result<(), ComputeError> {
    if points.iter().all(|p| p.is_finite()) {
        Ok(())
    } else {
        Err(ComputeError::NonFinite(what))
    }
}

fn triangles(mesh: &TriangleMesh) -> impl Iterator<Item = Result<[DVec3; 3], ComputeError>> + '_ {
    (0..mesh.triangles.len()).map(|i| mesh.triangle(i).ok_or(ComputeError::InvalidIndex { triangle: i }))
}

fn mesh_volume(mesh: &TriangleMesh, acc: &mut Accumulator) -> Result<(), ComputeError> {
    check_finite(&mesh.vertices, "mesh")?;
    let mut piece = Accumulator::default();
    for tri in triangles(mesh) {
        let [a, b, c] = tri?;
        let volume = a.dot(b.cross(c)) / 6.0;
        // tetrahedron (origin, a, b, c)
        piece.add(volume, (a + b + c) / 4.0);
    }
    if piece.value < 0.0 {
        piece.value = -piece.value;
        piece.moment = -piece.moment;
    }
    acc.add(piece.value, if piece.value > 0.0 { piece.moment / piece.value } else { DVec3::ZERO });
    acc.pieces += 1;
    Ok(())
}

fn mesh_area(mesh: &TriangleMesh, acc: &mut Accumulator) -> Result<(), ComputeError> {
    check_finite(&mesh.vertices, "mesh")?;
    for tri in triangles(mesh) {
        let [a, b, c] = tri?;
        let area = 0.5 * (b - a).cross(c - a).length();
        acc.add(area, (a + b + c) / 3.0);
    }
    acc.pieces += 1;
    Ok(())
}

fn polyline_length(points: &[DVec3], closed: bool, acc: &mut Accumulator) -> Result<(), ComputeError> {
    check_finite(points, "polyline")?;
    let closing = if closed && points.len() > 2 { points.first().zip(points.last()) } else { None };
    let segments = points.windows(2).map(|w| (w[0], w[1])).chain(closing.map(|(&a, &b)| (b, a)));
    for (a, b) in segments {
        acc.add(a.distance(b), (a + b) * 0.5);
    }
    acc.pieces += 1;
    Ok(())
}
