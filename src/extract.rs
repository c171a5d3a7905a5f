//! Per-node attribute extraction.
//!
//! [`AttributeExtractor::extract`] resolves a node's name and colour through
//! the [`Document`] and computes one geometric property chosen by the
//! node's [`ShapeType`]. Lookup and kernel failures never abort: they
//! degrade the record and come back as [`ExtractionWarning`]s.

use std::fmt;

use glam::DVec3;

use crate::kernel::{ComputeError, GeometryKernel, MassProperties, PropertyKind};
use crate::model::{Color, Document, Geometry, NodeId, ShapeType};
use crate::util::Result;
use crate::walk::{walk, Visit, VisitFlow};

/// Geometric property of one node.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum GeomProperty {
    Volume(f64),
    Area(f64),
    Length(f64),
    /// Volume and area of a compound measured as a single shape. This is an
    /// approximation, not a sum over the compound's children.
    AggregateVolumeArea { volume: f64, area: f64 },
    #[default]
    NotApplicable,
}

impl GeomProperty {
    /// Stable name of the variant, as stored in exported containers.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Volume(_) => "volume",
            Self::Area(_) => "area",
            Self::Length(_) => "length",
            Self::AggregateVolumeArea { .. } => "aggregate_volume_area",
            Self::NotApplicable => "not_applicable",
        }
    }

    pub fn is_applicable(&self) -> bool {
        !matches!(self, Self::NotApplicable)
    }

    pub fn volume(&self) -> Option<f64> {
        match *self {
            Self::Volume(v) | Self::AggregateVolumeArea { volume: v, .. } => Some(v),
            _ => None,
        }
    }

    pub fn area(&self) -> Option<f64> {
        match *self {
            Self::Area(a) | Self::AggregateVolumeArea { area: a, .. } => Some(a),
            _ => None,
        }
    }

    pub fn length(&self) -> Option<f64> {
        match *self {
            Self::Length(l) => Some(l),
            _ => None,
        }
    }
}

impl fmt::Display for GeomProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volume(v) => write!(f, "volume={v:.6}"),
            Self::Area(a) => write!(f, "area={a:.6}"),
            Self::Length(l) => write!(f, "length={l:.6}"),
            Self::AggregateVolumeArea { volume, area } => write!(f, "volume={volume:.6} area={area:.6}"),
            Self::NotApplicable => f.write_str("n/a"),
        }
    }
}

/// Extraction result for one node.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeRecord {
    pub id: NodeId,
    pub tag: u32,
    pub entry: String,
    pub depth: usize,
    pub shape_type: ShapeType,
    /// `Some("")` is an empty name, distinct from no name at all.
    pub name: Option<String>,
    pub color: Option<Color>,
    pub property: GeomProperty,
    /// Present exactly when `property` is applicable.
    pub centroid: Option<DVec3>,
}

impl AttributeRecord {
    /// Name for textual output.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some("") => "(unnamed)",
            Some(name) => name,
            None => "(no name)",
        }
    }
}

impl fmt::Display for AttributeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:indent$}{} [{}] {}", "", self.entry, self.shape_type, self.display_name(), indent = self.depth * 2)?;
        if let Some(color) = self.color {
            write!(f, " color={color}")?;
        }
        write!(f, " {}", self.property)?;
        if let Some(c) = self.centroid {
            write!(f, " centroid=({:.6}, {:.6}, {:.6})", c.x, c.y, c.z)?;
        }
        Ok(())
    }
}

/// Why a record came out degraded.
#[derive(Clone, Debug, PartialEq)]
pub enum ExtractionWarning {
    /// The document's colour is out of range or not finite; dropped.
    InvalidColor { entry: String, color: Color },
    /// The shape type has a property but the node has no geometry.
    MissingGeometry { entry: String, shape_type: ShapeType },
    Compute { entry: String, kind: PropertyKind, error: ComputeError },
}

impl ExtractionWarning {
    pub fn entry(&self) -> &str {
        match self {
            Self::InvalidColor { entry, .. }
            | Self::MissingGeometry { entry, .. }
            | Self::Compute { entry, .. } => entry,
        }
    }
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidColor { entry, color } => write!(f, "{entry}: invalid color {color}"),
            Self::MissingGeometry { entry, shape_type } => {
                write!(f, "{entry}: {shape_type} node has no geometry")
            }
            Self::Compute { entry, kind, error } => write!(f, "{entry}: {kind} failed: {error}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Extraction {
    pub record: AttributeRecord,
    pub warnings: Vec<ExtractionWarning>,
}

impl Extraction {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Resolves names and colours and computes properties with kernel `K`.
#[derive(Clone, Debug, Default)]
pub struct AttributeExtractor<K> {
    kernel: K,
}

impl<K: GeometryKernel> AttributeExtractor<K> {
    pub fn new(kernel: K) -> Self {
        Self { kernel }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Extract one visited node. Children are not looked at.
    pub fn extract<D: Document + ?Sized>(&self, doc: &D, visit: &Visit<'_>) -> Extraction {
        let mut warnings = Vec::new();
        let entry = visit.entry.clone();

        let color = match doc.color_of(visit.id) {
            Some(c) if c.is_valid() => Some(c),
            Some(c) => {
                warnings.push(ExtractionWarning::InvalidColor { entry: entry.clone(), color: c });
                None
            }
            None => None,
        };

        let shape_type = visit.node.shape_type;
        let (property, centroid) = match doc.geometry_of(visit.id) {
            Some(geometry) => self.measure(geometry, shape_type, &entry, &mut warnings),
            None if needs_geometry(shape_type) => {
                warnings.push(ExtractionWarning::MissingGeometry { entry: entry.clone(), shape_type });
                (GeomProperty::NotApplicable, None)
            }
            None => (GeomProperty::NotApplicable, None),
        };
        if !warnings.is_empty() {
            tracing::trace!(entry = %entry, warnings = warnings.len(), "degraded record");
        }

        Extraction {
            record: AttributeRecord {
                id: visit.id,
                tag: visit.node.tag,
                entry,
                depth: visit.depth,
                shape_type,
                name: doc.name_of(visit.id).map(str::to_string),
                color,
                property,
                centroid,
            },
            warnings,
        }
    }

    fn measure(
        &self,
        geometry: &Geometry,
        shape_type: ShapeType,
        entry: &str,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> (GeomProperty, Option<DVec3>) {
        let mut compute = |kind: PropertyKind| -> Option<MassProperties> {
            self.kernel
                .compute(geometry, kind)
                .map_err(|error| {
                    warnings.push(ExtractionWarning::Compute { entry: entry.to_string(), kind, error })
                })
                .ok()
        };

        let computed = match shape_type {
            ShapeType::Solid | ShapeType::CompSolid => {
                compute(PropertyKind::Volume).map(|m| (GeomProperty::Volume(m.value), m.centroid))
            }
            ShapeType::Shell | ShapeType::Face => {
                compute(PropertyKind::Area).map(|m| (GeomProperty::Area(m.value), m.centroid))
            }
            ShapeType::Wire | ShapeType::Edge => {
                compute(PropertyKind::Length).map(|m| (GeomProperty::Length(m.value), m.centroid))
            }
            ShapeType::Compound => {
                // both measures or neither; the centroid is the area one
                let volume = compute(PropertyKind::Volume);
                let area = compute(PropertyKind::Area);
                volume.zip(area).map(|(v, a)| {
                    (GeomProperty::AggregateVolumeArea { volume: v.value, area: a.value }, a.centroid)
                })
            }
            ShapeType::Vertex | ShapeType::Other => None,
        };
        match computed {
            Some((property, centroid)) => (property, Some(centroid)),
            None => (GeomProperty::NotApplicable, None),
        }
    }

    /// Walk from `root` and extract every node, in pre-order.
    ///
    /// Returns the records and the total number of warnings.
    pub fn extract_all<D: Document + ?Sized>(
        &self,
        doc: &D,
        root: NodeId,
    ) -> Result<(Vec<AttributeRecord>, usize)> {
        let mut extractions = Vec::new();
        walk(doc, root, &mut |visit: &Visit<'_>| -> Result<VisitFlow> {
            extractions.push(self.extract(doc, visit));
            Ok(VisitFlow::Continue)
        })?;
        Ok(extractions.into_iter().fold((Vec::new(), 0), |(mut records, warnings), e| {
            let count = warnings + e.warnings.len();
            records.push(e.record);
            (records, count)
        }))
    }
}

/// Shape types whose property needs geometry.
fn needs_geometry(shape_type: ShapeType) -> bool {
    !matches!(shape_type, ShapeType::Vertex | ShapeType::Other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::MeshKernel;
    use crate::model::{Assembly, Node, TriangleMesh};

    fn unit_box() -> Geometry {
        Geometry::Mesh(TriangleMesh::cuboid(DVec3::ZERO, DVec3::new(1.0, 2.0, 5.0)))
    }

    fn extract_one(node: Node) -> Extraction {
        let doc = Assembly::new(node);
        let extractor = AttributeExtractor::new(MeshKernel);
        let mut out = None;
        walk(&doc, doc.root(), &mut |v: &Visit<'_>| -> Result<VisitFlow> {
            out = Some(extractor.extract(&doc, v));
            Ok(VisitFlow::Continue)
        })
        .unwrap();
        out.unwrap()
    }

    #[test]
    fn test_solid_volume_with_centroid() {
        let e = extract_one(Node::new(1, ShapeType::Solid).with_name("block").with_geometry(unit_box()));
        assert!(e.warnings.is_empty());
        let GeomProperty::Volume(v) = e.record.property else { panic!("{:?}", e.record.property) };
        assert!((v - 10.0).abs() < 1e-9);
        assert!(e.record.centroid.unwrap().abs_diff_eq(DVec3::new(0.5, 1.0, 2.5), 1e-9));
        assert_eq!(e.record.entry, "0:1:1");
    }

    #[test]
    fn test_vertex_and_other_not_applicable() {
        for shape in [ShapeType::Vertex, ShapeType::Other] {
            let e = extract_one(Node::new(1, shape).with_geometry(unit_box()));
            assert_eq!(e.record.property, GeomProperty::NotApplicable);
            assert_eq!(e.record.centroid, None);
            assert!(!e.is_degraded());
        }
    }

    #[test]
    fn test_missing_geometry_degrades() {
        let e = extract_one(Node::new(1, ShapeType::Face));
        assert_eq!(e.record.property, GeomProperty::NotApplicable);
        assert!(matches!(e.warnings[..], [ExtractionWarning::MissingGeometry { .. }]));
    }

    #[test]
    fn test_kernel_failure_degrades() {
        // a point has no length
        let e = extract_one(Node::new(1, ShapeType::Edge).with_geometry(Geometry::Point(DVec3::ZERO)));
        assert_eq!(e.record.property, GeomProperty::NotApplicable);
        assert_eq!(e.record.centroid, None);
        assert!(matches!(
            e.warnings[..],
            [ExtractionWarning::Compute { kind: PropertyKind::Length, .. }]
        ));
    }

    #[test]
    fn test_invalid_color_is_absent() {
        let e = extract_one(Node::new(1, ShapeType::Vertex).with_color(Color::new(0.0, 2.0, 0.0)));
        assert_eq!(e.record.color, None);
        assert!(matches!(e.warnings[..], [ExtractionWarning::InvalidColor { .. }]));

        let e = extract_one(Node::new(1, ShapeType::Vertex).with_color(Color::new(0.0, 0.0, 0.0)));
        assert_eq!(e.record.color, Some(Color::new(0.0, 0.0, 0.0)));
    }

    #[test]
    fn test_names() {
        let named = extract_one(Node::new(1, ShapeType::Other).with_name(""));
        assert_eq!(named.record.name.as_deref(), Some(""));
        assert_eq!(named.record.display_name(), "(unnamed)");
        let anon = extract_one(Node::new(1, ShapeType::Other));
        assert_eq!(anon.record.name, None);
        assert_eq!(anon.record.display_name(), "(no name)");
        assert!(named.record.to_string().contains("(unnamed)"));
    }

    /// The compound measure treats all pieces as one shape; two disjoint
    /// boxes report the volume and area of both, with the area centroid.
    #[test]
    fn test_compound_aggregate_approximation() {
        let geometry = Geometry::Compound(vec![
            Geometry::Mesh(TriangleMesh::cuboid(DVec3::ZERO, DVec3::ONE)),
            Geometry::Mesh(TriangleMesh::cuboid(DVec3::new(3.0, 0.0, 0.0), DVec3::new(5.0, 1.0, 1.0))),
        ]);
        let e = extract_one(Node::new(1, ShapeType::Compound).with_geometry(geometry));
        let GeomProperty::AggregateVolumeArea { volume, area } = e.record.property else {
            panic!("{:?}", e.record.property)
        };
        assert!((volume - 3.0).abs() < 1e-9);
        assert!((area - 16.0).abs() < 1e-9);
        // area-weighted: (6 * 0.5 + 10 * 4.0) / 16
        let c = e.record.centroid.unwrap();
        assert!((c.x - 43.0 / 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_compound_needs_both_measures() {
        let flat = Geometry::Mesh(TriangleMesh::quad([DVec3::ZERO, DVec3::X, DVec3::X + DVec3::Y, DVec3::Y]));
        let e = extract_one(Node::new(1, ShapeType::Compound).with_geometry(flat));
        assert_eq!(e.record.property, GeomProperty::NotApplicable);
        assert_eq!(e.warnings.len(), 1);
    }

    #[test]
    fn test_extract_all_folds_warnings() {
        let mut doc = Assembly::new(Node::new(1, ShapeType::Solid).with_geometry(unit_box()));
        let root = doc.root();
        doc.add_child(root, Node::new(1, ShapeType::Face)).unwrap();
        doc.add_child(root, Node::new(2, ShapeType::Vertex)).unwrap();
        doc.add_child(root, Node::new(3, ShapeType::Wire).with_color(Color::new(f64::NAN, 0.0, 0.0)))
            .unwrap();

        let (records, warnings) = AttributeExtractor::new(MeshKernel).extract_all(&doc, root).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(warnings, 3);
        assert!(records[0].property.is_applicable());
        for r in &records {
            assert_eq!(r.centroid.is_some(), r.property.is_applicable());
        }
    }
}
