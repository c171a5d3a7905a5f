//! Integration tests: export assembly trees and read them back from disk.

use cadtree::container::{AttrValue, ChildRef, Container, FieldValue, GroupId, OpenMode, ReleaseLedger, VlenBuffers};
use cadtree::export::{export_tree, ColumnPolicy, TableExporter, TableKind, TreeExportOptions};
use cadtree::extract::AttributeExtractor;
use cadtree::kernel::MeshKernel;
use cadtree::model::{json, Assembly, Color, Document, Geometry, Node, ShapeType, TriangleMesh};
use cadtree::util::{ElementType, PlainOldDataType, Shape};
use cadtree::walk::{walk, Visit, VisitFlow};
use cadtree::{Error, Result};
use glam::DVec3;

use tempfile::TempDir;

/// Root SOLID (1 x 2 x 5 box), FACE child (2.5 x 1 quad), VERTEX child.
fn three_nodes() -> Assembly {
    let mut doc = Assembly::new(
        Node::new(1, ShapeType::Solid)
            .with_name("block")
            .with_color(Color::new(0.8, 0.1, 0.1))
            .with_geometry(Geometry::Mesh(TriangleMesh::cuboid(DVec3::ZERO, DVec3::new(1.0, 2.0, 5.0)))),
    );
    let root = doc.root();
    let quad = TriangleMesh::quad([
        DVec3::new(0.0, 0.0, 0.0),
        DVec3::new(2.5, 0.0, 0.0),
        DVec3::new(2.5, 1.0, 0.0),
        DVec3::new(0.0, 1.0, 0.0),
    ]);
    doc.add_child(root, Node::new(1, ShapeType::Face).with_name("lid").with_geometry(Geometry::Mesh(quad)))
        .unwrap();
    doc.add_child(root, Node::new(2, ShapeType::Vertex)).unwrap();
    doc
}

fn export_to(doc: &Assembly, container: &mut Container) -> cadtree::export::ExportReport {
    export_tree(doc, &AttributeExtractor::new(MeshKernel), container, &TreeExportOptions::default())
        .expect("export failed")
}

fn float(c: &Container, g: GroupId, key: &str) -> Option<f64> {
    c.attribute(g, key).unwrap().and_then(AttrValue::as_float)
}

fn node_groups(c: &Container, g: GroupId) -> Vec<(String, GroupId)> {
    c.children(g)
        .unwrap()
        .into_iter()
        .filter_map(|(name, child)| match child {
            ChildRef::Group(g) if name.starts_with("label_") => Some((name, g)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_three_node_scenario() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("three.ctree");
    {
        let mut c = Container::create(&path, true).unwrap();
        let options = TreeExportOptions { structure: false, ..Default::default() };
        let report = export_tree(&three_nodes(), &AttributeExtractor::new(MeshKernel), &mut c, &options).unwrap();
        assert_eq!(report.visited, 3);
        assert_eq!(report.max_depth, 1);
        assert_eq!(report.degraded, 0);
        c.close().unwrap();
    }

    let c = Container::open(&path, OpenMode::ReadOnly).unwrap();
    let top = c.lookup_group("/properties").unwrap();
    let roots = node_groups(&c, top);
    assert_eq!(roots.len(), 1);
    let root = roots[0].1;
    let children = node_groups(&c, root);
    assert_eq!(1 + children.len(), 3);

    assert!((float(&c, root, "volume").unwrap() - 10.0).abs() < 1e-6);
    let centroid = c.attribute(root, "centroid").unwrap().and_then(AttrValue::as_floats).unwrap();
    assert!((DVec3::from_slice(centroid) - DVec3::new(0.5, 1.0, 2.5)).length() < 1e-6);

    let face = c.lookup_group("/properties/label_1/label_1").unwrap();
    assert!((float(&c, face, "area").unwrap() - 2.5).abs() < 1e-6);
    assert!(c.attribute(face, "centroid").unwrap().is_some());
    assert_eq!(c.attribute(face, "property").unwrap().and_then(AttrValue::as_text), Some("area"));

    let vertex = c.lookup_group("/properties/label_1/label_2").unwrap();
    for key in ["property", "volume", "area", "length", "centroid", "name", "color"] {
        assert!(c.attribute(vertex, key).unwrap().is_none(), "vertex should have no {key}");
    }
    assert_eq!(c.attribute(vertex, "shape_type").unwrap().and_then(AttrValue::as_text), Some("VERTEX"));
}

#[test]
fn test_tree_round_trip() {
    let doc = json::parse_str(
        r#"{ "root": { "shape": "COMPOUND", "name": "asm", "children": [
            { "tag": 4, "shape": "SOLID", "name": "base", "color": [0.25, 0.5, 0.75],
              "geometry": { "type": "box", "min": [0, 0, 0], "max": [2, 2, 1] } },
            { "tag": 7, "shape": "COMPOUND", "name": "", "children": [
                { "shape": "WIRE", "geometry": { "type": "polyline", "points": [[0,0,0],[3,0,0],[3,4,0]] } },
                { "shape": "EDGE", "geometry": { "type": "polyline", "points": [[0,0,0],[0,0,2]] } },
                { "shape": "OTHER" }
            ] }
        ] } }"#,
        "round_trip.json",
    )
    .unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rt.ctree");
    let mut c = Container::create(&path, true).unwrap();
    export_to(&doc, &mut c);
    c.close().unwrap();
    let c = Container::open(&path, OpenMode::ReadOnly).unwrap();

    let extractor = AttributeExtractor::new(MeshKernel);
    let mut checked = 0;
    walk(&doc, doc.root(), &mut |v: &Visit<'_>| -> Result<VisitFlow> {
        let record = extractor.extract(&doc, v).record;
        // entry "0:1:a:b" maps to /properties/label_a/label_b
        let path: String = v.entry.split(':').skip(2).map(|t| format!("/label_{t}")).collect();
        let group = c.lookup_group(&format!("/properties{path}"))?;

        assert_eq!(node_groups(&c, group).len(), doc.children_of(v.id).len());
        assert_eq!(c.attribute(group, "tag")?.and_then(AttrValue::as_int), Some(i64::from(v.node.tag)));
        assert_eq!(c.attribute(group, "entry")?.and_then(AttrValue::as_text), Some(v.entry.as_str()));
        assert_eq!(c.attribute(group, "name")?.and_then(AttrValue::as_text), record.name.as_deref());
        for (key, expected) in [
            ("volume", record.property.volume()),
            ("area", record.property.area()),
            ("length", record.property.length()),
        ] {
            match (float(&c, group, key), expected) {
                (Some(got), Some(want)) => assert!((got - want).abs() < 1e-6, "{key} at {}", v.entry),
                (got, want) => assert_eq!(got.is_some(), want.is_some(), "{key} at {}", v.entry),
            }
        }
        if let Some(color) = record.color {
            let stored = c.attribute(group, "color")?.and_then(AttrValue::as_floats).unwrap();
            for (a, b) in stored.iter().zip(color.to_array()) {
                assert!((a - b).abs() < 1e-6);
            }
        }
        checked += 1;
        Ok(VisitFlow::Continue)
    })
    .unwrap();
    assert_eq!(checked, 6);

    let wire = c.lookup_group("/properties/label_1/label_7/label_1").unwrap();
    assert!((float(&c, wire, "length").unwrap() - 7.0).abs() < 1e-6);
    let unnamed = c.lookup_group("/properties/label_1/label_7").unwrap();
    assert_eq!(c.attribute(unnamed, "name").unwrap().and_then(AttrValue::as_text), Some(""));
}

#[test]
fn test_reexport_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.ctree");
    let second = dir.path().join("second.ctree");
    for path in [&first, &second] {
        let mut c = Container::create(path, true).unwrap();
        export_to(&three_nodes(), &mut c);
        c.close().unwrap();
    }
    let a = std::fs::read(&first).unwrap();
    let b = std::fs::read(&second).unwrap();
    assert_eq!(a, b);

    // exporting again into the same file overwrites rather than accumulates
    let mut c = Container::open(&first, OpenMode::ReadWrite).unwrap();
    export_to(&three_nodes(), &mut c);
    c.close().unwrap();
    assert_eq!(std::fs::read(&first).unwrap(), b);
}

#[test]
fn test_create_conflict_leaves_file_unchanged() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("existing.ctree");
    let mut c = Container::create(&path, true).unwrap();
    export_to(&three_nodes(), &mut c);
    c.close().unwrap();
    let before = std::fs::read(&path).unwrap();

    let err = Container::create(&path, false).unwrap_err();
    assert!(matches!(err, Error::ContainerCreateConflict(_)));
    assert_eq!(std::fs::read(&path).unwrap(), before);

    let mut c = Container::open(&path, OpenMode::ReadWrite).unwrap();
    let top = c.lookup_group("/properties").unwrap();
    assert!(c.create_group(top, "label_1").unwrap_err().is_create_conflict());
    let vertex = c.lookup_group("/properties/label_1/label_2").unwrap();
    assert_eq!(c.attribute(vertex, "tag").unwrap().and_then(AttrValue::as_int), Some(2));
}

#[test]
fn test_append_scenario() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("append.ctree");
    {
        let mut c = Container::create(&path, true).unwrap();
        let root = c.root();
        let mut tables = TableExporter::new(&mut c, root);
        let rows: Vec<_> = (0..100).map(|i| vec![FieldValue::Float(i as f64), FieldValue::Float(i as f64 * 0.5)]).collect();
        tables
            .export_resizable("samples", &rows, TableKind::Numeric(PlainOldDataType::Float64), ColumnPolicy::Uniform)
            .unwrap();
        c.close().unwrap();
    }
    {
        let mut c = Container::open(&path, OpenMode::ReadWrite).unwrap();
        let root = c.root();
        let mut tables = TableExporter::new(&mut c, root);
        assert!(tables.attach("samples", ColumnPolicy::Uniform).unwrap());
        let rows: Vec<_> = (0..20).map(|i| vec![FieldValue::Float(-1.0 - i as f64), FieldValue::Float(42.0)]).collect();
        tables.append("samples", &rows).unwrap();
        c.close().unwrap();
    }

    let c = Container::open(&path, OpenMode::ReadOnly).unwrap();
    let id = c.lookup_array("/samples").unwrap();
    let info = c.array_info(id).unwrap();
    assert_eq!(info.shape, Shape::d2(120, 2));
    assert!(info.max_shape.is_resizable());
    let values = c.read_all::<f64>(id).unwrap();
    for i in 0..100 {
        assert_eq!(values[i * 2], i as f64);
        assert_eq!(values[i * 2 + 1], i as f64 * 0.5);
    }
    for i in 0..20 {
        assert_eq!(values[(100 + i) * 2], -1.0 - i as f64);
        assert_eq!(values[(100 + i) * 2 + 1], 42.0);
    }
}

#[test]
fn test_vlen_round_trip_releases_once_per_row() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("vlen.ctree");
    let rows: Vec<Vec<u32>> = vec![vec![], vec![7], vec![1, 2, 3, 4, 5], vec![9, 9]];
    let lengths: Vec<usize> = rows.iter().map(Vec::len).collect();

    let ledger = ReleaseLedger::new();
    {
        let mut c = Container::create(&path, true).unwrap();
        let root = c.root();
        let id = c.create_vlen_array(root, "ragged", PlainOldDataType::Uint32, rows.len()).unwrap();
        let mut buffers = VlenBuffers::from_rows(&ledger, rows.clone());
        c.write_vlen(id, &buffers, &lengths).unwrap();
        for i in 0..rows.len() {
            buffers.release_row(i).unwrap();
        }
        assert!(matches!(buffers.release_row(0), Err(Error::DoubleRelease { row: 0 })));
        assert_eq!(ledger.released(), rows.len());
        c.close().unwrap();
    }
    ledger.check_balanced().unwrap();

    let c = Container::open(&path, OpenMode::ReadOnly).unwrap();
    let id = c.lookup_array("/ragged").unwrap();
    assert_eq!(c.array_info(id).unwrap().element, ElementType::VarLen(PlainOldDataType::Uint32));
    assert_eq!(c.vlen_lengths(id).unwrap(), lengths);

    let read_ledger = ReleaseLedger::new();
    let buffers = c.read_vlen::<u32>(id, &read_ledger).unwrap();
    assert_eq!(buffers.lengths().unwrap(), lengths);
    assert_eq!(buffers.to_vecs().unwrap(), rows);
    assert_eq!(read_ledger.outstanding(), rows.len());
    drop(buffers);
    assert_eq!(read_ledger.released(), rows.len());
    read_ledger.check_balanced().unwrap();
}
