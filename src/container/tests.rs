use super::*;
use crate::util::{CompoundType, ElementType, Error, MaxShape, PlainOldDataType, Shape};
use tempfile::TempDir;

fn f64_type() -> ElementType {
    ElementType::Pod(PlainOldDataType::Float64)
}

#[test]
fn test_create_conflict_leaves_file_untouched() -> crate::util::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("a.ctree");

    let mut c = Container::create(&path, false)?;
    let g = c.create_group(c.root(), "keep")?;
    c.set_attribute(g, "tag", AttrValue::Int(7))?;
    c.close()?;
    let before = std::fs::read(&path)?;

    let err = Container::create(&path, false).unwrap_err();
    assert!(err.is_create_conflict());
    assert_eq!(std::fs::read(&path)?, before);

    let c = Container::open(&path, OpenMode::ReadOnly)?;
    let g = c.lookup_group("/keep")?;
    assert_eq!(c.attribute(g, "tag")?, Some(&AttrValue::Int(7)));
    Ok(())
}

#[test]
fn test_group_conflict_inside_container() -> crate::util::Result<()> {
    let dir = TempDir::new()?;
    let mut c = Container::create(dir.path().join("g.ctree"), true)?;
    let g = c.create_group(c.root(), "label_1")?;
    c.set_attribute(g, "name", AttrValue::Text("first".into()))?;

    let err = c.create_group(c.root(), "label_1").unwrap_err();
    assert!(matches!(err, Error::ContainerCreateConflict(ref p) if p == "/label_1"));
    assert_eq!(c.attribute(g, "name")?.and_then(AttrValue::as_text), Some("first"));
    Ok(())
}

#[test]
fn test_roundtrip_groups_attributes_arrays() -> crate::util::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("rt.ctree");

    let mut c = Container::create(&path, true)?;
    let top = c.create_group(c.root(), "properties")?;
    let child = c.create_group(top, "label_2")?;
    c.set_attribute(child, "centroid", AttrValue::Floats(vec![0.5, 1.0, 2.5]))?;
    c.set_attribute(child, "entry", AttrValue::Text("0:1:1:2".into()))?;
    let m = c.create_array(top, "matrix", f64_type(), Shape::d2(2, 3), None)?;
    c.write_region(m, 0, &[1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0])?;
    c.close()?;

    let c = Container::open(&path, OpenMode::ReadOnly)?;
    let top = c.lookup_group("/properties")?;
    let names: Vec<String> = c.children(top)?.into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["label_2", "matrix"]);

    let child = c.lookup_group("/properties/label_2")?;
    assert_eq!(c.group_path(child)?, "/properties/label_2");
    assert_eq!(
        c.attribute(child, "centroid")?.and_then(AttrValue::as_floats),
        Some(&[0.5, 1.0, 2.5][..])
    );

    let m = c.lookup_array("/properties/matrix")?;
    let info = c.array_info(m)?;
    assert_eq!(info.shape, Shape::d2(2, 3));
    assert_eq!(c.read_region::<f64>(m, 1, 1)?, vec![4.0, 5.0, 6.0]);
    Ok(())
}

#[test]
fn test_extend_appends_without_touching_existing_rows() -> crate::util::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("ext.ctree");

    let initial: Vec<i32> = (0..100).collect();
    let mut c = Container::create(&path, true)?;
    let shape = Shape::d1(100);
    let a = c.create_array(
        c.root(),
        "ids",
        ElementType::Pod(PlainOldDataType::Int32),
        shape.clone(),
        Some(MaxShape::unlimited_rows(&shape)),
    )?;
    c.write_region(a, 0, &initial)?;
    c.extend(a, Shape::d1(120))?;
    let appended: Vec<i32> = (1000..1020).collect();
    c.write_region(a, 100, &appended)?;
    c.close()?;

    let c = Container::open(&path, OpenMode::ReadOnly)?;
    let a = c.lookup_array("/ids")?;
    assert_eq!(c.array_info(a)?.shape, Shape::d1(120));
    assert!(c.array_info(a)?.max_shape.is_resizable());
    assert_eq!(c.read_region::<i32>(a, 0, 100)?, initial);
    assert_eq!(c.read_region::<i32>(a, 100, 20)?, appended);
    Ok(())
}

#[test]
fn test_extend_respects_maximum() -> crate::util::Result<()> {
    let dir = TempDir::new()?;
    let mut c = Container::create(dir.path().join("max.ctree"), true)?;
    let a = c.create_array(c.root(), "fixed", f64_type(), Shape::d2(6, 3), None)?;
    assert!(matches!(c.extend(a, Shape::d2(7, 3)), Err(Error::ShapeMismatch(_))));
    assert!(matches!(c.write_region(a, 5, &[0.0f64; 6]), Err(Error::ShapeMismatch(_))));
    assert!(matches!(c.write_region(a, 0, &[0.0f64; 4]), Err(Error::ShapeMismatch(_))));
    assert!(matches!(c.write_region(a, 0, &[0i32; 3]), Err(Error::TypeMismatch { .. })));
    Ok(())
}

#[test]
fn test_out_of_range_regions_do_not_overflow() -> crate::util::Result<()> {
    let dir = TempDir::new()?;
    let mut c = Container::create(dir.path().join("far.ctree"), true)?;
    let a = c.create_array(c.root(), "rows", f64_type(), Shape::d1(4), None)?;
    c.write_region(a, 0, &[1.0f64, 2.0, 3.0, 4.0])?;

    assert!(matches!(c.read_region::<f64>(a, usize::MAX, 1), Err(Error::ShapeMismatch(_))));
    assert!(matches!(c.read_region::<f64>(a, 0, usize::MAX), Err(Error::ShapeMismatch(_))));
    assert!(matches!(c.write_region(a, usize::MAX, &[1.0f64]), Err(Error::ShapeMismatch(_))));
    assert!(matches!(c.write_region_bytes(a, usize::MAX, &[0u8; 8]), Err(Error::ShapeMismatch(_))));
    assert!(matches!(
        c.create_array(c.root(), "huge", f64_type(), Shape::d2(usize::MAX, 2), None),
        Err(Error::ShapeMismatch(_))
    ));
    assert!(c.lookup_array("/huge").is_err());

    let b = c.create_array(c.root(), "grow", f64_type(), Shape::d2(1, 2), Some(MaxShape::from_slice(&[None, Some(2)])))?;
    assert!(matches!(c.extend(b, Shape::d2(usize::MAX, 2)), Err(Error::ShapeMismatch(_))));
    assert_eq!(c.array_info(b)?.shape, Shape::d2(1, 2));
    assert_eq!(c.read_all::<f64>(a)?, vec![1.0, 2.0, 3.0, 4.0]);
    Ok(())
}

#[test]
fn test_vlen_roundtrip_releases_each_row_once() -> crate::util::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("vlen.ctree");
    let rows: Vec<Vec<i32>> = vec![vec![0, 1, 2], vec![], vec![7], vec![3, 4, 5, 6, 8]];
    let lengths: Vec<usize> = rows.iter().map(Vec::len).collect();

    let write_ledger = ReleaseLedger::new();
    {
        let mut c = Container::create(&path, true)?;
        let a = c.create_vlen_array(c.root(), "vtx_idx", PlainOldDataType::Int32, rows.len())?;
        let mut bufs = VlenBuffers::allocate(&write_ledger, &lengths);
        for (i, row) in rows.iter().enumerate() {
            if let Some(dst) = bufs.row_mut(i) {
                dst.copy_from_slice(row);
            }
        }
        c.write_vlen(a, &bufs, &lengths)?;
        for i in 0..rows.len() {
            bufs.release_row(i)?;
        }
        c.close()?;
    }
    assert_eq!(write_ledger.released(), rows.len());
    write_ledger.check_balanced()?;

    let read_ledger = ReleaseLedger::new();
    let c = Container::open(&path, OpenMode::ReadOnly)?;
    let a = c.lookup_array("/vtx_idx")?;
    assert_eq!(c.vlen_lengths(a)?, lengths);
    let mut back = c.read_vlen::<i32>(a, &read_ledger)?;
    assert_eq!(back.to_vecs()?, rows);
    assert_eq!(back.release_all(), rows.len());
    drop(back);
    assert_eq!(read_ledger.released(), rows.len());
    read_ledger.check_balanced()?;
    Ok(())
}

#[test]
fn test_vlen_length_mismatch() -> crate::util::Result<()> {
    let dir = TempDir::new()?;
    let ledger = ReleaseLedger::new();
    let mut c = Container::create(dir.path().join("bad.ctree"), true)?;
    let a = c.create_vlen_array(c.root(), "rows", PlainOldDataType::Int64, 2)?;
    let bufs = VlenBuffers::from_rows(&ledger, vec![vec![1i64, 2], vec![3]]);
    assert!(matches!(c.write_vlen(a, &bufs, &[2, 2]), Err(Error::ShapeMismatch(_))));
    assert!(matches!(c.write_vlen(a, &bufs, &[2]), Err(Error::ShapeMismatch(_))));
    c.write_vlen(a, &bufs, &[2, 1])?;
    drop(bufs);
    ledger.check_balanced()?;
    Ok(())
}

#[test]
fn test_state_machine() -> crate::util::Result<()> {
    let dir = TempDir::new()?;
    let mut c = Container::create(dir.path().join("state.ctree"), true)?;
    let g = c.create_group(c.root(), "g")?;
    let a = c.create_array(g, "a", f64_type(), Shape::d1(2), None)?;
    assert_eq!(c.state(a), ConstructState::Created);
    c.write_region(a, 0, &[1.0f64, 2.0])?;
    assert_eq!(c.state(a), ConstructState::Written);
    c.write_region(a, 1, &[3.0f64])?;
    assert_eq!(c.read_all::<f64>(a)?, vec![1.0, 3.0]);

    c.remove_group(g)?;
    assert_eq!(c.state(a), ConstructState::Unopened);
    assert!(matches!(c.write_region(a, 0, &[1.0f64]), Err(Error::InvalidState(_))));

    c.close()?;
    assert_eq!(c.state(a), ConstructState::Closed);
    assert!(matches!(c.create_group(c.root(), "late"), Err(Error::Closed)));
    assert!(matches!(c.close(), Err(Error::Closed)));
    Ok(())
}

#[test]
fn test_read_only_rejects_writes() -> crate::util::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("ro.ctree");
    Container::create(&path, true)?.close()?;

    let mut c = Container::open(&path, OpenMode::ReadOnly)?;
    assert!(matches!(c.create_group(c.root(), "x"), Err(Error::ReadOnly)));
    assert!(matches!(c.set_attribute(c.root(), "x", AttrValue::Int(1)), Err(Error::ReadOnly)));
    c.close()?;
    Ok(())
}

#[test]
fn test_text_and_compound_arrays() -> crate::util::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("text.ctree");
    let meta = CompoundType::new()
        .with_text("Domain", 32)
        .with_pod("NumShapes", PlainOldDataType::Float32);

    let mut c = Container::create(&path, true)?;
    let names = c.create_array(c.root(), "Products", ElementType::FixedString(8), Shape::d2(2, 2), None)?;
    c.write_region_bytes(names, 0, &pack_text(&["a", "b", "c", "dddddddd"], 8)?)?;
    let m = c.create_array(c.root(), "Meta", ElementType::Compound(meta.clone()), Shape::d1(1), None)?;
    let record = vec![FieldValue::from("CAD"), FieldValue::from(4.0)];
    c.write_region_bytes(m, 0, &pack_record(&meta, &record)?)?;
    c.close()?;

    let c = Container::open(&path, OpenMode::ReadOnly)?;
    let names = c.lookup_array("/Products")?;
    let bytes = c.read_region_bytes(names, 1, 1)?;
    assert_eq!(unpack_text(&bytes, 8)?, vec!["c", "dddddddd"]);
    let m = c.lookup_array("/Meta")?;
    assert_eq!(c.array_info(m)?.element, ElementType::Compound(meta.clone()));
    assert_eq!(unpack_record(&meta, &c.read_region_bytes(m, 0, 1)?)?, record);
    Ok(())
}

#[test]
fn test_same_content_same_bytes() -> crate::util::Result<()> {
    let dir = TempDir::new()?;
    let build = |name: &str| -> crate::util::Result<Vec<u8>> {
        let path = dir.path().join(name);
        let mut c = Container::create(&path, true)?;
        let g = c.create_group(c.root(), "properties")?;
        c.set_attribute(g, "depth", AttrValue::Int(0))?;
        let a = c.create_array(g, "v", f64_type(), Shape::d1(3), None)?;
        c.write_region(a, 0, &[0.25f64, 0.5, 0.75])?;
        c.close()?;
        Ok(std::fs::read(&path)?)
    };
    assert_eq!(build("one.ctree")?, build("two.ctree")?);
    Ok(())
}

#[test]
fn test_clear_group_keeps_position() -> crate::util::Result<()> {
    let dir = TempDir::new()?;
    let mut c = Container::create(dir.path().join("clear.ctree"), true)?;
    let a = c.create_group(c.root(), "a")?;
    c.create_group(a, "inner")?;
    c.set_attribute(a, "k", AttrValue::Int(1))?;
    c.create_group(c.root(), "b")?;

    c.clear_group(a)?;
    assert!(c.children(a)?.is_empty());
    assert!(c.attributes(a)?.is_empty());
    let names: Vec<String> = c.children(c.root())?.into_iter().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert!(matches!(c.remove_group(c.root()), Err(Error::InvalidState(_))));
    Ok(())
}

#[test]
fn test_open_rejects_garbage() -> crate::util::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("junk.ctree");
    std::fs::write(&path, b"definitely not a container file")?;
    assert!(matches!(Container::open(&path, OpenMode::ReadOnly), Err(Error::InvalidMagic)));
    assert!(matches!(
        Container::open(dir.path().join("missing.ctree"), OpenMode::ReadOnly),
        Err(Error::NotFound(_))
    ));

    // an extent patched to 2^62 rows must be rejected, not multiplied
    let path = dir.path().join("patched.ctree");
    {
        let mut c = Container::create(&path, true)?;
        let root = c.root();
        let a = c.create_array(root, "grid", f64_type(), Shape::d2(3, 7), Some(MaxShape::unlimited_rows(&Shape::d2(3, 7))))?;
        c.write_region(a, 0, &[0.5f64; 21])?;
        c.close()?;
    }
    let mut bytes = std::fs::read(&path)?;
    let mut dims = 2u32.to_le_bytes().to_vec();
    dims.extend_from_slice(&3u64.to_le_bytes());
    dims.extend_from_slice(&7u64.to_le_bytes());
    let at = bytes.windows(dims.len()).position(|w| w == dims.as_slice()).expect("array header");
    bytes[at + 4..at + 12].copy_from_slice(&(1u64 << 62).to_le_bytes());
    std::fs::write(&path, &bytes)?;
    assert!(matches!(Container::open(&path, OpenMode::ReadOnly), Err(Error::InvalidStructure(_))));
    Ok(())
}
