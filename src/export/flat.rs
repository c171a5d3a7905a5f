//! Flat assembly layout: four fixed-schema tables in one group.
//!
//! ```text
//! /<group>
//!     Meta         compound[1]   Domain, Origin, Mesh (text), NumShapes, Version_M, Version_R (float32)
//!     Products     text[N x 3]   display name, entry, parent entry
//!     Properties   float64[N x 7] tag, volume, area, length, cx, cy, cz
//!     Colors       float32[N x 3] r, g, b
//! ```
//!
//! Missing values are NaN. All tables are resizable; exporting into a group
//! that already holds them appends rows and updates `NumShapes`.

use serde::{Deserialize, Serialize};

use super::report::ExportReport;
use super::table::{ColumnPolicy, TableExporter, TableKind};
use crate::container::{Container, FieldValue, GroupId};
use crate::extract::AttributeExtractor;
use crate::kernel::GeometryKernel;
use crate::model::Document;
use crate::util::{CompoundType, ElementType, Error, PlainOldDataType, Result};
use crate::walk::{walk, Visit, VisitFlow};

pub const DEFAULT_FLAT_GROUP: &str = "assembly";
pub const META: &str = "Meta";
pub const PRODUCTS: &str = "Products";
pub const PROPERTIES: &str = "Properties";
pub const COLORS: &str = "Colors";

const TABLES: [&str; 4] = [META, PRODUCTS, PROPERTIES, COLORS];

/// Contents of the `Meta` record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlatMeta {
    pub domain: String,
    pub origin: String,
    pub mesh: String,
    pub version_major: f32,
    pub version_minor: f32,
}

impl Default for FlatMeta {
    fn default() -> Self {
        Self {
            domain: "CAD".to_string(),
            origin: String::new(),
            mesh: "none".to_string(),
            version_major: 1.0,
            version_minor: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlatExportOptions {
    pub group: String,
    /// Fixed width of every text cell.
    pub text_width: usize,
    pub meta: FlatMeta,
}

impl Default for FlatExportOptions {
    fn default() -> Self {
        Self { group: DEFAULT_FLAT_GROUP.to_string(), text_width: 32, meta: FlatMeta::default() }
    }
}

fn meta_type(width: usize) -> CompoundType {
    CompoundType::new()
        .with_text("Domain", width)
        .with_text("Origin", width)
        .with_text("Mesh", width)
        .with_pod("NumShapes", PlainOldDataType::Float32)
        .with_pod("Version_M", PlainOldDataType::Float32)
        .with_pod("Version_R", PlainOldDataType::Float32)
}

fn meta_row(meta: &FlatMeta, shapes: usize) -> Vec<FieldValue> {
    vec![
        FieldValue::from(meta.domain.as_str()),
        FieldValue::from(meta.origin.as_str()),
        FieldValue::from(meta.mesh.as_str()),
        FieldValue::Float(shapes as f64),
        FieldValue::Float(meta.version_major.into()),
        FieldValue::Float(meta.version_minor.into()),
    ]
}

/// Fail before anything is written when a text cell cannot fit.
fn check_text_width<'a>(cells: impl IntoIterator<Item = &'a FieldValue>, width: usize) -> Result<()> {
    for cell in cells {
        if let FieldValue::Text(s) = cell {
            if s.len() > width {
                return Err(Error::ValueTooLong { value: s.clone(), len: s.len(), max: width });
            }
        }
    }
    Ok(())
}

/// Row count of a complete layout already under `group`; `None` when the
/// group holds none of the tables. A partial or mismatched layout is an
/// error so that nothing is appended to it.
fn existing_rows(container: &Container, group: GroupId, width: usize) -> Result<Option<usize>> {
    let mut found = Vec::with_capacity(TABLES.len());
    for name in TABLES {
        if let Some(id) = container.array(group, name)? {
            found.push((name, container.array_info(id)?));
        }
    }
    if found.is_empty() {
        return Ok(None);
    }
    if found.len() < TABLES.len() {
        let present: Vec<&str> = found.iter().map(|(name, _)| *name).collect();
        return Err(Error::invalid(format!("incomplete flat layout, only {} present", present.join(", "))));
    }

    let expected = [
        ElementType::Compound(meta_type(width)),
        ElementType::FixedString(width),
        ElementType::Pod(PlainOldDataType::Float64),
        ElementType::Pod(PlainOldDataType::Float32),
    ];
    let mut rows = None;
    for ((name, info), element) in found.iter().zip(expected) {
        if info.element != element {
            return Err(Error::invalid(format!("{name} holds {}, expected {element}", info.element)));
        }
        if !info.max_shape.is_resizable() {
            return Err(Error::invalid(format!("{name} is not resizable")));
        }
        let columns = match *name {
            META => {
                if info.shape.rows() == 0 {
                    return Err(Error::invalid("Meta holds no record"));
                }
                continue;
            }
            PROPERTIES => 7,
            _ => 3,
        };
        if info.shape.row_len() != columns {
            return Err(Error::invalid(format!("{name} has {} columns, expected {columns}", info.shape.row_len())));
        }
        match rows {
            Some(n) if n != info.shape.rows() => {
                return Err(Error::invalid(format!("{name} has {} rows, expected {n}", info.shape.rows())));
            }
            _ => rows = Some(info.shape.rows()),
        }
    }
    Ok(rows)
}

#[derive(Default)]
struct Rows {
    products: Vec<Vec<FieldValue>>,
    properties: Vec<Vec<FieldValue>>,
    colors: Vec<Vec<FieldValue>>,
}

/// Export every node under `doc.root()` as one row of each table.
pub fn export_flat<D, K>(
    doc: &D,
    extractor: &AttributeExtractor<K>,
    container: &mut Container,
    options: &FlatExportOptions,
) -> Result<ExportReport>
where
    D: Document + ?Sized,
    K: GeometryKernel,
{
    let span = tracing::info_span!("export_flat", group = %options.group, file = %container.path().display());
    let _enter = span.enter();

    let mut report = ExportReport::default();
    let mut rows = Rows::default();
    // entries of the current path, by depth
    let mut entries: Vec<String> = Vec::new();

    let walked = walk(doc, doc.root(), &mut |visit: &Visit<'_>| -> Result<VisitFlow> {
        let extraction = extractor.extract(doc, visit);
        if extraction.is_degraded() {
            tracing::warn!(entry = %visit.entry, warnings = extraction.warnings.len(), "degraded node");
            report.degraded += 1;
        }
        report.warnings.extend(extraction.warnings);
        let record = extraction.record;

        entries.truncate(visit.depth);
        let parent = entries.last().cloned().unwrap_or_default();
        rows.products.push(vec![
            FieldValue::from(record.display_name()),
            FieldValue::Text(record.entry.clone()),
            FieldValue::Text(parent),
        ]);

        let centroid = record.centroid.map_or([f64::NAN; 3], |c| c.to_array());
        rows.properties.push(
            [
                f64::from(record.tag),
                record.property.volume().unwrap_or(f64::NAN),
                record.property.area().unwrap_or(f64::NAN),
                record.property.length().unwrap_or(f64::NAN),
                centroid[0],
                centroid[1],
                centroid[2],
            ]
            .into_iter()
            .map(FieldValue::Float)
            .collect(),
        );

        let color = record.color.map_or([f64::NAN; 3], |c| c.to_array());
        rows.colors.push(color.into_iter().map(FieldValue::Float).collect());

        entries.push(record.entry);
        Ok(VisitFlow::Continue)
    })?;
    report.visited = walked.visited;
    report.max_depth = walked.max_depth;
    check_text_width(rows.products.iter().flatten().chain(&meta_row(&options.meta, 0)), options.text_width)?;

    let root = container.root();
    let existing = container.group(root, &options.group)?;
    let appending = match existing {
        Some(group) => existing_rows(container, group, options.text_width)?,
        None => None,
    };
    let group = match existing {
        Some(group) => group,
        None => container.create_group(root, &options.group)?,
    };
    report.groups_written = usize::from(existing.is_none());

    let mut tables = TableExporter::new(container, group);
    let text = TableKind::Text { max_len: options.text_width };
    let meta = TableKind::Compound(meta_type(options.text_width));

    if let Some(before) = appending {
        for name in TABLES {
            if !tables.attach(name, ColumnPolicy::Uniform)? {
                return Err(Error::invalid(format!("table {name} missing")));
            }
        }
        tracing::debug!(existing = before, added = rows.products.len(), "appending to flat tables");

        report.merge(tables.append(PRODUCTS, &rows.products)?);
        report.merge(tables.append(PROPERTIES, &rows.properties)?);
        report.merge(tables.append(COLORS, &rows.colors)?);
        let total = before + rows.products.len();
        report.merge(tables.write_rows(META, 0, &[meta_row(&options.meta, total)])?);
    } else {
        let shapes = rows.products.len();
        report.merge(tables.export_resizable(META, &[meta_row(&options.meta, shapes)], meta, ColumnPolicy::Uniform)?);
        report.merge(tables.export_resizable(PRODUCTS, &rows.products, text, ColumnPolicy::Declared(3))?);
        report.merge(tables.export_resizable(
            PROPERTIES,
            &rows.properties,
            TableKind::Numeric(PlainOldDataType::Float64),
            ColumnPolicy::Declared(7),
        )?);
        report.merge(tables.export_resizable(
            COLORS,
            &rows.colors,
            TableKind::Numeric(PlainOldDataType::Float32),
            ColumnPolicy::Declared(3),
        )?);
    }
    container.flush()?;

    tracing::info!(rows = report.visited, appended = appending.is_some(), "flat export finished");
    Ok(report)
}
