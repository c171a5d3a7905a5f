//! Fixed-schema tables: text, numeric matrices and compound records.
//!
//! Every table is a container array with a declared element type and shape.
//! Rows come in as lists of [`FieldValue`]; the [`ColumnPolicy`] decides
//! what happens when their widths differ.

use std::borrow::Cow;

use rustc_hash::FxHashMap;

use super::report::{ExportReport, ShapeAdjustment};
use crate::container::{pack_numeric, pack_record, pack_text, ConstructState, Container, FieldValue, GroupId};
use crate::container::ArrayId;
use crate::util::{CompoundType, ElementType, Error, FieldKind, MaxShape, PlainOldDataType, Result, Shape};

/// How the column count of a table is decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnPolicy {
    /// Width of the first row; any other width is an error.
    Uniform,
    /// Caller-supplied width; other rows are padded or truncated and each
    /// change is reported as a [`ShapeAdjustment`].
    Declared(usize),
}

/// Payload of a table.
#[derive(Clone, Debug, PartialEq)]
pub enum TableKind {
    /// `rows x columns` null-padded strings of at most `max_len` bytes.
    Text { max_len: usize },
    /// `rows x columns` numbers.
    Numeric(PlainOldDataType),
    /// One record per row; columns are the record's fields.
    Compound(CompoundType),
}

impl TableKind {
    fn element(&self) -> ElementType {
        match self {
            Self::Text { max_len } => ElementType::FixedString(*max_len),
            Self::Numeric(pod) => ElementType::Pod(*pod),
            Self::Compound(ct) => ElementType::Compound(ct.clone()),
        }
    }

    fn shape(&self, rows: usize, columns: usize) -> Shape {
        match self {
            Self::Compound(_) => Shape::d1(rows),
            _ => Shape::d2(rows, columns),
        }
    }

    /// Filler for a padded cell.
    fn pad_value(&self, column: usize) -> FieldValue {
        match self {
            Self::Text { .. } => FieldValue::Text(String::new()),
            Self::Numeric(pod) if pod.is_float() => FieldValue::Float(0.0),
            Self::Numeric(_) => FieldValue::Int(0),
            Self::Compound(ct) => match ct.fields().get(column).map(|f| &f.kind) {
                Some(FieldKind::FixedString(_)) => FieldValue::Text(String::new()),
                Some(FieldKind::Pod(pod)) if pod.is_float() => FieldValue::Float(0.0),
                _ => FieldValue::Int(0),
            },
        }
    }

    fn pack_row(&self, row: &[FieldValue]) -> Result<Vec<u8>> {
        match self {
            Self::Text { max_len } => {
                let texts = row
                    .iter()
                    .map(|v| match v {
                        FieldValue::Text(s) => Ok(s.as_str()),
                        other => Err(Error::TypeMismatch {
                            expected: format!("string[{max_len}]"),
                            actual: format!("{other:?}"),
                        }),
                    })
                    .collect::<Result<Vec<&str>>>()?;
                pack_text(&texts, *max_len)
            }
            Self::Numeric(pod) => pack_numeric(*pod, row),
            Self::Compound(ct) => pack_record(ct, row),
        }
    }

    /// Recover the kind of an existing array.
    fn from_element(element: &ElementType) -> Result<Self> {
        match element {
            ElementType::FixedString(n) => Ok(Self::Text { max_len: *n }),
            ElementType::Pod(pod) => Ok(Self::Numeric(*pod)),
            ElementType::Compound(ct) => Ok(Self::Compound(ct.clone())),
            ElementType::VarLen(_) => Err(Error::TypeMismatch {
                expected: "table".into(),
                actual: element.to_string(),
            }),
        }
    }
}

#[derive(Debug)]
struct Table {
    id: ArrayId,
    kind: TableKind,
    columns: usize,
    policy: ColumnPolicy,
}

/// Writes named tables into one container group.
#[derive(Debug)]
pub struct TableExporter<'c> {
    container: &'c mut Container,
    group: GroupId,
    tables: FxHashMap<String, Table>,
}

impl<'c> TableExporter<'c> {
    pub fn new(container: &'c mut Container, group: GroupId) -> Self {
        Self { container, group, tables: FxHashMap::default() }
    }

    pub fn container(&self) -> &Container {
        self.container
    }

    /// Lifecycle state of a table; `Unopened` for one this exporter does not know.
    pub fn state(&self, name: &str) -> ConstructState {
        self.tables.get(name).map_or(ConstructState::Unopened, |t| self.container.state(t.id))
    }

    /// Pick up a table written by an earlier export so it can be appended to.
    pub fn attach(&mut self, name: &str, policy: ColumnPolicy) -> Result<bool> {
        let Some(id) = self.container.array(self.group, name)? else {
            return Ok(false);
        };
        let info = self.container.array_info(id)?;
        let kind = TableKind::from_element(&info.element)?;
        let columns = match &kind {
            TableKind::Compound(ct) => ct.len(),
            _ => info.shape.row_len(),
        };
        self.tables.insert(name.to_string(), Table { id, kind, columns, policy });
        Ok(true)
    }

    /// Create a fixed-size table and write `rows` into it.
    pub fn export_table(
        &mut self,
        name: &str,
        rows: &[Vec<FieldValue>],
        kind: TableKind,
        policy: ColumnPolicy,
    ) -> Result<ExportReport> {
        self.create(name, rows, kind, policy, false)
    }

    /// Like [`export_table`](Self::export_table), with an unlimited number of rows.
    pub fn export_resizable(
        &mut self,
        name: &str,
        rows: &[Vec<FieldValue>],
        kind: TableKind,
        policy: ColumnPolicy,
    ) -> Result<ExportReport> {
        self.create(name, rows, kind, policy, true)
    }

    fn create(
        &mut self,
        name: &str,
        rows: &[Vec<FieldValue>],
        kind: TableKind,
        policy: ColumnPolicy,
        resizable: bool,
    ) -> Result<ExportReport> {
        let columns = match (&kind, policy) {
            (TableKind::Compound(ct), ColumnPolicy::Declared(w)) if w != ct.len() => {
                return Err(Error::ShapeMismatch(format!(
                    "{name}: declared {w} columns, record has {} fields",
                    ct.len()
                )))
            }
            (TableKind::Compound(ct), _) => ct.len(),
            (_, ColumnPolicy::Declared(w)) => w,
            (_, ColumnPolicy::Uniform) => rows.first().map_or(0, Vec::len),
        };
        // encode before creating so a bad row leaves nothing behind
        let (bytes, adjustments) = encode_rows(name, &kind, columns, policy, rows, 0)?;

        let shape = kind.shape(rows.len(), columns);
        let max_shape = resizable.then(|| MaxShape::unlimited_rows(&shape));
        let id = self.container.create_array(self.group, name, kind.element(), shape, max_shape)?;
        if !rows.is_empty() {
            self.container.write_region_bytes(id, 0, &bytes)?;
        }
        tracing::debug!(table = name, rows = rows.len(), columns, resizable, "table written");
        self.tables.insert(name.to_string(), Table { id, kind, columns, policy });

        Ok(ExportReport {
            arrays_written: 1,
            rows_written: rows.len(),
            adjustments,
            ..ExportReport::default()
        })
    }

    fn table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::InvalidState(format!("table {name} has not been created")))
    }

    /// Grow a resizable table by `rows` and write them into the new region only.
    pub fn append(&mut self, name: &str, rows: &[Vec<FieldValue>]) -> Result<ExportReport> {
        let table = self.table(name)?;
        let id = table.id;
        let info = self.container.array_info(id)?;
        let start = info.shape.rows();
        let (bytes, adjustments) = encode_rows(name, &table.kind, table.columns, table.policy, rows, start)?;
        if rows.is_empty() {
            return Ok(ExportReport::default());
        }

        let mut shape = info.shape;
        shape.set_size(0, start + rows.len());
        self.container.extend(id, shape)?;
        self.container.write_region_bytes(id, start, &bytes)?;
        tracing::debug!(table = name, from = start, added = rows.len(), "table appended");
        Ok(ExportReport { rows_written: rows.len(), adjustments, ..ExportReport::default() })
    }

    /// Overwrite rows in place starting at `offset`. The shape is unchanged.
    pub fn write_rows(&mut self, name: &str, offset: usize, rows: &[Vec<FieldValue>]) -> Result<ExportReport> {
        let table = self.table(name)?;
        let id = table.id;
        let (bytes, adjustments) = encode_rows(name, &table.kind, table.columns, table.policy, rows, offset)?;
        if !rows.is_empty() {
            self.container.write_region_bytes(id, offset, &bytes)?;
        }
        Ok(ExportReport { rows_written: rows.len(), adjustments, ..ExportReport::default() })
    }

    /// Write an N-dimensional numeric block, row-major.
    pub fn export_block(
        &mut self,
        name: &str,
        pod: PlainOldDataType,
        dims: &[usize],
        values: &[f64],
    ) -> Result<ExportReport> {
        let shape = Shape::from_slice(dims);
        if values.len() != shape.num_points() {
            return Err(Error::ShapeMismatch(format!(
                "{name}: {} values for a {shape} block",
                values.len()
            )));
        }
        let cells: Vec<FieldValue> = values.iter().map(|&v| FieldValue::Float(v)).collect();
        let bytes = pack_numeric(pod, &cells)?;
        let id = self.container.create_array(self.group, name, ElementType::Pod(pod), shape, None)?;
        if !bytes.is_empty() {
            self.container.write_region_bytes(id, 0, &bytes)?;
        }
        let columns = dims.iter().skip(1).product();
        self.tables.insert(
            name.to_string(),
            Table { id, kind: TableKind::Numeric(pod), columns, policy: ColumnPolicy::Uniform },
        );
        Ok(ExportReport { arrays_written: 1, rows_written: dims.first().copied().unwrap_or(1), ..ExportReport::default() })
    }
}

/// Encode rows to `columns` cells each; `first_row` numbers the adjustments.
fn encode_rows(
    table: &str,
    kind: &TableKind,
    columns: usize,
    policy: ColumnPolicy,
    rows: &[Vec<FieldValue>],
    first_row: usize,
) -> Result<(Vec<u8>, Vec<ShapeAdjustment>)> {
    let mut bytes = Vec::new();
    let mut adjustments = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let cells: Cow<'_, [FieldValue]> = if row.len() == columns {
            Cow::Borrowed(row)
        } else {
            match policy {
                ColumnPolicy::Uniform => {
                    return Err(Error::ShapeMismatch(format!(
                        "{table} row {}: {} columns, expected {columns}",
                        first_row + i,
                        row.len()
                    )))
                }
                ColumnPolicy::Declared(_) => {
                    adjustments.push(ShapeAdjustment {
                        table: table.to_string(),
                        row: first_row + i,
                        original: row.len(),
                        declared: columns,
                    });
                    let mut cells: Vec<FieldValue> = row.iter().take(columns).cloned().collect();
                    cells.extend((cells.len()..columns).map(|c| kind.pad_value(c)));
                    Cow::Owned(cells)
                }
            }
        };
        bytes.extend(kind.pack_row(&cells)?);
    }
    Ok((bytes, adjustments))
}
