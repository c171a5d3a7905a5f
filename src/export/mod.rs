//! Writing assembly trees into a [`Container`](crate::container::Container).
//!
//! - [`tree`] - one group per node with scalar attributes
//! - [`table`] - fixed-schema text, numeric and compound tables
//! - [`flat`] - the assembly as four tables
//! - [`report`] - what an export did

pub mod flat;
pub mod report;
pub mod table;
pub mod tree;

pub use flat::{export_flat, FlatExportOptions, FlatMeta};
pub use report::{ConstructFailure, ExportReport, ShapeAdjustment};
pub use table::{ColumnPolicy, TableExporter, TableKind};
pub use tree::{export_subtree, export_tree, TreeExportOptions};
