//! Summary of one export call.

use std::fmt;

use crate::extract::ExtractionWarning;

/// Row whose width was changed to the table's declared column count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeAdjustment {
    pub table: String,
    /// Row index within the table.
    pub row: usize,
    pub original: usize,
    pub declared: usize,
}

impl ShapeAdjustment {
    pub fn is_padding(&self) -> bool {
        self.original < self.declared
    }
}

impl fmt::Display for ShapeAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let how = if self.is_padding() { "padded" } else { "truncated" };
        write!(f, "{} row {}: {how} from {} to {} columns", self.table, self.row, self.original, self.declared)
    }
}

/// A construct that could not be created; its subtree was skipped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstructFailure {
    pub path: String,
    pub message: String,
}

/// What an export did. A completed export always returns one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExportReport {
    pub visited: usize,
    pub max_depth: usize,
    /// Nodes whose record lost a name, colour or property.
    pub degraded: usize,
    pub warnings: Vec<ExtractionWarning>,
    pub construct_failures: Vec<ConstructFailure>,
    /// Sibling groups renamed to avoid a name clash.
    pub collisions: usize,
    pub groups_written: usize,
    pub arrays_written: usize,
    pub rows_written: usize,
    pub adjustments: Vec<ShapeAdjustment>,
}

impl ExportReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: ExportReport) {
        self.visited += other.visited;
        self.max_depth = self.max_depth.max(other.max_depth);
        self.degraded += other.degraded;
        self.warnings.extend(other.warnings);
        self.construct_failures.extend(other.construct_failures);
        self.collisions += other.collisions;
        self.groups_written += other.groups_written;
        self.arrays_written += other.arrays_written;
        self.rows_written += other.rows_written;
        self.adjustments.extend(other.adjustments);
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// No degraded node, construct failure or row adjustment.
    pub fn is_clean(&self) -> bool {
        self.degraded == 0 && self.construct_failures.is_empty() && self.adjustments.is_empty()
    }
}

impl fmt::Display for ExportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "nodes visited:      {}", self.visited)?;
        writeln!(f, "max depth:          {}", self.max_depth)?;
        writeln!(f, "degraded nodes:     {}", self.degraded)?;
        writeln!(f, "warnings:           {}", self.warnings.len())?;
        writeln!(f, "construct failures: {}", self.construct_failures.len())?;
        writeln!(f, "name collisions:    {}", self.collisions)?;
        writeln!(f, "groups written:     {}", self.groups_written)?;
        write!(f, "arrays written:     {}", self.arrays_written)?;
        if self.rows_written > 0 {
            write!(f, "\nrows written:       {}", self.rows_written)?;
        }
        for failure in &self.construct_failures {
            write!(f, "\n  failed {}: {}", failure.path, failure.message)?;
        }
        for adjustment in &self.adjustments {
            write!(f, "\n  {adjustment}")?;
        }
        Ok(())
    }
}
