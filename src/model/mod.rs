//! In-memory assembly model and the document readers.
//!
//! - [`Document`] - read-only access used by traversal and extraction
//! - [`Assembly`] - arena-backed document
//! - [`json`] / [`step`] - readers producing an [`Assembly`]

mod document;
mod geometry;
pub mod json;
mod node;
pub mod step;

use std::path::Path;

pub use document::{Assembly, Document};
pub use geometry::{Geometry, TriangleMesh};
pub use node::{Color, Node, NodeId, ShapeType};

use crate::util::{Error, Result};

/// Parse an assembly document, choosing the reader by file extension.
///
/// `.json` files use [`json::parse`]; `.step`, `.stp` and `.p21` use
/// [`step::parse`].
pub fn parse(path: impl AsRef<Path>) -> Result<Assembly> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "json" => json::parse(path),
        "step" | "stp" | "p21" => step::parse(path),
        _ => Err(Error::parse(path, format!("unsupported document type {ext:?}"))),
    }
}
