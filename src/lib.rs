//! # cadtree
//!
//! Walks a CAD assembly tree, extracts per-node attributes (name, color,
//! volume, area or length with a centroid) and writes them into a typed,
//! hierarchical container file.
//!
//! ## Modules
//!
//! - [`util`] - storage types (POD, element types, shapes, errors)
//! - [`model`] - assembly documents and the JSON and STEP readers
//! - [`kernel`] - geometric property computation
//! - [`walk`] - depth-first traversal with cycle detection
//! - [`extract`] - per-node attribute records
//! - [`container`] - the container file (groups, attributes, arrays)
//! - [`export`] - hierarchical and tabular exporters
//! - [`config`] - JSON export settings
//!
//! ## Example
//!
//! ```ignore
//! use cadtree::container::Container;
//! use cadtree::export::{export_tree, TreeExportOptions};
//! use cadtree::extract::AttributeExtractor;
//! use cadtree::kernel::MeshKernel;
//!
//! let doc = cadtree::model::parse("assembly.step")?;
//! let mut out = Container::create("assembly.ctree", true)?;
//! let report = export_tree(&doc, &AttributeExtractor::new(MeshKernel), &mut out, &TreeExportOptions::default())?;
//! out.close()?;
//! println!("{report}");
//! ```

pub mod config;
pub mod container;
pub mod export;
pub mod extract;
pub mod kernel;
pub mod model;
pub mod util;
pub mod walk;

pub use util::{Error, Result};
