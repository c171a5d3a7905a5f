//! Persistent hierarchical container.
//!
//! Groups nest like directories and carry typed scalar attributes. Arrays
//! hold fixed-size elements (numbers, fixed text, compound records) in a
//! declared, optionally resizable shape, or variable-length rows with a
//! length per row.
//!
//! ```ignore
//! use cadtree::container::{AttrValue, Container};
//! use cadtree::util::{ElementType, PlainOldDataType, Shape};
//!
//! let mut c = Container::create("out.ctree", true)?;
//! let g = c.create_group(c.root(), "properties")?;
//! c.set_attribute(g, "tag", AttrValue::Int(1))?;
//! let a = c.create_array(g, "values", ElementType::Pod(PlainOldDataType::Float64), Shape::d1(3), None)?;
//! c.write_region(a, 0, &[1.0f64, 2.0, 3.0])?;
//! c.close()?;
//! ```

mod archive;
pub mod format;
pub mod reader;
pub mod stream;
mod values;
mod vlen;

#[cfg(test)]
mod tests;

pub use archive::{ArrayId, ArrayInfo, ChildRef, ConstructState, Container, GroupId, OpenMode};
pub use values::{pack_record, pack_text, unpack_record, unpack_text, AttrValue, FieldValue};
pub(crate) use values::pack_numeric;
pub use vlen::{ReleaseLedger, VlenBuffers};
