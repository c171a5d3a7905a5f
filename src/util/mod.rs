//! Utility types used throughout the crate.
//!
//! - [`PlainOldDataType`] - numeric storage types
//! - [`ElementType`] / [`CompoundType`] - array element layouts
//! - [`Shape`] / [`MaxShape`] - current and maximum array extents
//! - [`Error`] / [`Result`] - error handling

mod element;
mod error;
mod pod;
mod shape;

pub use element::*;
pub use error::*;
pub use pod::*;
pub use shape::*;
