//! Mass-property computation.
//!
//! The extractor only sees the [`GeometryKernel`] trait; [`MeshKernel`] is
//! the built-in implementation over triangle meshes and polylines.

mod mesh;

use std::fmt;

use glam::DVec3;
use thiserror::Error;

use crate::model::Geometry;

pub use mesh::MeshKernel;

/// Which integral to compute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Volume,
    Area,
    Length,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Volume => "volume",
            Self::Area => "area",
            Self::Length => "length",
        })
    }
}

/// Result of one property computation: the measure and its centre of mass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MassProperties {
    pub value: f64,
    pub centroid: DVec3,
}

/// Kernel failures. These degrade a single node, never a whole export.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeError {
    /// Geometry has nothing that carries this measure
    #[error("cannot compute {kind} of {geometry} geometry")]
    Unsupported { kind: PropertyKind, geometry: &'static str },

    /// Measure is zero, so there is no centroid
    #[error("degenerate geometry: zero {0}")]
    Degenerate(PropertyKind),

    /// Triangle refers to a vertex that does not exist
    #[error("triangle {triangle} references a missing vertex")]
    InvalidIndex { triangle: usize },

    /// NaN or infinite coordinate
    #[error("non-finite coordinate in {0} geometry")]
    NonFinite(&'static str),
}

/// Property computation over node geometry.
pub trait GeometryKernel {
    /// Compute `kind` over the whole of `geometry`, with its centroid.
    fn compute(&self, geometry: &Geometry, kind: PropertyKind) -> Result<MassProperties, ComputeError>;
}

impl<K: GeometryKernel + ?Sized> GeometryKernel for &K {
    fn compute(&self, geometry: &Geometry, kind: PropertyKind) -> Result<MassProperties, ComputeError> {
        (**self).compute(geometry, kind)
    }
}
