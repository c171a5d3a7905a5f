//! Assembly tree nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::geometry::Geometry;

/// Index of a node in an [`Assembly`](super::Assembly) arena.
///
/// This is the node's identity; tags are only unique among siblings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Topological kind of a node's shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShapeType {
    Compound,
    #[serde(rename = "COMPSOLID")]
    CompSolid,
    Solid,
    Shell,
    Face,
    Wire,
    Edge,
    Vertex,
    #[default]
    Other,
}

impl ShapeType {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Compound => "COMPOUND",
            Self::CompSolid => "COMPSOLID",
            Self::Solid => "SOLID",
            Self::Shell => "SHELL",
            Self::Face => "FACE",
            Self::Wire => "WIRE",
            Self::Edge => "EDGE",
            Self::Vertex => "VERTEX",
            Self::Other => "OTHER",
        }
    }

    /// Parse an upper-case shape name; unknown names map to `Other`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "COMPOUND" => Self::Compound,
            "COMPSOLID" => Self::CompSolid,
            "SOLID" => Self::Solid,
            "SHELL" => Self::Shell,
            "FACE" => Self::Face,
            "WIRE" => Self::Wire,
            "EDGE" => Self::Edge,
            "VERTEX" => Self::Vertex,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// RGB color with channels nominally in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// True when every channel is finite and within `[0, 1]`.
    pub fn is_valid(&self) -> bool {
        [self.r, self.g, self.b].iter().all(|c| (0.0..=1.0).contains(c))
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.r, self.g, self.b]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.r, self.g, self.b)
    }
}

/// One entry of the assembly tree.
#[derive(Clone, Debug, Default)]
pub struct Node {
    /// Label tag, local to the parent.
    pub tag: u32,
    pub name: Option<String>,
    pub color: Option<Color>,
    pub shape_type: ShapeType,
    pub children: Vec<NodeId>,
    pub geometry: Option<Geometry>,
}

impl Node {
    pub fn new(tag: u32, shape_type: ShapeType) -> Self {
        Self { tag, shape_type, ..Default::default() }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }
}
