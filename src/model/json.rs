//! JSON assembly description.
//!
//! ```json
//! { "root": { "shape": "COMPOUND", "name": "asm", "children": [
//!     { "tag": 1, "shape": "SOLID", "color": [1, 0, 0],
//!       "geometry": { "type": "box", "min": [0, 0, 0], "max": [1, 2, 5] } }
//! ] } }
//! ```
//!
//! A missing `tag` defaults to the node's 1-based position among its
//! siblings (1 for the root).

use std::path::Path;

use glam::DVec3;
use serde::Deserialize;

use super::document::{Assembly, Document};
use super::geometry::{Geometry, TriangleMesh};
use super::node::{Color, Node, NodeId, ShapeType};
use crate::util::{Error, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DocumentSpec {
    root: NodeSpec,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NodeSpec {
    tag: Option<u32>,
    name: Option<String>,
    color: Option<[f64; 3]>,
    shape: ShapeType,
    geometry: Option<GeometrySpec>,
    #[serde(default)]
    children: Vec<NodeSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
enum GeometrySpec {
    Box { min: [f64; 3], max: [f64; 3] },
    Mesh { vertices: Vec<[f64; 3]>, triangles: Vec<[u32; 3]> },
    Polyline {
        points: Vec<[f64; 3]>,
        #[serde(default)]
        closed: bool,
    },
    Point { at: [f64; 3] },
    Compound { parts: Vec<GeometrySpec> },
}

impl GeometrySpec {
    fn build(self) -> Geometry {
        match self {
            Self::Box { min, max } => {
                Geometry::Mesh(TriangleMesh::cuboid(DVec3::from(min), DVec3::from(max)))
            }
            Self::Mesh { vertices, triangles } => Geometry::Mesh(TriangleMesh::new(
                vertices.into_iter().map(DVec3::from).collect(),
                triangles,
            )),
            Self::Polyline { points, closed } => Geometry::Polyline {
                points: points.into_iter().map(DVec3::from).collect(),
                closed,
            },
            Self::Point { at } => Geometry::Point(DVec3::from(at)),
            Self::Compound { parts } => {
                Geometry::Compound(parts.into_iter().map(GeometrySpec::build).collect())
            }
        }
    }
}

impl NodeSpec {
    fn to_node(&mut self, default_tag: u32) -> Node {
        Node {
            tag: self.tag.unwrap_or(default_tag),
            name: self.name.take(),
            color: self.color.map(|[r, g, b]| Color::new(r, g, b)),
            shape_type: self.shape,
            children: Vec::new(),
            geometry: self.geometry.take().map(GeometrySpec::build),
        }
    }
}

/// Parse a JSON assembly file.
pub fn parse(path: impl AsRef<Path>) -> Result<Assembly> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::parse(path, e.to_string()))?;
    Ok(parse_str(&text, path)?.with_source(path))
}

/// Parse JSON text; `origin` only labels errors.
pub fn parse_str(text: &str, origin: impl AsRef<Path>) -> Result<Assembly> {
    let spec: DocumentSpec =
        serde_json::from_str(text).map_err(|e| Error::parse(origin.as_ref(), e.to_string()))?;

    let mut root = spec.root;
    let mut doc = Assembly::new(root.to_node(1));
    let mut pending: Vec<(NodeId, Vec<NodeSpec>)> = vec![(doc.root(), root.children)];
    while let Some((parent, children)) = pending.pop() {
        for (i, mut child) in children.into_iter().enumerate() {
            let id = doc.add_child(parent, child.to_node(i as u32 + 1))?;
            pending.push((id, std::mem::take(&mut child.children)));
        }
    }
    tracing::debug!(nodes = doc.len(), "parsed JSON assembly");
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "root": {
            "shape": "COMPOUND",
            "name": "asm",
            "children": [
                { "shape": "SOLID", "name": "block", "color": [1, 0, 0],
                  "geometry": { "type": "box", "min": [0, 0, 0], "max": [1, 2, 5] } },
                { "tag": 7, "shape": "EDGE", "name": "",
                  "geometry": { "type": "polyline", "points": [[0, 0, 0], [3, 4, 0]] },
                  "children": [ { "shape": "VERTEX" } ] }
            ]
        }
    }"#;

    #[test]
    fn test_parse_sample() {
        let doc = parse_str(SAMPLE, "sample.json").unwrap();
        assert_eq!(doc.len(), 4);
        let root = doc.root();
        let kids = doc.children_of(root).to_vec();
        assert_eq!(kids.len(), 2);

        let block = doc.node(kids[0]).unwrap();
        assert_eq!(block.tag, 1);
        assert_eq!(block.shape_type, ShapeType::Solid);
        assert_eq!(block.color, Some(Color::new(1.0, 0.0, 0.0)));
        assert!(matches!(block.geometry, Some(Geometry::Mesh(_))));

        let edge = doc.node(kids[1]).unwrap();
        assert_eq!(edge.tag, 7);
        assert_eq!(doc.name_of(kids[1]), Some(""));
        let vertex = doc.children_of(kids[1])[0];
        assert_eq!(doc.node(vertex).unwrap().tag, 1);
        assert_eq!(doc.name_of(vertex), None);
    }

    #[test]
    fn test_parse_errors() {
        let err = parse_str(r#"{ "root": { "shape": "BLOB" } }"#, "bad.json").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        let err = parse_str("not json", "bad.json").unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_parse_file_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asm.json");
        std::fs::write(&path, SAMPLE).unwrap();
        let doc = parse(&path).unwrap();
        assert_eq!(doc.source(), Some(path.as_path()));
        assert_eq!(doc.name_of(doc.root()), Some("asm"));
        assert_eq!(doc.node(doc.root()).unwrap().shape_type, ShapeType::Compound);
    }
}
