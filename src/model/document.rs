//! Document access and the arena-backed [`Assembly`].

use std::path::{Path, PathBuf};

use super::geometry::Geometry;
use super::node::{Color, Node, NodeId};
use crate::util::{Error, Result};

/// Read-only view of an assembly tree.
pub trait Document {
    /// Root node of the tree.
    fn root(&self) -> NodeId;

    /// Resolve a node id; `None` for an id the document does not contain.
    fn node(&self, id: NodeId) -> Option<&Node>;

    fn name_of(&self, id: NodeId) -> Option<&str> {
        self.node(id).and_then(|n| n.name.as_deref())
    }

    /// Raw color lookup. The value is not validated here.
    fn color_of(&self, id: NodeId) -> Option<Color> {
        self.node(id).and_then(|n| n.color)
    }

    /// Children in document order.
    fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or_default()
    }

    fn geometry_of(&self, id: NodeId) -> Option<&Geometry> {
        self.node(id).and_then(|n| n.geometry.as_ref())
    }
}

/// Assembly tree stored as a flat arena; parents own children by id.
#[derive(Clone, Debug)]
pub struct Assembly {
    nodes: Vec<Node>,
    root: NodeId,
    source: Option<PathBuf>,
}

impl Assembly {
    /// New assembly holding only `root`.
    pub fn new(root: Node) -> Self {
        Self { nodes: vec![root], root: NodeId(0), source: None }
    }

    pub fn with_source(mut self, path: impl AsRef<Path>) -> Self {
        self.source = Some(path.as_ref().to_path_buf());
        self
    }

    /// File the assembly was parsed from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Append `node` as the last child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, node: Node) -> Result<NodeId> {
        if parent.index() >= self.nodes.len() {
            return Err(Error::NotFound(format!("node {parent}")));
        }
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.nodes[parent.index()].children.push(id);
        Ok(id)
    }

    /// Add an existing node as a further child of `parent` without any
    /// ownership check. Used to build deliberately malformed trees.
    pub fn link(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let node = self
            .nodes
            .get_mut(parent.index())
            .ok_or_else(|| Error::NotFound(format!("node {parent}")))?;
        node.children.push(child);
        Ok(())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in arena order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }
}

impl Document for Assembly {
    fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ShapeType;

    #[test]
    fn test_build_and_query() {
        let mut doc = Assembly::new(Node::new(1, ShapeType::Compound).with_name("asm"));
        let a = doc.add_child(doc.root(), Node::new(1, ShapeType::Solid)).unwrap();
        let b = doc
            .add_child(doc.root(), Node::new(2, ShapeType::Face).with_name(""))
            .unwrap();

        assert_eq!(doc.children_of(doc.root()), &[a, b]);
        assert_eq!(doc.name_of(doc.root()), Some("asm"));
        assert_eq!(doc.name_of(a), None);
        assert_eq!(doc.name_of(b), Some(""));
        assert!(doc.children_of(NodeId(99)).is_empty());
        assert!(doc.add_child(NodeId(99), Node::default()).is_err());
    }
}
