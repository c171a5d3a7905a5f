//! Pre-order traversal of an assembly tree.
//!
//! [`walk`] visits the root at depth 0, then each child in document order.
//! The ancestor set of the current path guards against cycles: a node that
//! would be entered again below itself is a [`Error::Traversal`].

use rustc_hash::FxHashSet;

use crate::model::{Document, Node, NodeId};
use crate::util::{Error, Result};

/// One visited node.
#[derive(Clone, Debug)]
pub struct Visit<'d> {
    pub id: NodeId,
    pub node: &'d Node,
    /// 0 at the walk root.
    pub depth: usize,
    /// Label path, `"0:1"` then the tags from the root down.
    pub entry: String,
    /// Position among the parent's children (0 for the root).
    pub index: usize,
    pub parent: Option<NodeId>,
}

/// What the walker does after a visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VisitFlow {
    #[default]
    Continue,
    /// Do not descend into this node's children.
    SkipChildren,
}

/// Callback invoked once per node, parent before children.
pub trait NodeVisitor {
    fn visit(&mut self, visit: &Visit<'_>) -> Result<VisitFlow>;
}

impl<F> NodeVisitor for F
where
    F: FnMut(&Visit<'_>) -> Result<VisitFlow>,
{
    fn visit(&mut self, visit: &Visit<'_>) -> Result<VisitFlow> {
        self(visit)
    }
}

/// Counters of a finished walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkResult {
    pub visited: usize,
    pub max_depth: usize,
}

enum Frame {
    Enter {
        id: NodeId,
        depth: usize,
        prefix: String,
        index: usize,
        parent: Option<NodeId>,
    },
    Exit(NodeId),
}

/// Walk the subtree under `root`.
///
/// Errors from the visitor abort the walk and are returned unchanged.
pub fn walk<D, V>(doc: &D, root: NodeId, visitor: &mut V) -> Result<WalkResult>
where
    D: Document + ?Sized,
    V: NodeVisitor + ?Sized,
{
    let mut result = WalkResult::default();
    let mut ancestors: FxHashSet<NodeId> = FxHashSet::default();
    let mut stack = vec![Frame::Enter {
        id: root,
        depth: 0,
        prefix: "0:1".to_string(),
        index: 0,
        parent: None,
    }];

    while let Some(frame) = stack.pop() {
        let (id, depth, prefix, index, parent) = match frame {
            Frame::Exit(id) => {
                ancestors.remove(&id);
                continue;
            }
            Frame::Enter { id, depth, prefix, index, parent } => (id, depth, prefix, index, parent),
        };

        let node = doc.node(id).ok_or_else(|| match parent {
            Some(p) => Error::Traversal(format!("child {index} of node {p} does not resolve ({id})")),
            None => Error::Traversal(format!("walk root {id} does not resolve")),
        })?;
        let entry = format!("{prefix}:{}", node.tag);
        if ancestors.contains(&id) {
            return Err(Error::Traversal(format!("node {id} at {entry} is its own ancestor")));
        }

        result.visited += 1;
        result.max_depth = result.max_depth.max(depth);

        let visit = Visit { id, node, depth, entry, index, parent };
        if visitor.visit(&visit)? == VisitFlow::SkipChildren {
            continue;
        }

        let children = doc.children_of(id);
        if children.is_empty() {
            continue;
        }
        ancestors.insert(id);
        stack.push(Frame::Exit(id));
        for (i, &child) in children.iter().enumerate().rev() {
            stack.push(Frame::Enter {
                id: child,
                depth: depth + 1,
                prefix: visit.entry.clone(),
                index: i,
                parent: Some(id),
            });
        }
    }

    tracing::trace!(visited = result.visited, max_depth = result.max_depth, "walk finished");
    Ok(result)
}
