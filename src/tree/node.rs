//! Arena nodes and pre-order traversal.
//!
//! Nodes live in a `Vec` owned by the tree and refer to each other by
//! [`NodeId`]. Parent links are plain ids used for walking upward; the
//! arena alone owns every node.

use std::fmt;

/// Index of a node in the tree's arena.
///
/// After [`PhylogenyTree::init`](super::PhylogenyTree::init) the id equals
/// the node's pre-order index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position in the arena.
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A leaf (carrying a track) or an internal node.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhylogenyTreeNode {
    /// Parent, `None` for the root.
    pub(crate) parent: Option<NodeId>,
    /// Ordered children; empty for leaves.
    pub(crate) children: Vec<NodeId>,
    /// Branch length to the parent.
    pub(crate) distance: f64,
    /// Support value of an internal node, `0` when absent.
    pub(crate) bootstrap: f64,
    /// Track of a leaf.
    pub(crate) track: Option<usize>,
    /// Edges between this node and the root.
    pub(crate) ancestors: usize,
    /// Summed branch length from the root.
    pub(crate) depth: f64,
    /// Pre-order index.
    pub(crate) index: usize,
}

impl PhylogenyTreeNode {
    /// Parent node, `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Branch length to the parent.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Bootstrap support (internal nodes).
    pub fn bootstrap(&self) -> f64 {
        self.bootstrap
    }

    /// Track id of a leaf.
    pub fn track(&self) -> Option<usize> {
        self.track
    }

    /// Number of edges to the root.
    pub fn ancestors(&self) -> usize {
        self.ancestors
    }

    /// Summed branch length from the root.
    pub fn depth(&self) -> f64 {
        self.depth
    }

    /// Pre-order index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns `true` for nodes without children.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Pre-order walk with an explicit stack.
///
/// Children are visited left to right; the stack holds at most one entry
/// per pending sibling, so deep caterpillar trees do not recurse.
pub(crate) struct PreOrder<'a> {
    nodes: &'a [PhylogenyTreeNode],
    stack: Vec<NodeId>,
}

impl<'a> PreOrder<'a> {
    pub(crate) fn new(nodes: &'a [PhylogenyTreeNode], start: NodeId) -> Self {
        Self {
            nodes,
            stack: vec![start],
        }
    }
}

impl Iterator for PreOrder<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack.extend(self.nodes[id.0].children.iter().rev().copied());
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(parent: Option<usize>, children: &[usize]) -> PhylogenyTreeNode {
        PhylogenyTreeNode {
            parent: parent.map(NodeId),
            children: children.iter().copied().map(NodeId).collect(),
            ..PhylogenyTreeNode::default()
        }
    }

    #[test]
    fn pre_order_visits_children_left_to_right() {
        // 0 -> (2, 1), 2 -> (3, 4)
        let nodes = vec![
            node(None, &[2, 1]),
            node(Some(0), &[]),
            node(Some(0), &[3, 4]),
            node(Some(2), &[]),
            node(Some(2), &[]),
        ];
        let order: Vec<_> = PreOrder::new(&nodes, NodeId(0)).map(NodeId::index).collect();
        assert_eq!(order, vec![0, 2, 3, 4, 1]);
        let subtree: Vec<_> = PreOrder::new(&nodes, NodeId(2)).map(NodeId::index).collect();
        assert_eq!(subtree, vec![2, 3, 4]);
    }

    #[test]
    fn leaves_have_no_children() {
        assert!(node(Some(0), &[]).is_leaf());
        assert!(!node(None, &[1]).is_leaf());
        assert_eq!(NodeId(7).to_string(), "#7");
    }
}
