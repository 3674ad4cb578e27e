//! Rooted phylogeny over track leaves.
//!
//! The tree is an arena of [`PhylogenyTreeNode`]s. Shape changes only
//! through [`PhylogenyTree::reroot`] and its wrappers; every change is
//! followed by [`PhylogenyTree::init`], which compacts the arena into
//! pre-order and recomputes depths, ancestor counts and the leaf list.

pub mod newick;
mod node;

use thiserror::Error;
use tracing::debug;

use crate::genomics::TrackError;

pub use node::{NodeId, PhylogenyTreeNode};
use node::PreOrder;

/// Errors raised while building a tree.
#[derive(Debug, Error)]
pub enum TreeError {
    /// A leaf label names no loaded track.
    #[error(transparent)]
    Track(#[from] TrackError),

    /// Newick text could not be parsed.
    #[error("newick syntax error at byte {position}: {reason}")]
    Syntax {
        /// Byte offset into the input.
        position: usize,
        /// What was expected.
        reason: String,
    },

    /// The input held no tree.
    #[error("tree is empty")]
    Empty,
}

/// Rooted tree whose leaves are tracks.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhylogenyTree {
    nodes: Vec<PhylogenyTreeNode>,
    root: Option<NodeId>,
    leaves: Vec<NodeId>,
    mult: f64,
}

impl Default for PhylogenyTree {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            leaves: Vec::new(),
            mult: 1.0,
        }
    }
}

impl PhylogenyTree {
    /// Empty tree with multiplier 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every node and reset the multiplier.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Returns `true` before a tree is loaded.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Root node.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Node by id.
    ///
    /// # Panics
    /// If `id` does not belong to this tree.
    pub fn node(&self, id: NodeId) -> &PhylogenyTreeNode {
        &self.nodes[id.0]
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Leaves in pre-order.
    pub fn leaves(&self) -> &[NodeId] {
        &self.leaves
    }

    /// Leaf at position `leaf` of the leaf list.
    pub fn leaf(&self, leaf: usize) -> Option<NodeId> {
        self.leaves.get(leaf).copied()
    }

    /// Leaf carrying `track`.
    pub fn leaf_for_track(&self, track: usize) -> Option<NodeId> {
        self.leaves
            .iter()
            .copied()
            .find(|&leaf| self.nodes[leaf.0].track == Some(track))
    }

    /// Track ids of the leaves in leaf order.
    pub fn leaf_ids(&self) -> Vec<usize> {
        self.leaves
            .iter()
            .filter_map(|&leaf| self.nodes[leaf.0].track)
            .collect()
    }

    /// Track ids of every leaf under `node`, in pre-order.
    pub fn clade_tracks(&self, node: NodeId) -> Vec<usize> {
        PreOrder::new(&self.nodes, node)
            .filter_map(|id| self.nodes[id.0].track)
            .collect()
    }

    /// Branch-length multiplier applied by the Newick writer.
    pub fn multiplier(&self) -> f64 {
        self.mult
    }

    /// Set the branch-length multiplier.
    pub fn set_multiplier(&mut self, mult: f64) {
        self.mult = mult;
    }

    /// Add a detached leaf.
    pub fn add_leaf(&mut self, track: usize, distance: f64) -> NodeId {
        self.push_node(PhylogenyTreeNode {
            distance,
            track: Some(track),
            ..PhylogenyTreeNode::default()
        })
    }

    /// Add an internal node adopting `children`.
    pub fn add_internal(&mut self, children: Vec<NodeId>, distance: f64, bootstrap: f64) -> NodeId {
        let id = NodeId(self.nodes.len());
        for &child in &children {
            self.nodes[child.0].parent = Some(id);
        }
        self.push_node(PhylogenyTreeNode {
            children,
            distance,
            bootstrap,
            ..PhylogenyTreeNode::default()
        })
    }

    fn push_node(&mut self, node: PhylogenyTreeNode) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Make `root` the root and run [`init`](Self::init).
    pub fn set_root(&mut self, root: NodeId) {
        self.nodes[root.0].parent = None;
        self.root = Some(root);
        self.init();
    }

    /// Compact the arena into pre-order from the root, dropping unreachable
    /// nodes, then recompute indices, ancestor counts, depths and leaves.
    pub fn init(&mut self) {
        let Some(root) = self.root else {
            self.nodes.clear();
            self.leaves.clear();
            return;
        };

        let order: Vec<NodeId> = PreOrder::new(&self.nodes, root).collect();
        let mut new_id = vec![usize::MAX; self.nodes.len()];
        for (index, id) in order.iter().enumerate() {
            new_id[id.0] = index;
        }

        let mut old = std::mem::take(&mut self.nodes);
        let mut nodes = Vec::with_capacity(order.len());
        for id in &order {
            let mut node = std::mem::take(&mut old[id.0]);
            node.parent = node.parent.map(|parent| NodeId(new_id[parent.0]));
            for child in &mut node.children {
                *child = NodeId(new_id[child.0]);
            }
            nodes.push(node);
        }
        self.nodes = nodes;
        self.root = Some(NodeId(0));
        self.nodes[0].parent = None;

        self.leaves.clear();
        for index in 0..self.nodes.len() {
            let (ancestors, depth) = match self.nodes[index].parent {
                None => (0, 0.0),
                Some(parent) => {
                    let parent = &self.nodes[parent.0];
                    (parent.ancestors + 1, parent.depth + self.nodes[index].distance)
                }
            };
            let node = &mut self.nodes[index];
            node.index = index;
            node.ancestors = ancestors;
            node.depth = depth;
            if node.is_leaf() {
                self.leaves.push(NodeId(index));
            }
        }
    }

    /// Apply a track remap (`table[old] = new`) to every leaf.
    pub fn set_track_indices(&mut self, table: &[usize]) {
        for &leaf in &self.leaves {
            let node = &mut self.nodes[leaf.0];
            if let Some(&new) = node.track.and_then(|old| table.get(old)) {
                node.track = Some(new);
            }
        }
    }

    /// Lowest common ancestor of the leaves carrying two tracks.
    ///
    /// # Panics
    /// If either track is not a leaf of the tree; callers must only query
    /// tracks the tree was built over.
    pub fn lca(&self, track1: usize, track2: usize) -> NodeId {
        let find = |track: usize| {
            self.leaf_for_track(track)
                .unwrap_or_else(|| panic!("track {track} is not a leaf of the tree"))
        };
        let mut node1 = find(track1);
        let mut node2 = find(track2);

        while self.nodes[node1.0].ancestors > self.nodes[node2.0].ancestors {
            node1 = self.parent_of(node1);
        }
        while self.nodes[node2.0].ancestors > self.nodes[node1.0].ancestors {
            node2 = self.parent_of(node2);
        }
        while node1 != node2 {
            node1 = self.parent_of(node1);
            node2 = self.parent_of(node2);
        }
        node1
    }

    fn parent_of(&self, node: NodeId) -> NodeId {
        self.nodes[node.0]
            .parent
            .unwrap_or_else(|| panic!("node {node} has no parent; tree is disconnected"))
    }

    /// Summed branch length on the path between leaves `leaf1` and `leaf2`
    /// (positions in the leaf list).
    pub fn leaf_distance(&self, leaf1: usize, leaf2: usize) -> f64 {
        let mut node1 = self.leaves[leaf1];
        let mut node2 = self.leaves[leaf2];
        let mut distance = 0.0;

        while node1 != node2 {
            let (first, second) = (&self.nodes[node1.0], &self.nodes[node2.0]);
            if first.ancestors >= second.ancestors {
                distance += first.distance;
                node1 = self.parent_of(node1);
            }
            if second.ancestors >= first.ancestors {
                distance += second.distance;
                node2 = self.parent_of(node2);
            }
        }
        distance
    }

    /// Reroot at the midpoint of the longest leaf-to-leaf path.
    pub fn midpoint_reroot(&mut self) {
        let count = self.leaves.len();
        let mut max = 0.0;
        let mut pair = None;
        for leaf1 in 1..count {
            for leaf2 in 0..leaf1 {
                let distance = self.leaf_distance(leaf1, leaf2);
                if distance > max {
                    max = distance;
                    pair = Some((leaf1, leaf2));
                }
            }
        }
        let Some((leaf1, leaf2)) = pair else {
            return;
        };

        let middle = max / 2.0;
        let (first, second) = (self.leaves[leaf1], self.leaves[leaf2]);
        let mut node = if self.nodes[first.0].depth > self.nodes[second.0].depth {
            first
        } else {
            second
        };

        let mut walked = 0.0;
        while let Some(parent) = self.nodes[node.0].parent {
            let distance = self.nodes[node.0].distance;
            if walked + distance >= middle {
                break;
            }
            walked += distance;
            node = parent;
        }

        debug!(longest = max, node = node.0, offset = middle - walked, "midpoint reroot");
        if Some(node) != self.root {
            self.reroot(node, middle - walked, false);
        }
    }

    /// Reroot so that `node`'s clade becomes a child of the root, halfway
    /// along its branch (or halfway between the two root branches when
    /// its parent already is the root).
    pub fn set_outgroup(&mut self, node: NodeId) {
        let Some(parent) = self.nodes[node.0].parent else {
            return;
        };
        let distance = match self.nodes[parent.0].children.as_slice() {
            [left, right] if Some(parent) == self.root => {
                (self.nodes[left.0].distance + self.nodes[right.0].distance) / 2.0
            }
            _ => self.nodes[node.0].distance / 2.0,
        };
        self.reroot(node, distance, true);
    }

    /// Move the root onto the branch above `node`, `distance` away from it.
    ///
    /// When `node` is a child of a binary root, the two root branches are
    /// redistributed (and with `reorder` the siblings swapped so that
    /// `node` comes first). Otherwise the branch is bisected: a new root
    /// adopts `node` and its former parent, the path up to the old root is
    /// reversed, and the old root is spliced out if left with one child.
    pub fn reroot(&mut self, node: NodeId, distance: f64, reorder: bool) {
        let Some(parent) = self.nodes[node.0].parent else {
            return;
        };

        if Some(parent) == self.root && self.nodes[parent.0].children.len() == 2 {
            let position = self.child_position(parent, node);
            let sibling = self.nodes[parent.0].children[1 - position];
            let total = self.nodes[node.0].distance + self.nodes[sibling.0].distance;
            self.nodes[sibling.0].distance = total - distance;
            self.nodes[node.0].distance = distance;
            if reorder && position == 1 {
                self.nodes[parent.0].children.swap(0, 1);
            }
        } else {
            self.bisect(node, parent, distance);
        }
        self.init();
    }

    fn child_position(&self, parent: NodeId, child: NodeId) -> usize {
        self.nodes[parent.0]
            .children
            .iter()
            .position(|&id| id == child)
            .unwrap_or_else(|| panic!("node {child} is not a child of {parent}"))
    }

    fn detach(&mut self, parent: NodeId, child: NodeId) {
        let position = self.child_position(parent, child);
        self.nodes[parent.0].children.remove(position);
    }

    fn bisect(&mut self, node: NodeId, parent: NodeId, distance: f64) {
        let upper = self.nodes[node.0].distance - distance;
        let root = self.push_node(PhylogenyTreeNode {
            children: vec![node, parent],
            ..PhylogenyTreeNode::default()
        });

        self.detach(parent, node);
        self.nodes[node.0].parent = Some(root);
        self.nodes[node.0].distance = distance;

        // Walk from the old parent to the old root, turning each parent
        // link into a child link and shifting branch lengths down by one.
        let mut current = parent;
        let mut new_parent = root;
        let mut carried = upper;
        loop {
            let old_parent = self.nodes[current.0].parent;
            let old_distance = self.nodes[current.0].distance;
            self.nodes[current.0].parent = Some(new_parent);
            self.nodes[current.0].distance = carried;
            let Some(old_parent) = old_parent else {
                break;
            };
            self.detach(old_parent, current);
            self.nodes[current.0].children.push(old_parent);
            new_parent = current;
            carried = old_distance;
            current = old_parent;
        }

        // `current` is the old root, now hanging below the path.
        let old_root = current;
        if let Some(above) = self.nodes[old_root.0].parent {
            let remaining = self.nodes[old_root.0].children.clone();
            match remaining.as_slice() {
                [] => self.detach(above, old_root),
                &[only] => {
                    let position = self.child_position(above, old_root);
                    self.nodes[above.0].children[position] = only;
                    self.nodes[only.0].parent = Some(above);
                    self.nodes[only.0].distance += self.nodes[old_root.0].distance;
                }
                _ => {}
            }
        }
        self.root = Some(root);
    }
}
