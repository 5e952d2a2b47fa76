//! Rooted, time-measured phylogenetic trees with typed samples.
//!
//! Node positions are given as heights: the age of a node before the most
//! recent sample. A sampled ancestor is represented the usual way, as a leaf
//! whose height equals its parent's height.

use thiserror::Error;

/// Identifier of a node within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Returns the position of the node in its tree's node table.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Read-only access to a rooted binary tree.
pub trait PhyloTree {
    /// The root node.
    fn root(&self) -> NodeId;

    /// Total number of nodes, including sampled ancestors.
    fn node_count(&self) -> usize;

    /// Children of a node; empty for leaves, two entries otherwise.
    fn children(&self, node: NodeId) -> &[NodeId];

    /// Parent of a node, `None` for the root.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Age of the node before the most recent sample.
    fn height(&self, node: NodeId) -> f64;

    /// Type (deme) of a sampled node, if known.
    fn type_index(&self, node: NodeId) -> Option<usize>;

    /// Returns whether the node is a leaf.
    fn is_leaf(&self, node: NodeId) -> bool {
        self.children(node).is_empty()
    }

    /// Returns whether the node is a sampled ancestor: a leaf sitting at the
    /// same height as its parent.
    fn is_direct_ancestor(&self, node: NodeId) -> bool {
        self.is_leaf(node)
            && self
                .parent(node)
                .is_some_and(|parent| self.height(parent) == self.height(node))
    }

    /// Number of leaves, including sampled ancestors.
    fn leaf_count(&self) -> usize;

    /// Number of sampled ancestors.
    fn direct_ancestor_count(&self) -> usize;
}

/// Errors that can occur when building a [`Tree`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TreeError {
    #[error("node {0} does not exist")]
    UnknownNode(usize),

    #[error("node {0} already has a parent")]
    AlreadyAttached(usize),

    #[error("node {node} has height {height}, which must be finite and non-negative")]
    Height { node: usize, height: f64 },

    #[error("child {child} is older than its parent {parent}")]
    ChildOlderThanParent { parent: usize, child: usize },

    #[error("node {0} is not reachable from the root")]
    Detached(usize),

    #[error("the root must not have a parent")]
    RootHasParent,

    #[error("node {node} at height {height} is older than the process origin")]
    BeyondOrigin { node: usize, height: f64 },

    #[error("internal node {node} has {children} children instead of two")]
    NotBinary { node: usize, children: usize },

    #[error("sampled node {0} has no type label")]
    MissingType(usize),

    #[error("node {node} has type {type_index}, but there are only {type_count} types")]
    TypeOutOfRange {
        node: usize,
        type_index: usize,
        type_count: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    height: f64,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    type_index: Option<usize>,
}

/// An arena-backed binary tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    leaf_count: usize,
    direct_ancestor_count: usize,
}

/// Incremental builder for a [`Tree`].
///
/// Leaves are added first; internal nodes join two existing subtrees.
#[derive(Debug, Default, Clone)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sampled node.
    ///
    /// # Errors
    ///
    /// Returns an error if the height is negative or not finite.
    pub fn leaf(&mut self, height: f64, type_index: Option<usize>) -> Result<NodeId, TreeError> {
        self.push(height, Vec::new(), type_index)
    }

    /// Adds a branching node joining two existing subtrees.
    ///
    /// # Errors
    ///
    /// Returns an error if the height is invalid, if a child does not exist
    /// or is already attached, or if a child is older than the new node.
    pub fn internal(&mut self, height: f64, left: NodeId, right: NodeId) -> Result<NodeId, TreeError> {
        for child in [left, right] {
            let node = self
                .nodes
                .get(child.0)
                .ok_or(TreeError::UnknownNode(child.0))?;
            if node.parent.is_some() || left == right {
                return Err(TreeError::AlreadyAttached(child.0));
            }
            if node.height > height {
                return Err(TreeError::ChildOlderThanParent {
                    parent: self.nodes.len(),
                    child: child.0,
                });
            }
        }

        let id = self.push(height, vec![left, right], None)?;
        self.nodes[left.0].parent = Some(id);
        self.nodes[right.0].parent = Some(id);
        Ok(id)
    }

    /// Finishes the tree rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is unknown, has a parent, or if any node
    /// added to the builder is not part of the tree.
    pub fn build(self, root: NodeId) -> Result<Tree, TreeError> {
        let root_node = self
            .nodes
            .get(root.0)
            .ok_or(TreeError::UnknownNode(root.0))?;
        if root_node.parent.is_some() {
            return Err(TreeError::RootHasParent);
        }

        // Every node other than the root must be attached.
        if let Some(index) = (0..self.nodes.len())
            .find(|&i| i != root.0 && self.nodes[i].parent.is_none())
        {
            return Err(TreeError::Detached(index));
        }

        let mut tree = Tree {
            nodes: self.nodes,
            root,
            leaf_count: 0,
            direct_ancestor_count: 0,
        };
        let ids: Vec<NodeId> = (0..tree.nodes.len()).map(NodeId).collect();
        tree.leaf_count = ids.iter().filter(|&&id| tree.is_leaf(id)).count();
        tree.direct_ancestor_count = ids.iter().filter(|&&id| tree.is_direct_ancestor(id)).count();

        Ok(tree)
    }

    fn push(
        &mut self,
        height: f64,
        children: Vec<NodeId>,
        type_index: Option<usize>,
    ) -> Result<NodeId, TreeError> {
        if !height.is_finite() || height < 0.0 {
            return Err(TreeError::Height {
                node: self.nodes.len(),
                height,
            });
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            height,
            parent: None,
            children,
            type_index,
        });
        Ok(id)
    }
}

impl Tree {
    /// Returns an iterator over all node identifiers.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }
}

/// Checks that every sampled node of `tree` carries a valid type label and
/// every internal node is binary.
///
/// Single-type trees may leave their samples unlabelled.
///
/// # Errors
///
/// Returns an error for a missing label on a multi-type tree, a label
/// outside `0..type_count`, or a non-binary internal node.
pub fn validate_types<T: PhyloTree + ?Sized>(tree: &T, type_count: usize) -> Result<(), TreeError> {
    for index in 0..tree.node_count() {
        let node = NodeId(index);
        let children = tree.children(node).len();
        if children > 0 {
            if children != 2 {
                return Err(TreeError::NotBinary { node: index, children });
            }
            continue;
        }

        match tree.type_index(node) {
            None if type_count > 1 => return Err(TreeError::MissingType(index)),
            Some(type_index) if type_index >= type_count => {
                return Err(TreeError::TypeOutOfRange {
                    node: index,
                    type_index,
                    type_count,
                });
            }
            _ => {}
        }
    }

    Ok(())
}

/// Returns the type of a sampled node, defaulting to type zero when unlabelled.
pub fn sample_type<T: PhyloTree + ?Sized>(tree: &T, node: NodeId) -> usize {
    tree.type_index(node).unwrap_or(0)
}

impl PhyloTree for Tree {
    fn root(&self) -> NodeId {
        self.root
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    fn height(&self, node: NodeId) -> f64 {
        self.nodes[node.0].height
    }

    fn type_index(&self, node: NodeId) -> Option<usize> {
        self.nodes[node.0].type_index
    }

    fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    fn direct_ancestor_count(&self) -> usize {
        self.direct_ancestor_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ((a:1, b:1):1, c:2) with a sampled ancestor d on the root.
    fn sample_tree() -> (Tree, [NodeId; 6]) {
        let mut builder = TreeBuilder::new();
        let a = builder.leaf(0.0, Some(0)).unwrap();
        let b = builder.leaf(0.5, Some(1)).unwrap();
        let ab = builder.internal(1.0, a, b).unwrap();
        let d = builder.leaf(1.0, Some(1)).unwrap();
        let abd = builder.internal(1.0, ab, d).unwrap();
        let c = builder.leaf(0.0, Some(0)).unwrap();
        let root = builder.internal(2.0, abd, c).unwrap();
        let tree = builder.build(root).unwrap();
        (tree, [a, b, ab, d, abd, root])
    }

    #[test]
    fn counts_leaves_and_direct_ancestors() {
        let (tree, [a, _, ab, d, abd, root]) = sample_tree();

        assert_eq!(tree.node_count(), 7);
        assert_eq!(tree.leaf_count(), 4);
        assert_eq!(tree.direct_ancestor_count(), 1);
        assert!(tree.is_direct_ancestor(d));
        assert!(!tree.is_direct_ancestor(a));
        assert!(!tree.is_direct_ancestor(ab));
        assert_eq!(tree.root(), root);
        assert_eq!(tree.parent(d), Some(abd));
        assert_eq!(tree.children(abd), &[ab, d]);
    }

    #[test]
    fn rejects_child_older_than_parent() {
        let mut builder = TreeBuilder::new();
        let a = builder.leaf(2.0, None).unwrap();
        let b = builder.leaf(0.0, None).unwrap();

        assert!(matches!(
            builder.internal(1.0, a, b),
            Err(TreeError::ChildOlderThanParent { child: 0, .. })
        ));
    }

    #[test]
    fn rejects_reattaching_a_node() {
        let mut builder = TreeBuilder::new();
        let a = builder.leaf(0.0, None).unwrap();
        let b = builder.leaf(0.0, None).unwrap();
        let c = builder.leaf(0.0, None).unwrap();
        builder.internal(1.0, a, b).unwrap();

        assert_eq!(builder.internal(2.0, a, c), Err(TreeError::AlreadyAttached(0)));
        assert_eq!(builder.internal(2.0, c, c), Err(TreeError::AlreadyAttached(2)));
    }

    #[test]
    fn rejects_detached_nodes() {
        let mut builder = TreeBuilder::new();
        let a = builder.leaf(0.0, None).unwrap();
        let b = builder.leaf(0.0, None).unwrap();
        let root = builder.internal(1.0, a, b).unwrap();
        builder.leaf(0.0, None).unwrap();

        assert_eq!(builder.build(root), Err(TreeError::Detached(3)));
    }

    #[test]
    fn validates_type_labels() {
        let (tree, _) = sample_tree();

        assert_eq!(validate_types(&tree, 2), Ok(()));
        assert_eq!(
            validate_types(&tree, 1),
            Err(TreeError::TypeOutOfRange {
                node: 1,
                type_index: 1,
                type_count: 1,
            })
        );

        let mut builder = TreeBuilder::new();
        let a = builder.leaf(0.0, None).unwrap();
        let b = builder.leaf(0.0, None).unwrap();
        let root = builder.internal(1.0, a, b).unwrap();
        let unlabelled = builder.build(root).unwrap();

        assert_eq!(validate_types(&unlabelled, 1), Ok(()));
        assert_eq!(validate_types(&unlabelled, 3), Err(TreeError::MissingType(0)));
        assert_eq!(sample_type(&unlabelled, a), 0);
    }

    #[test]
    fn rejects_invalid_heights() {
        let mut builder = TreeBuilder::new();

        assert!(matches!(
            builder.leaf(-1.0, None),
            Err(TreeError::Height { node: 0, .. })
        ));
        assert!(matches!(
            builder.leaf(f64::NAN, None),
            Err(TreeError::Height { .. })
        ));
    }
}
