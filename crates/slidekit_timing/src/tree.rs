// SPDX-License-Identifier: MIT OR Apache-2.0
//! Arena owning every timing node of a slide.

use crate::node::{EffectNodeType, NodeId, NodeKind, TimingNode};
use indexmap::IndexMap;
use std::sync::mpsc::{self, Receiver, Sender};

/// Notification sent after any mutation of the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeChanged;

/// The timing tree of one slide
#[derive(Debug)]
pub struct TimingTree {
    /// All nodes, attached or detached
    nodes: IndexMap<NodeId, TimingNode>,
    /// Slide timing root
    root: NodeId,
    /// The single change listener
    listener: Option<Sender<TreeChanged>>,
}

impl TimingTree {
    /// Create a tree holding only an empty timing root
    pub fn new() -> Self {
        let mut root = TimingNode::new(NodeKind::Par);
        root.user_data.node_type = Some(EffectNodeType::TimingRoot);
        let id = root.id;
        let mut nodes = IndexMap::new();
        nodes.insert(id, root);
        Self {
            nodes,
            root: id,
            listener: None,
        }
    }

    /// The slide timing root
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Get a node
    pub fn node(&self, id: NodeId) -> Option<&TimingNode> {
        self.nodes.get(&id)
    }

    /// Get a mutable node; counts as a change
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut TimingNode> {
        if self.nodes.contains_key(&id) {
            self.notify();
        }
        self.nodes.get_mut(&id)
    }

    /// Get a node or fail
    pub fn get(&self, id: NodeId) -> Result<&TimingNode, TreeError> {
        self.nodes.get(&id).ok_or(TreeError::NodeNotFound(id))
    }

    /// Get a mutable node or fail; counts as a change
    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut TimingNode, TreeError> {
        self.node_mut(id).ok_or(TreeError::NodeNotFound(id))
    }

    /// Whether the node exists
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of nodes, attached or not
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add a detached node and return its ID
    pub fn insert(&mut self, mut node: TimingNode) -> NodeId {
        node.parent = None;
        node.children.clear();
        let id = node.id;
        self.nodes.insert(id, node);
        self.notify();
        id
    }

    /// Create a detached node of the given kind
    pub fn create(&mut self, kind: NodeKind) -> NodeId {
        self.insert(TimingNode::new(kind))
    }

    /// Children of a node (empty if the node does not exist)
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Parent of a node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Whether `ancestor` is `id` or one of its ancestors
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Whether the node can be reached from the root
    pub fn is_reachable(&self, id: NodeId) -> bool {
        self.contains(id) && self.is_ancestor(self.root, id)
    }

    /// Append `child` as last child of `parent`, detaching it first
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.check_link(parent, child)?;
        self.detach(child);
        self.link(parent, child, None);
        Ok(())
    }

    /// Insert `child` right after `after` in `parent`
    pub fn insert_after(&mut self, parent: NodeId, child: NodeId, after: NodeId) -> Result<(), TreeError> {
        self.check_link(parent, child)?;
        if self.parent(after) != Some(parent) {
            return Err(TreeError::NotAChild { parent, child: after });
        }
        self.detach(child);
        let position = self
            .children(parent)
            .iter()
            .position(|c| *c == after)
            .map(|p| p + 1);
        self.link(parent, child, position);
        Ok(())
    }

    /// Remove `child` from `parent`; the child stays in the arena
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        if !self.contains(parent) {
            return Err(TreeError::NodeNotFound(parent));
        }
        if self.parent(child) != Some(parent) {
            return Err(TreeError::NotAChild { parent, child });
        }
        self.detach(child);
        Ok(())
    }

    /// Detach a node from its parent, if any
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.retain(|c| *c != id);
        }
        if let Some(n) = self.nodes.get_mut(&id) {
            n.parent = None;
        }
        self.notify();
    }

    /// Put `new` where `old` is in its parent and detach `old`
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<(), TreeError> {
        let Some(parent) = self.parent(old) else {
            return Ok(());
        };
        self.check_link(parent, new)?;
        self.detach(new);
        let position = self.children(parent).iter().position(|c| *c == old);
        self.detach(old);
        self.link(parent, new, position);
        Ok(())
    }

    /// Deep copy a subtree; the copy is detached and gets fresh IDs
    pub fn deep_clone(&mut self, id: NodeId) -> Result<NodeId, TreeError> {
        let source = self.get(id)?.clone();
        let mut copy = source.clone();
        copy.id = NodeId::new();
        let new_id = self.insert(copy);
        for child in source.children {
            let child_copy = self.deep_clone(child)?;
            self.link(new_id, child_copy, None);
        }
        Ok(new_id)
    }

    /// Detach and drop a subtree, returning how many nodes were dropped
    pub fn free(&mut self, id: NodeId) -> usize {
        if id == self.root || !self.contains(id) {
            return 0;
        }
        self.detach(id);
        let mut stack = vec![id];
        let mut count = 0;
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.swap_remove(&current) {
                stack.extend(node.children);
                count += 1;
            }
        }
        self.notify();
        count
    }

    /// The subtree rooted at `id` in depth-first pre-order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            order.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        order
    }

    /// Register the change listener, replacing any previous one
    pub fn subscribe_changes(&mut self) -> Receiver<TreeChanged> {
        let (tx, rx) = mpsc::channel();
        self.listener = Some(tx);
        rx
    }

    /// Drop the change listener
    pub fn unsubscribe_changes(&mut self) {
        self.listener = None;
    }

    fn notify(&self) {
        if let Some(tx) = &self.listener {
            // A dropped receiver just means nobody listens anymore
            let _ = tx.send(TreeChanged);
        }
    }

    fn check_link(&self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        let parent_node = self.get(parent)?;
        if !parent_node.is_container() {
            return Err(TreeError::NotAContainer(parent));
        }
        self.get(child)?;
        if child == self.root || self.is_ancestor(child, parent) {
            return Err(TreeError::Cycle { parent, child });
        }
        Ok(())
    }

    fn link(&mut self, parent: NodeId, child: NodeId, position: Option<usize>) {
        if let Some(p) = self.nodes.get_mut(&parent) {
            match position {
                Some(index) if index <= p.children.len() => p.children.insert(index, child),
                _ => p.children.push(child),
            }
        }
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
        self.notify();
    }
}

impl Default for TimingTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised by structural tree operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// Node not found
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// Node cannot have children
    #[error("Node is not a time container: {0:?}")]
    NotAContainer(NodeId),

    /// Node is not a child of the given parent
    #[error("Node {child:?} is not a child of {parent:?}")]
    NotAChild {
        /// Expected parent
        parent: NodeId,
        /// Offending node
        child: NodeId,
    },

    /// Linking would create a cycle
    #[error("Linking {child:?} under {parent:?} would create a cycle")]
    Cycle {
        /// Requested parent
        parent: NodeId,
        /// Requested child
        child: NodeId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{AnimateKind, AnimateProps, TimeValue};

    fn animate(tree: &mut TimingTree) -> NodeId {
        tree.create(NodeKind::Animate(AnimateProps::new(AnimateKind::Set, "Visibility")))
    }

    #[test]
    fn test_append_and_insert_after() {
        let mut tree = TimingTree::new();
        let par = tree.create(NodeKind::Par);
        tree.append_child(tree.root(), par).unwrap();

        let a = animate(&mut tree);
        let b = animate(&mut tree);
        let c = animate(&mut tree);
        tree.append_child(par, a).unwrap();
        tree.append_child(par, c).unwrap();
        tree.insert_after(par, b, a).unwrap();

        assert_eq!(tree.children(par), &[a, b, c]);
        assert_eq!(tree.parent(b), Some(par));
        assert!(tree.is_reachable(b));
    }

    #[test]
    fn test_leaf_cannot_have_children() {
        let mut tree = TimingTree::new();
        let a = animate(&mut tree);
        let b = animate(&mut tree);
        assert_eq!(tree.append_child(a, b), Err(TreeError::NotAContainer(a)));
    }

    #[test]
    fn test_cycle_rejected() {
        let mut tree = TimingTree::new();
        let outer = tree.create(NodeKind::Par);
        let inner = tree.create(NodeKind::Par);
        tree.append_child(outer, inner).unwrap();
        assert!(matches!(tree.append_child(inner, outer), Err(TreeError::Cycle { .. })));
    }

    #[test]
    fn test_append_moves_between_parents() {
        let mut tree = TimingTree::new();
        let first = tree.create(NodeKind::Par);
        let second = tree.create(NodeKind::Par);
        let leaf = animate(&mut tree);
        tree.append_child(first, leaf).unwrap();
        tree.append_child(second, leaf).unwrap();
        assert!(tree.children(first).is_empty());
        assert_eq!(tree.children(second), &[leaf]);
    }

    #[test]
    fn test_deep_clone_and_free() {
        let mut tree = TimingTree::new();
        let par = tree.create(NodeKind::Par);
        let leaf = animate(&mut tree);
        tree.append_child(par, leaf).unwrap();
        tree.node_mut(leaf).unwrap().timing.begin = Some(TimeValue::Seconds(0.5));

        let copy = tree.deep_clone(par).unwrap();
        assert_ne!(copy, par);
        let copied_leaf = tree.children(copy)[0];
        assert_ne!(copied_leaf, leaf);
        assert_eq!(tree.node(copied_leaf).unwrap().begin_seconds(), Some(0.5));

        let before = tree.node_count();
        assert_eq!(tree.free(copy), 2);
        assert_eq!(tree.node_count(), before - 2);
        assert!(tree.contains(leaf));
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut tree = TimingTree::new();
        let par = tree.create(NodeKind::Par);
        let a = animate(&mut tree);
        let b = animate(&mut tree);
        let c = animate(&mut tree);
        tree.append_child(par, a).unwrap();
        tree.append_child(par, b).unwrap();
        tree.replace(a, c).unwrap();
        assert_eq!(tree.children(par), &[c, b]);
        assert_eq!(tree.parent(a), None);
    }

    #[test]
    fn test_change_notification() {
        let mut tree = TimingTree::new();
        let rx = tree.subscribe_changes();
        assert!(rx.try_recv().is_err());

        let par = tree.create(NodeKind::Par);
        tree.append_child(tree.root(), par).unwrap();
        assert!(rx.try_iter().count() >= 2);

        tree.unsubscribe_changes();
        tree.detach(par);
        assert!(rx.try_recv().is_err());
    }
}
