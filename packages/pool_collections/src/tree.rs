use std::cmp::Ordering;
use std::marker::PhantomData;
use std::ops::ControlFlow;

use bytemuck::Pod;
use memory_pool::{Allocation, MemoryPool, SourceTag};

use crate::element;

/// Identifies a node of a [`PoolTree`].
///
/// An ID stays valid until its node is removed. After that the ID may be reused for a node
/// inserted later, so do not hold on to IDs of removed nodes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct NodeId(usize);

#[derive(Debug)]
struct Node<K> {
    key: K,
    parent: Option<usize>,
    left: Option<usize>,
    right: Option<usize>,

    /// Holds one `V`.
    value: Allocation,
}

/// Which child slot of its parent a node occupies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Side {
    Left,
    Right,
}

/// An unbalanced binary search tree with unique keys and values stored in pool memory.
///
/// Each node's value occupies one pool allocation. The tree structure itself is kept in an
/// index arena owned by the tree. Insertion order determines the shape of the tree; no
/// rebalancing takes place.
///
/// Pass the pool the tree was created with to every operation that touches values and release
/// the values with [`free()`](Self::free) before dropping the tree.
///
/// # Examples
///
/// ```
/// use std::ops::ControlFlow;
///
/// use memory_pool::{MemoryPool, source_tag};
/// use pool_collections::PoolTree;
///
/// let mut pool = MemoryPool::new();
/// let mut tree = PoolTree::<i32, u64>::new();
///
/// for key in [2, 4, 1, 3] {
///     tree.insert(&mut pool, key, u64::try_from(key * 10).unwrap(), source_tag!());
/// }
///
/// let mut keys = Vec::new();
/// let _ = tree.for_each(&pool, |_, key, _| {
///     keys.push(*key);
///     ControlFlow::Continue(())
/// });
/// assert_eq!(keys, vec![1, 2, 3, 4]);
///
/// let three = tree.find(&3).unwrap();
/// assert_eq!(*tree.value(&pool, three), 30);
///
/// tree.free(&mut pool);
/// pool.destroy().unwrap();
/// ```
#[derive(Debug)]
pub struct PoolTree<K, V> {
    nodes: Vec<Option<Node<K>>>,
    vacant: Vec<usize>,
    root: Option<usize>,
    len: usize,

    _value: PhantomData<V>,
}

impl<K: Ord + Copy, V: Pod> PoolTree<K, V> {
    /// Creates an empty tree.
    ///
    /// # Panics
    ///
    /// Panics if `V` needs an alignment above [`DATA_ALIGN`](memory_pool::DATA_ALIGN).
    #[must_use]
    pub fn new() -> Self {
        element::assert_storable::<V>();

        Self {
            nodes: Vec::new(),
            vacant: Vec::new(),
            root: None,
            len: 0,
            _value: PhantomData,
        }
    }

    /// The number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The root node, if any.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.root.map(NodeId)
    }

    /// Inserts `key` with `value` as a new leaf.
    ///
    /// Returns `None` without changing anything if the key is already present.
    pub fn insert(
        &mut self,
        pool: &mut MemoryPool,
        key: K,
        value: V,
        tag: SourceTag,
    ) -> Option<NodeId> {
        let Some(root) = self.root else {
            let id = self.alloc_node(pool, key, value, None, tag);
            self.root = Some(id);
            return Some(NodeId(id));
        };

        let (parent, side) = self.leaf_slot(root, &key)?;

        let id = self.alloc_node(pool, key, value, Some(parent), tag);
        self.set_child(parent, side, Some(id));

        Some(NodeId(id))
    }

    /// Overwrites the value of an existing key.
    ///
    /// Returns `None` if the key is not present.
    pub fn set(&mut self, pool: &mut MemoryPool, key: &K, value: V) -> Option<NodeId> {
        let node = self.find(key)?;
        *self.value_mut(pool, node) = value;
        Some(node)
    }

    /// Overwrites the value of `key`, inserting it first if it is not present.
    pub fn set_or_insert(
        &mut self,
        pool: &mut MemoryPool,
        key: K,
        value: V,
        tag: SourceTag,
    ) -> NodeId {
        match self.set(pool, &key, value) {
            Some(node) => node,
            None => self
                .insert(pool, key, value, tag)
                .expect("the key was just found to be absent"),
        }
    }

    /// Finds the node holding `key`.
    #[must_use]
    pub fn find(&self, key: &K) -> Option<NodeId> {
        let mut cursor = self.root;

        while let Some(id) = cursor {
            let node = self.node(id);
            cursor = match key.cmp(&node.key) {
                Ordering::Equal => return Some(NodeId(id)),
                Ordering::Less => node.left,
                Ordering::Greater => node.right,
            };
        }

        None
    }

    /// Removes a single node, keeping its descendants in the tree.
    ///
    /// A node with one child is replaced by that child. For a node with two children, both
    /// subtrees are detached, the node is removed and then the left subtree followed by the
    /// right subtree are re-attached by walking down from the root. The left subtree becomes
    /// the root if the removed node was the root. This keeps the search order intact but may
    /// make the tree deeper.
    pub fn remove(&mut self, pool: &mut MemoryPool, node: NodeId) {
        let id = node.0;
        let current = self.node(id);

        match (current.left, current.right) {
            (None, None) => self.remove_leaf(pool, id),
            (Some(child), None) | (None, Some(child)) => {
                let parent = current.parent;

                self.replace_in_parent(id, Some(child));
                self.node_mut(child).parent = parent;

                // The node is already unlinked, so it must not go through remove_leaf().
                let removed = self.take_node(id);
                pool.free(removed.value);
            }
            (Some(left), Some(right)) => {
                self.node_mut(left).parent = None;
                self.node_mut(right).parent = None;

                let current = self.node_mut(id);
                current.left = None;
                current.right = None;

                self.remove_leaf(pool, id);

                match self.root {
                    Some(root) => {
                        self.splice(root, left);
                        self.splice(root, right);
                    }
                    None => {
                        self.root = Some(left);
                        self.splice(left, right);
                    }
                }
            }
        }
    }

    /// Removes a node together with all of its descendants.
    pub fn remove_subtree(&mut self, pool: &mut MemoryPool, node: NodeId) {
        let id = node.0;
        self.replace_in_parent(id, None);

        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let removed = self.take_node(id);
            pending.extend(removed.left);
            pending.extend(removed.right);
            pool.free(removed.value);
        }
    }

    /// Removes the node holding `key`, keeping its descendants. Returns whether the key was
    /// present.
    pub fn find_remove(&mut self, pool: &mut MemoryPool, key: &K) -> bool {
        let Some(node) = self.find(key) else {
            return false;
        };

        self.remove(pool, node);
        true
    }

    /// Removes the node holding `key` together with its descendants. Returns whether the key
    /// was present.
    pub fn find_remove_subtree(&mut self, pool: &mut MemoryPool, key: &K) -> bool {
        let Some(node) = self.find(key) else {
            return false;
        };

        self.remove_subtree(pool, node);
        true
    }

    /// Removes every node, returning all values to the pool. The tree remains usable.
    pub fn clear(&mut self, pool: &mut MemoryPool) {
        if let Some(root) = self.root {
            self.remove_subtree(pool, NodeId(root));
        }

        debug_assert_eq!(self.len, 0);
        self.nodes.clear();
        self.vacant.clear();
    }

    /// Removes every node and returns all values to the pool.
    pub fn free(mut self, pool: &mut MemoryPool) {
        self.clear(pool);
    }

    /// The node with the smallest key.
    #[must_use]
    pub fn first(&self) -> Option<NodeId> {
        self.root.map(|root| NodeId(self.leftmost(root)))
    }

    /// The node with the largest key.
    #[must_use]
    pub fn last(&self) -> Option<NodeId> {
        self.root.map(|root| NodeId(self.rightmost(root)))
    }

    /// The node with the next larger key.
    #[must_use]
    pub fn next(&self, node: NodeId) -> Option<NodeId> {
        if let Some(right) = self.node(node.0).right {
            return Some(NodeId(self.leftmost(right)));
        }

        self.first_ancestor_from(node.0, Side::Left).map(NodeId)
    }

    /// The node with the next smaller key.
    #[must_use]
    pub fn prev(&self, node: NodeId) -> Option<NodeId> {
        if let Some(left) = self.node(node.0).left {
            return Some(NodeId(self.rightmost(left)));
        }

        self.first_ancestor_from(node.0, Side::Right).map(NodeId)
    }

    /// The left child of a node.
    #[must_use]
    pub fn left(&self, node: NodeId) -> Option<NodeId> {
        self.node(node.0).left.map(NodeId)
    }

    /// The right child of a node.
    #[must_use]
    pub fn right(&self, node: NodeId) -> Option<NodeId> {
        self.node(node.0).right.map(NodeId)
    }

    /// The parent of a node. `None` for the root.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node.0).parent.map(NodeId)
    }

    /// The key of a node.
    #[must_use]
    pub fn key(&self, node: NodeId) -> &K {
        &self.node(node.0).key
    }

    /// The value of a node.
    #[must_use]
    pub fn value<'p>(&self, pool: &'p MemoryPool, node: NodeId) -> &'p V {
        element::value(pool, &self.node(node.0).value)
    }

    /// The value of a node, for writing.
    #[must_use]
    pub fn value_mut<'p>(&mut self, pool: &'p mut MemoryPool, node: NodeId) -> &'p mut V {
        element::value_mut(pool, &self.node(node.0).value)
    }

    /// Visits every node in ascending key order until `f` breaks.
    ///
    /// Returns [`ControlFlow::Break`] if the visit was stopped early.
    pub fn for_each(
        &self,
        pool: &MemoryPool,
        f: impl FnMut(NodeId, &K, &V) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        self.walk(pool, Side::Left, f)
    }

    /// Visits every node in descending key order until `f` breaks.
    ///
    /// Returns [`ControlFlow::Break`] if the visit was stopped early.
    pub fn for_each_rev(
        &self,
        pool: &MemoryPool,
        f: impl FnMut(NodeId, &K, &V) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        self.walk(pool, Side::Right, f)
    }

    /// In-order walk that descends towards `first_side` first.
    fn walk(
        &self,
        pool: &MemoryPool,
        first_side: Side,
        mut f: impl FnMut(NodeId, &K, &V) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        let mut stack = Vec::new();
        let mut cursor = self.root;

        loop {
            while let Some(id) = cursor {
                stack.push(id);
                cursor = self.child(id, first_side);
            }

            let Some(id) = stack.pop() else {
                return ControlFlow::Continue(());
            };

            let node = self.node(id);
            f(NodeId(id), &node.key, element::value(pool, &node.value))?;

            cursor = self.child(id, first_side.opposite());
        }
    }

    /// Finds where a new key would be attached as a leaf, or `None` if it is a duplicate.
    fn leaf_slot(&self, start: usize, key: &K) -> Option<(usize, Side)> {
        let mut current = start;

        loop {
            let node = self.node(current);
            let side = match key.cmp(&node.key) {
                Ordering::Equal => return None,
                Ordering::Less => Side::Left,
                Ordering::Greater => Side::Right,
            };

            match self.child(current, side) {
                Some(child) => current = child,
                None => return Some((current, side)),
            }
        }
    }

    /// Attaches a detached subtree below `start`, at the position its root key belongs.
    fn splice(&mut self, start: usize, subtree: usize) {
        let key = self.node(subtree).key;
        let (parent, side) = self
            .leaf_slot(start, &key)
            .expect("keys in a detached subtree are unique within the tree");

        self.set_child(parent, side, Some(subtree));
        self.node_mut(subtree).parent = Some(parent);
    }

    /// Removes a node that has no children.
    fn remove_leaf(&mut self, pool: &mut MemoryPool, id: usize) {
        self.replace_in_parent(id, None);

        let removed = self.take_node(id);
        debug_assert!(removed.left.is_none() && removed.right.is_none());

        pool.free(removed.value);
    }

    /// Points whatever refers to `id` (its parent's child slot or the root) at `replacement`.
    fn replace_in_parent(&mut self, id: usize, replacement: Option<usize>) {
        match self.node(id).parent {
            Some(parent) => {
                let side = if self.node(parent).left == Some(id) {
                    Side::Left
                } else {
                    Side::Right
                };
                self.set_child(parent, side, replacement);
            }
            None => {
                debug_assert_eq!(self.root, Some(id));
                self.root = replacement;
            }
        }
    }

    /// Walks up from `id` and returns the first ancestor reached from its `side` child.
    fn first_ancestor_from(&self, id: usize, side: Side) -> Option<usize> {
        let mut child = id;
        let mut parent = self.node(id).parent;

        while let Some(current) = parent {
            if self.child(current, side) == Some(child) {
                return Some(current);
            }

            child = current;
            parent = self.node(current).parent;
        }

        None
    }

    fn leftmost(&self, mut id: usize) -> usize {
        while let Some(left) = self.node(id).left {
            id = left;
        }
        id
    }

    fn rightmost(&self, mut id: usize) -> usize {
        while let Some(right) = self.node(id).right {
            id = right;
        }
        id
    }

    fn child(&self, id: usize, side: Side) -> Option<usize> {
        let node = self.node(id);
        match side {
            Side::Left => node.left,
            Side::Right => node.right,
        }
    }

    fn set_child(&mut self, id: usize, side: Side, child: Option<usize>) {
        let node = self.node_mut(id);
        match side {
            Side::Left => node.left = child,
            Side::Right => node.right = child,
        }
    }

    fn alloc_node(
        &mut self,
        pool: &mut MemoryPool,
        key: K,
        value: V,
        parent: Option<usize>,
        tag: SourceTag,
    ) -> usize {
        let allocation = pool.allocate(size_of::<V>(), tag);
        *element::value_mut(pool, &allocation) = value;

        let node = Node {
            key,
            parent,
            left: None,
            right: None,
            value: allocation,
        };

        // Cannot overflow because every node occupies memory.
        self.len = self.len.wrapping_add(1);

        match self.vacant.pop() {
            Some(id) => {
                *self
                    .nodes
                    .get_mut(id)
                    .expect("vacant IDs always refer to arena slots") = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len().wrapping_sub(1)
            }
        }
    }

    fn take_node(&mut self, id: usize) -> Node<K> {
        let node = self
            .nodes
            .get_mut(id)
            .and_then(Option::take)
            .expect("node IDs always refer to live nodes");

        self.vacant.push(id);

        // Cannot underflow because the node existed.
        self.len = self.len.wrapping_sub(1);

        node
    }

    fn node(&self, id: usize) -> &Node<K> {
        self.nodes
            .get(id)
            .and_then(Option::as_ref)
            .expect("node IDs always refer to live nodes")
    }

    fn node_mut(&mut self, id: usize) -> &mut Node<K> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .expect("node IDs always refer to live nodes")
    }
}

impl<K: Ord + Copy, V: Pod> Default for PoolTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl Side {
    fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

#[cfg(test)]
mod tests {
    use memory_pool::source_tag;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(PoolTree<i32, u64>: Send, std::fmt::Debug);
    assert_not_impl_any!(PoolTree<i32, u64>: Sync, Clone);
    assert_impl_all!(NodeId: Send, Sync, Copy, Eq, std::hash::Hash);

    fn build(pool: &mut MemoryPool, keys: &[i32]) -> PoolTree<i32, i32> {
        let mut tree = PoolTree::new();
        for &key in keys {
            tree.insert(pool, key, key * 100, source_tag!()).unwrap();
        }
        tree
    }

    fn keys_in_order(tree: &PoolTree<i32, i32>, pool: &MemoryPool) -> Vec<i32> {
        let mut keys = Vec::new();
        let _ = tree.for_each(pool, |_, key, value| {
            assert_eq!(*value, key * 100);
            keys.push(*key);
            ControlFlow::Continue(())
        });
        keys
    }

    /// Checks parent links and ordering of the whole tree.
    fn assert_consistent(tree: &PoolTree<i32, i32>) {
        let mut count = 0;
        let mut stack: Vec<NodeId> = tree.root().into_iter().collect();

        if let Some(root) = tree.root() {
            assert_eq!(tree.parent(root), None);
        }

        while let Some(node) = stack.pop() {
            count += 1;

            if let Some(left) = tree.left(node) {
                assert_eq!(tree.parent(left), Some(node));
                assert!(tree.key(left) < tree.key(node));
                stack.push(left);
            }
            if let Some(right) = tree.right(node) {
                assert_eq!(tree.parent(right), Some(node));
                assert!(tree.key(right) > tree.key(node));
                stack.push(right);
            }
        }

        assert_eq!(count, tree.len());
    }

    #[test]
    fn in_order_walk_is_sorted() {
        let mut pool = MemoryPool::new();

        let tree = build(&mut pool, &[2, 4, 1, 3, 5, 6]);
        assert_eq!(tree.len(), 6);
        assert_eq!(keys_in_order(&tree, &pool), vec![1, 2, 3, 4, 5, 6]);
        assert_consistent(&tree);

        tree.free(&mut pool);
        assert!(pool.is_empty());
    }

    #[test]
    fn reverse_walk_is_descending_and_can_stop() {
        let mut pool = MemoryPool::new();

        let tree = build(&mut pool, &[2, 4, 1, 3, 5, 6]);

        let mut keys = Vec::new();
        let flow = tree.for_each_rev(&pool, |_, key, _| {
            keys.push(*key);
            if *key == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        assert_eq!(flow, ControlFlow::Break(()));
        assert_eq!(keys, vec![6, 5, 4, 3]);

        tree.free(&mut pool);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut pool = MemoryPool::new();

        let mut tree = build(&mut pool, &[5, 3]);
        assert!(tree.insert(&mut pool, 3, 0, source_tag!()).is_none());
        assert_eq!(tree.len(), 2);
        assert_eq!(pool.live_allocations(), 2);

        tree.free(&mut pool);
    }

    #[test]
    fn remove_root_with_two_children_splices_subtrees() {
        let mut pool = MemoryPool::new();

        let mut tree = build(&mut pool, &[2, 4, 1, 3, 5, 6]);
        let root = tree.root().unwrap();
        assert_eq!(*tree.key(root), 2);

        tree.remove(&mut pool, root);

        // The left subtree {1} becomes the root and {4, 3, 5, 6} hangs to its right.
        let new_root = tree.root().unwrap();
        assert_eq!(*tree.key(new_root), 1);
        assert_eq!(tree.right(new_root).map(|node| *tree.key(node)), Some(4));
        assert_eq!(keys_in_order(&tree, &pool), vec![1, 3, 4, 5, 6]);
        assert_consistent(&tree);
        assert_eq!(pool.live_allocations(), 5);

        tree.free(&mut pool);
        assert!(pool.is_empty());
    }

    #[test]
    fn remove_inner_node_with_two_children() {
        let mut pool = MemoryPool::new();

        let mut tree = build(&mut pool, &[10, 5, 3, 7, 15]);
        assert!(tree.find_remove(&mut pool, &5));

        // Both subtrees of 5 are spliced back in below the root.
        assert_eq!(keys_in_order(&tree, &pool), vec![3, 7, 10, 15]);
        assert_eq!(*tree.key(tree.root().unwrap()), 10);
        assert_consistent(&tree);

        tree.free(&mut pool);
    }

    #[test]
    fn remove_node_with_one_child() {
        let mut pool = MemoryPool::new();

        let mut tree = build(&mut pool, &[2, 4, 1, 3, 5, 6]);
        let five = tree.find(&5).unwrap();
        tree.remove(&mut pool, five);

        let four = tree.find(&4).unwrap();
        assert_eq!(tree.right(four).map(|node| *tree.key(node)), Some(6));
        assert_eq!(keys_in_order(&tree, &pool), vec![1, 2, 3, 4, 6]);
        assert_consistent(&tree);

        tree.free(&mut pool);
    }

    #[test]
    fn remove_inner_link_of_chain_keeps_tail() {
        let mut pool = MemoryPool::new();

        let mut tree = build(&mut pool, &[1, 2, 3]);
        assert!(tree.find_remove(&mut pool, &2));

        let three = tree.find(&3).unwrap();
        assert_eq!(tree.parent(three).map(|node| *tree.key(node)), Some(1));
        assert_eq!(keys_in_order(&tree, &pool), vec![1, 3]);
        assert_eq!(tree.len(), 2);
        assert_eq!(pool.live_allocations(), 2);
        assert_consistent(&tree);

        tree.free(&mut pool);
        assert!(pool.is_empty());
    }

    #[test]
    fn remove_root_with_one_child_promotes_child() {
        let mut pool = MemoryPool::new();

        let mut tree = build(&mut pool, &[1, 2, 3]);
        let root = tree.root().unwrap();
        tree.remove(&mut pool, root);

        let new_root = tree.root().unwrap();
        assert_eq!(*tree.key(new_root), 2);
        assert_eq!(tree.parent(new_root), None);
        assert_eq!(keys_in_order(&tree, &pool), vec![2, 3]);
        assert_eq!(pool.live_allocations(), 2);
        assert_consistent(&tree);

        tree.free(&mut pool);
        assert!(pool.is_empty());
    }

    #[test]
    fn reinsert_after_two_children_removal_is_found() {
        let mut pool = MemoryPool::new();

        let mut tree = build(&mut pool, &[2, 4, 1, 3, 5, 6]);
        let four = tree.find(&4).unwrap();
        assert!(tree.left(four).is_some() && tree.right(four).is_some());

        tree.remove(&mut pool, four);
        assert!(tree.find(&4).is_none());

        let reinserted = tree.insert(&mut pool, 4, 400, source_tag!()).unwrap();
        assert_eq!(tree.find(&4), Some(reinserted));
        assert_eq!(keys_in_order(&tree, &pool), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(pool.live_allocations(), 6);
        assert_consistent(&tree);

        tree.free(&mut pool);
        assert!(pool.is_empty());
    }

    #[test]
    fn remove_only_node_empties_tree() {
        let mut pool = MemoryPool::new();

        let mut tree = build(&mut pool, &[1]);
        assert!(tree.find_remove(&mut pool, &1));
        assert!(tree.is_empty());
        assert!(tree.root().is_none());
        assert!(!tree.find_remove(&mut pool, &1));

        tree.free(&mut pool);
        assert!(pool.is_empty());
    }

    #[test]
    fn remove_subtree_frees_descendants() {
        let mut pool = MemoryPool::new();

        let mut tree = build(&mut pool, &[2, 4, 1, 3, 5, 6]);
        assert!(tree.find_remove_subtree(&mut pool, &4));

        assert_eq!(keys_in_order(&tree, &pool), vec![1, 2]);
        assert_eq!(tree.len(), 2);
        assert_eq!(pool.live_allocations(), 2);
        assert!(!tree.find_remove_subtree(&mut pool, &4));

        tree.free(&mut pool);
        assert!(pool.is_empty());
    }

    #[test]
    fn navigation_follows_key_order() {
        let mut pool = MemoryPool::new();

        let tree = build(&mut pool, &[2, 4, 1, 3, 5, 6]);

        let mut forward = Vec::new();
        let mut cursor = tree.first();
        while let Some(node) = cursor {
            forward.push(*tree.key(node));
            cursor = tree.next(node);
        }
        assert_eq!(forward, vec![1, 2, 3, 4, 5, 6]);

        let mut backward = Vec::new();
        let mut cursor = tree.last();
        while let Some(node) = cursor {
            backward.push(*tree.key(node));
            cursor = tree.prev(node);
        }
        assert_eq!(backward, vec![6, 5, 4, 3, 2, 1]);

        tree.free(&mut pool);
    }

    #[test]
    fn set_only_touches_existing_keys() {
        let mut pool = MemoryPool::new();

        let mut tree = build(&mut pool, &[1, 2]);
        assert!(tree.set(&mut pool, &3, 0).is_none());
        assert_eq!(tree.len(), 2);

        let two = tree.set(&mut pool, &2, 7).unwrap();
        assert_eq!(*tree.value(&pool, two), 7);

        let three = tree.set_or_insert(&mut pool, 3, 9, source_tag!());
        assert_eq!(*tree.value(&pool, three), 9);
        assert_eq!(tree.len(), 3);

        let again = tree.set_or_insert(&mut pool, 3, 11, source_tag!());
        assert_eq!(again, three);
        assert_eq!(*tree.value(&pool, three), 11);

        tree.free(&mut pool);
    }

    #[test]
    fn unit_values_still_track_nodes() {
        let mut pool = MemoryPool::new();

        let mut tree = PoolTree::<u8, ()>::new();
        tree.insert(&mut pool, 1, (), source_tag!());
        tree.insert(&mut pool, 2, (), source_tag!());
        assert_eq!(pool.live_allocations(), 2);

        tree.clear(&mut pool);
        assert!(tree.is_empty());
        assert!(pool.is_empty());
    }

    #[test]
    fn removing_many_keeps_order() {
        let mut pool = MemoryPool::new();

        let keys: Vec<i32> = (0..64).map(|i| (i * 37) % 64).collect();
        let mut tree = build(&mut pool, &keys);

        for key in (0..64).filter(|key| key % 3 == 0) {
            assert!(tree.find_remove(&mut pool, &key));
            assert_consistent(&tree);
        }

        let expected: Vec<i32> = (0..64).filter(|key| key % 3 != 0).collect();
        assert_eq!(keys_in_order(&tree, &pool), expected);

        tree.free(&mut pool);
        assert!(pool.is_empty());
    }
}
