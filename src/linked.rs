//! A pointer-linked BST multimap with parent back-references. Keys are unique per
//! node; inserting under an existing key prepends to that node's value collection
//! instead of creating a second node. The tree never rebalances, so its shape is
//! exactly determined by insertion order.
//!
//! The parent links are what pay for themselves here: both resumable iterators
//! ([`Tree::preorder_iter`], [`Tree::postorder_iter`]) advance by climbing them,
//! needing neither recursion nor an auxiliary stack.
//!
//! # Examples
//!
//! ```
//! use bst_multimap::linked::Tree;
//!
//! let mut tree = Tree::new();
//!
//! // Nothing in here yet.
//! assert_eq!(tree.find(&1), None);
//!
//! tree.insert(1, "a");
//! assert_eq!(tree.find(&1), Some(&["a"][..]));
//!
//! // Inserting a new value for the same key prepends it.
//! tree.insert(1, "b");
//! assert_eq!(tree.find(&1), Some(&["b", "a"][..]));
//!
//! // Deleting a node returns its whole value collection.
//! let deleted = tree.delete(&1);
//!
//! assert_eq!(deleted, Some(vec!["b", "a"]));
//! assert_eq!(tree.find(&1), None);
//! ```

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::iter::{FromIterator, FusedIterator};
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

/// A Binary Search Tree multimap. Supports inserting, finding, and deleting keyed
/// value collections, four bulk traversal orders, and resumable preorder/postorder
/// iterators driven by parent pointers.
pub struct Tree<K, V> {
    // This is a `Link` instead of an `Option<Node>` so that it can be moved around with the `Tree`
    // without the children's parent pointers breaking.
    root: Link<K, V>,
    len: usize,
}

impl<K, V> Default for Tree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Drop for Tree<K, V> {
    fn drop(&mut self) {
        // A degenerate tree is as deep as it is large, so teardown walks an explicit
        // stack instead of recursing.
        let mut stack = Vec::new();
        stack.extend(self.root.take().0);
        while let Some(node) = stack.pop() {
            // SAFETY: Every node was allocated by `Node::new_boxed` and is owned by exactly
            // one child link (or the root link). Each pointer is popped once, so no double
            // free, and nothing else can reach the node while the `Tree` is being dropped.
            let node = unsafe { Box::from_raw(node.as_ptr()) };
            stack.extend(node.left.0);
            stack.extend(node.right.0);
        }
    }
}

impl<K, V> Clone for Tree<K, V>
where
    K: Clone,
    V: Clone,
{
    fn clone(&self) -> Self {
        let root = self.root().map(|root| {
            let new_root = Box::leak(Box::new(root.clone()));
            new_root.fix_left_child_parent();
            new_root.fix_right_child_parent();
            NonNull::from(new_root)
        });
        Self {
            root: Link(root),
            len: self.len,
        }
    }
}

impl<K, V> fmt::Debug for Tree<K, V>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree").field("root", &self.root()).finish()
    }
}

impl<K, V> Tree<K, V> {
    /// Generate a new, empty `Tree`.
    pub fn new() -> Self {
        Self {
            root: Link(None),
            len: 0,
        }
    }

    /// The number of distinct keys (equivalently, nodes) in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no keys at all.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Potentially finds the values associated with the given key in this tree, most
    /// recently inserted first. If no node has the corresponding key, `None` is
    /// returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use bst_multimap::linked::Tree;
    ///
    /// let mut tree = Tree::new();
    /// tree.insert(1, 2);
    ///
    /// assert_eq!(tree.find(&1), Some(&[2][..]));
    /// assert_eq!(tree.find(&42), None);
    /// ```
    pub fn find(&self, key: &K) -> Option<&[V]>
    where
        K: Ord,
    {
        self.root().and_then(|n| n.find(key)).map(Vec::as_slice)
    }

    /// Inserts the given value into the tree under the given key. If the key is
    /// already present, the value is prepended to that node's existing collection and
    /// the tree's shape does not change.
    ///
    /// # Examples
    ///
    /// ```
    /// use bst_multimap::linked::Tree;
    ///
    /// let mut tree = Tree::new();
    ///
    /// tree.insert(1, 2);
    /// assert_eq!(tree.find(&1), Some(&[2][..]));
    ///
    /// tree.insert(1, 3);
    /// assert_eq!(tree.find(&1), Some(&[3, 2][..]));
    /// assert_eq!(tree.len(), 1);
    /// ```
    pub fn insert(&mut self, key: K, value: V)
    where
        K: Ord,
    {
        // Descend to the key's node or, failing that, to the null link where it
        // belongs, remembering the last node visited as the prospective parent.
        let mut parent = None;
        let mut trav = self.root.0;
        while let Some(mut cur) = trav {
            // SAFETY: `cur` was reached through this tree's links and we hold `&mut self`,
            // so no other reference to any node exists while `node` is live.
            let node = unsafe { cur.as_mut() };
            match key.cmp(&node.key) {
                Ordering::Equal => {
                    node.values.insert(0, value);
                    return;
                }
                Ordering::Less => {
                    parent = Some(cur);
                    trav = node.left.0;
                }
                Ordering::Greater => {
                    parent = Some(cur);
                    trav = node.right.0;
                }
            }
        }

        let mut new_node = Node::new_boxed(key, value);
        new_node.parent = Link(parent);
        let new_node = NonNull::from(Box::leak(new_node));

        match parent {
            // The tree was empty.
            None => self.root = Link(Some(new_node)),
            Some(mut parent) => {
                // SAFETY: Same as the descent above; additionally `new_node` is a separate
                // allocation, so the shared borrow of its key cannot alias `parent`.
                unsafe {
                    let new_key = &new_node.as_ref().key;
                    let parent = parent.as_mut();
                    if *new_key < parent.key {
                        parent.left = Link(Some(new_node));
                    } else {
                        parent.right = Link(Some(new_node));
                    }

                    if cfg!(debug_assertions) {
                        if let Some(left) = parent.left() {
                            assert!(left.key < parent.key);
                        }
                        if let Some(right) = parent.right() {
                            assert!(parent.key < right.key);
                        }
                    }
                }
            }
        }
        self.len += 1;
    }

    /// Deletes the node containing the given key from the tree and returns its value
    /// collection as it stood just before deletion. If the tree does not contain a
    /// node with the key, nothing happens and `None` is returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use bst_multimap::linked::Tree;
    ///
    /// let mut tree = Tree::new();
    /// tree.insert(1, 2);
    /// tree.insert(1, 3);
    ///
    /// assert_eq!(tree.delete(&1), Some(vec![3, 2]));
    /// assert_eq!(tree.find(&1), None);
    /// assert_eq!(tree.delete(&1), None);
    /// ```
    pub fn delete(&mut self, key: &K) -> Option<Vec<V>>
    where
        K: Ord,
    {
        let mut trav = self.root.0;
        while let Some(cur) = trav {
            // SAFETY: `cur` was reached through this tree's links and we hold `&mut self`;
            // only shared access happens during the descent.
            let node = unsafe { cur.as_ref() };
            match key.cmp(&node.key) {
                Ordering::Less => trav = node.left.0,
                Ordering::Greater => trav = node.right.0,
                Ordering::Equal => break,
            }
        }
        let target = trav?;

        // SAFETY (both arms): `target` is reachable from the root. In the two-child arm
        // the successor is a distinct node inside the target's right subtree, so the two
        // `&mut` field borrows in each `mem::swap` never alias; afterwards the successor
        // node holds the deleted content and has no left child, satisfying `splice`'s
        // at-most-one-child requirement.
        let removed = match unsafe { ((*target.as_ptr()).left.0, (*target.as_ptr()).right.0) } {
            (Some(_), Some(right)) => unsafe {
                // The in-order successor: leftmost node of the right subtree.
                let mut successor = right;
                while let Some(left) = successor.as_ref().left.0 {
                    successor = left;
                }

                // The successor's content replaces the target's in place, keeping the
                // target node (and both its subtrees) where they are; the successor's
                // now-redundant node is the one spliced out.
                mem::swap(&mut (*target.as_ptr()).key, &mut (*successor.as_ptr()).key);
                mem::swap(
                    &mut (*target.as_ptr()).values,
                    &mut (*successor.as_ptr()).values,
                );
                self.splice(successor)
            },
            _ => unsafe { self.splice(target) },
        };
        self.len -= 1;

        Some(removed.values)
    }

    /// Unlinks `node` from the tree, replacing it at its parent (or at the root) with
    /// its single child, if any. The child's parent back-reference is rewired to the
    /// grandparent. Returns the detached node with all of its links cleared.
    ///
    /// # Safety
    ///
    /// `node` must be owned by this tree and have at most one child, and no reference
    /// into the tree may be live.
    unsafe fn splice(&mut self, node: NonNull<Node<K, V>>) -> Box<Node<K, V>> {
        let mut detached = Box::from_raw(node.as_ptr());
        let child = detached.left.take().0.or(detached.right.take().0);
        let parent = detached.parent.take();

        if let Some(mut child) = child {
            child.as_mut().parent = parent;
        }
        match parent.0 {
            None => self.root = Link(child),
            Some(mut parent) => {
                let parent = parent.as_mut();
                if parent.left.0 == Some(node) {
                    parent.left = Link(child);
                } else {
                    parent.right = Link(child);
                }
            }
        }

        detached
    }

    /// The tree's keys in preorder: each node before both of its subtrees, left
    /// subtree before right.
    ///
    /// # Examples
    ///
    /// ```
    /// use bst_multimap::linked::Tree;
    ///
    /// let tree: Tree<_, _> = [5, 3, 8].iter().map(|&k| (k, ())).collect();
    ///
    /// assert_eq!(tree.preorder(), [&5, &3, &8]);
    /// ```
    pub fn preorder(&self) -> Vec<&K> {
        let mut keys = Vec::with_capacity(self.len);
        if let Some(root) = self.root() {
            root.collect_preorder(&mut keys);
        }
        keys
    }

    /// The tree's keys in postorder: both subtrees before each node, left subtree
    /// before right.
    pub fn postorder(&self) -> Vec<&K> {
        let mut keys = Vec::with_capacity(self.len);
        if let Some(root) = self.root() {
            root.collect_postorder(&mut keys);
        }
        keys
    }

    /// The tree's keys in order: left subtree, node, right subtree. By the BST
    /// invariant this is ascending sorted order.
    pub fn inorder(&self) -> Vec<&K>
    where
        K: Ord,
    {
        let mut keys = Vec::with_capacity(self.len);
        if let Some(root) = self.root() {
            root.collect_inorder(&mut keys);
        }
        keys
    }

    /// The tree's keys grouped by depth, breadth-first: the root's key alone in the
    /// first group, then each deeper level's keys left to right.
    ///
    /// # Examples
    ///
    /// ```
    /// use bst_multimap::linked::Tree;
    ///
    /// let tree: Tree<_, _> = [5, 3, 8, 4].iter().map(|&k| (k, ())).collect();
    ///
    /// assert_eq!(tree.level_order(), [vec![&5], vec![&3, &8], vec![&4]]);
    /// ```
    pub fn level_order(&self) -> Vec<Vec<&K>> {
        let mut levels: Vec<Vec<&K>> = Vec::new();
        let mut queue = VecDeque::new();
        if let Some(root) = self.root() {
            queue.push_back((root, 0));
        }
        // FIFO order makes the dequeued depths non-decreasing, so a new group starts
        // exactly when the depth first exceeds the number of existing groups.
        while let Some((node, depth)) = queue.pop_front() {
            if levels.len() == depth {
                levels.push(Vec::new());
            }
            levels[depth].push(&node.key);
            if let Some(left) = node.left() {
                queue.push_back((left, depth + 1));
            }
            if let Some(right) = node.right() {
                queue.push_back((right, depth + 1));
            }
        }
        levels
    }

    /// A lazy preorder traversal of the tree's keys. Yields the same sequence as
    /// [`Tree::preorder`] without materializing it.
    ///
    /// # Examples
    ///
    /// ```
    /// use bst_multimap::linked::Tree;
    ///
    /// let tree: Tree<_, _> = [2, 1, 3].iter().map(|&k| (k, ())).collect();
    ///
    /// let keys: Vec<_> = tree.preorder_iter().collect();
    /// assert_eq!(keys, tree.preorder());
    /// ```
    pub fn preorder_iter(&self) -> PreorderIter<'_, K, V> {
        PreorderIter {
            next: self.root.0,
            _tree: PhantomData,
        }
    }

    /// A lazy postorder traversal of the tree's keys. Yields the same sequence as
    /// [`Tree::postorder`] without materializing it.
    pub fn postorder_iter(&self) -> PostorderIter<'_, K, V> {
        // Postorder starts at the leftmost-deepest leaf and ends at the root.
        PostorderIter {
            next: self.root.0.map(leftmost_leaf),
            _tree: PhantomData,
        }
    }

    fn root(&self) -> Option<&Node<K, V>> {
        self.root.node()
    }
}

impl<K, V> Extend<(K, V)> for Tree<K, V>
where
    K: Ord,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Tree<K, V>
where
    K: Ord,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tree = Self::new();
        tree.extend(iter);
        tree
    }
}

struct Link<K, V>(Option<NonNull<Node<K, V>>>);

impl<K, V> Clone for Link<K, V> {
    fn clone(&self) -> Self {
        Self(self.0)
    }
}
impl<K, V> Copy for Link<K, V> {}

impl<K, V> Link<K, V> {
    fn node(&self) -> Option<&Node<K, V>> {
        // SAFETY: A non-`None` link always points at a live `Node`. Taking `&self` ties
        // the returned borrow to the link, so it cannot outlive the tree that owns the
        // node, and `node_mut` cannot be called while it is held.
        unsafe { self.0.as_ref().map(|ptr| ptr.as_ref()) }
    }

    fn node_mut(&mut self) -> Option<&mut Node<K, V>> {
        // SAFETY: As in `node`, plus `&mut self` rules out a second live borrow through
        // this link.
        unsafe { self.0.as_mut().map(|ptr| ptr.as_mut()) }
    }

    fn take(&mut self) -> Self {
        Link(self.0.take())
    }
}

struct Node<K, V> {
    key: K,
    /// The values inserted under `key`, most recent first. Never empty.
    values: Vec<V>,
    left: Link<K, V>,
    right: Link<K, V>,
    /// Back-reference to the node owning this one as a child; `None` only at the root.
    /// Non-owning, unlike `left`/`right`.
    parent: Link<K, V>,
}

impl<K, V> Clone for Node<K, V>
where
    K: Clone,
    V: Clone,
{
    fn clone(&self) -> Self {
        // Each cloned child fixes its own children's parents; this node's children are
        // fixed by whoever leaks the clone of this node.
        let left = self.left().map(|left| {
            let new_left = Box::leak(Box::new(left.clone()));
            new_left.fix_left_child_parent();
            new_left.fix_right_child_parent();
            NonNull::from(new_left)
        });
        let right = self.right().map(|right| {
            let new_right = Box::leak(Box::new(right.clone()));
            new_right.fix_left_child_parent();
            new_right.fix_right_child_parent();
            NonNull::from(new_right)
        });
        Self {
            key: self.key.clone(),
            values: self.values.clone(),
            left: Link(left),
            right: Link(right),
            parent: self.parent,
        }
    }
}

impl<K, V> fmt::Debug for Node<K, V>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("values", &self.values)
            .field("left", &self.left())
            .field("right", &self.right())
            .finish()
    }
}

impl<K, V> Node<K, V> {
    fn new_boxed(key: K, value: V) -> Box<Self> {
        Box::new(Node {
            key,
            values: vec![value],
            left: Link(None),
            right: Link(None),
            parent: Link(None),
        })
    }

    fn left(&self) -> Option<&Self> {
        self.left.node()
    }

    fn right(&self) -> Option<&Self> {
        self.right.node()
    }

    fn left_mut(&mut self) -> Option<&mut Self> {
        self.left.node_mut()
    }

    fn right_mut(&mut self) -> Option<&mut Self> {
        self.right.node_mut()
    }

    fn fix_left_child_parent(&mut self) {
        let self_ptr = NonNull::from(&*self);
        if let Some(left) = self.left_mut() {
            left.parent = Link(Some(self_ptr));
        }
    }

    fn fix_right_child_parent(&mut self) {
        let self_ptr = NonNull::from(&*self);
        if let Some(right) = self.right_mut() {
            right.parent = Link(Some(self_ptr));
        }
    }

    fn find(&self, key: &K) -> Option<&Vec<V>>
    where
        K: Ord,
    {
        match key.cmp(&self.key) {
            Ordering::Less => self.left().and_then(|n| n.find(key)),
            Ordering::Equal => Some(&self.values),
            Ordering::Greater => self.right().and_then(|n| n.find(key)),
        }
    }

    fn collect_preorder<'a>(&'a self, keys: &mut Vec<&'a K>) {
        keys.push(&self.key);
        if let Some(left) = self.left() {
            left.collect_preorder(keys);
        }
        if let Some(right) = self.right() {
            right.collect_preorder(keys);
        }
    }

    fn collect_postorder<'a>(&'a self, keys: &mut Vec<&'a K>) {
        if let Some(left) = self.left() {
            left.collect_postorder(keys);
        }
        if let Some(right) = self.right() {
            right.collect_postorder(keys);
        }
        keys.push(&self.key);
    }

    fn collect_inorder<'a>(&'a self, keys: &mut Vec<&'a K>) {
        if let Some(left) = self.left() {
            left.collect_inorder(keys);
        }
        keys.push(&self.key);
        if let Some(right) = self.right() {
            right.collect_inorder(keys);
        }
    }
}

/// Descends to the leftmost-deepest leaf below `node`: repeatedly the left child when
/// present, else the right child, until neither exists. This is where a postorder
/// traversal of the subtree starts.
fn leftmost_leaf<K, V>(mut node: NonNull<Node<K, V>>) -> NonNull<Node<K, V>> {
    loop {
        // SAFETY: `node` starts out reachable from a live tree and every step follows a
        // child link, so it stays reachable; callers hold a borrow of the tree.
        let n = unsafe { node.as_ref() };
        match n.left.0.or(n.right.0) {
            Some(child) => node = child,
            None => return node,
        }
    }
}

/// A resumable preorder traversal over a [`Tree`]'s keys, created by
/// [`Tree::preorder_iter`].
///
/// Advances by parent pointers rather than recursion or a stack: a whole traversal
/// crosses every edge of the tree at most twice, so it is `O(n)` overall even though
/// a single step may climb `O(height)` links.
pub struct PreorderIter<'a, K, V> {
    next: Option<NonNull<Node<K, V>>>,
    _tree: PhantomData<&'a Tree<K, V>>,
}

impl<'a, K, V> Iterator for PreorderIter<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        let cur = self.next?;
        // SAFETY: The iterator borrows the tree for 'a, so no mutation or drop can
        // invalidate `cur` (or any node we climb to) while the returned key borrow
        // lives.
        let node = unsafe { &*cur.as_ptr() };

        self.next = if node.left.0.is_some() {
            node.left.0
        } else if node.right.0.is_some() {
            node.right.0
        } else {
            // At a leaf. Climb past every ancestor we entered from its right child (or
            // that has no right child); the first remaining ancestor's right subtree is
            // unvisited and comes next. No such ancestor means the traversal is done.
            let mut child = cur;
            let mut parent = node.parent.0;
            loop {
                match parent {
                    None => break None,
                    Some(p) => {
                        // SAFETY: As above; parent links of a borrowed tree are live.
                        let p_node = unsafe { &*p.as_ptr() };
                        match p_node.right.0 {
                            Some(right) if right != child => break Some(right),
                            _ => {
                                child = p;
                                parent = p_node.parent.0;
                            }
                        }
                    }
                }
            }
        };

        Some(&node.key)
    }
}

impl<K, V> FusedIterator for PreorderIter<'_, K, V> {}

/// A resumable postorder traversal over a [`Tree`]'s keys, created by
/// [`Tree::postorder_iter`]. Parent-pointer driven, like [`PreorderIter`].
pub struct PostorderIter<'a, K, V> {
    next: Option<NonNull<Node<K, V>>>,
    _tree: PhantomData<&'a Tree<K, V>>,
}

impl<'a, K, V> Iterator for PostorderIter<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        let cur = self.next?;
        // SAFETY: See `PreorderIter::next`; the same borrow argument applies.
        let node = unsafe { &*cur.as_ptr() };

        self.next = match node.parent.0 {
            // The root is the last node in postorder.
            None => None,
            Some(parent) => {
                // SAFETY: As above.
                let p_node = unsafe { &*parent.as_ptr() };
                match p_node.right.0 {
                    // We came out of the left subtree and a right sibling subtree
                    // exists; postorder continues at its leftmost-deepest leaf.
                    Some(right) if right != cur => Some(leftmost_leaf(right)),
                    // Otherwise both of the parent's subtrees are finished.
                    _ => Some(parent),
                }
            }
        };

        Some(&node.key)
    }
}

impl<K, V> FusedIterator for PostorderIter<'_, K, V> {}


#[cfg(test)]
mod quicktests {
    use std::collections::HashMap;

    use super::tests::check_consistency;
    use super::*;
    use crate::test::quick::Op;

    /// Applies a set of operations to a tree and a hashmap of value lists.
    /// This way we can ensure that after a random smattering of inserts
    /// and deletes we have the same keys mapped to the same value lists.
    fn do_ops(ops: &[Op<i8, i8>], tree: &mut Tree<i8, i8>, map: &mut HashMap<i8, Vec<i8>>) {
        for op in ops {
            match *op {
                Op::Insert(k, v) => {
                    tree.insert(k, v);
                    map.entry(k).or_insert_with(Vec::new).insert(0, v);
                }
                Op::Remove(k) => {
                    assert_eq!(tree.delete(&k), map.remove(&k));
                }
                Op::Iter => {
                    assert_eq!(tree.preorder_iter().collect::<Vec<_>>(), tree.preorder());
                    assert_eq!(tree.postorder_iter().collect::<Vec<_>>(), tree.postorder());
                }
            }
        }
    }

    quickcheck::quickcheck! {
        fn fuzz_multiple_operations_i8(ops: Vec<Op<i8, i8>>) -> bool {
            let mut tree = Tree::new();
            let mut map = HashMap::new();

            do_ops(&ops, &mut tree, &mut map);
            check_consistency(&tree);

            map.len() == tree.len()
                && map.iter().all(|(k, vs)| tree.find(k) == Some(vs.as_slice()))
        }
    }

    quickcheck::quickcheck! {
        fn contains(xs: Vec<i8>) -> bool {
            let mut tree = Tree::new();
            for x in &xs {
                tree.insert(*x, *x);
            }

            xs.iter().all(|x| tree.find(x).map_or(false, |vs| vs.contains(x)))
        }
    }

    quickcheck::quickcheck! {
        fn inorder_is_sorted_and_deduplicated(xs: Vec<i8>) -> bool {
            let tree: Tree<i8, i8> = xs.iter().map(|&x| (x, x)).collect();

            let inorder = tree.inorder();
            inorder.windows(2).all(|pair| pair[0] < pair[1])
        }
    }
}
