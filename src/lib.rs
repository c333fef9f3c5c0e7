//! A Binary Search Tree (BST) multimap: each key maps to an ordered
//! collection of values, with the most recently inserted value first.
//!
//! ## Binary Search Tree
//!
//! A Binary Search Tree is a data structure supporting operations to
//! insert, find, and delete stored records. BSTs are typically defined
//! recursively using the notion of a `Node`. A `Node` stores a key, the
//! values inserted under that key, and sometimes has child `Node`s. The
//! most important invariants of a BST are:
//!
//! 1. For every `Node` in a BST, all the `Node`s in its left subtree have a
//!    key less than its own key.
//! 2. For every `Node` in a BST, all the `Node`s in its right subtree have a
//!    key greater than its own key.
//!
//! > Note that some `Node`s have no children. These `Node`s are called "leaf nodes".
//!
//! Searching for keys in the tree takes `O(height)` (where `height` is
//! defined as the longest path from the root `Node` to a leaf `Node`).
//! This tree does not rebalance itself, so an adversarial insertion order
//! (e.g. sorted keys) degenerates it into a linked list and `height`
//! becomes `O(N)`. BSTs naturally support sorted iteration by visiting the
//! left subtree, then the subtree root, then the right subtree; this crate
//! additionally offers preorder, postorder, and depth-grouped level-order
//! traversals, plus resumable preorder/postorder iterators that walk the
//! tree via parent pointers without recursion or an auxiliary stack.

#![deny(missing_docs, clippy::clone_on_ref_ptr)]

pub mod linked;
