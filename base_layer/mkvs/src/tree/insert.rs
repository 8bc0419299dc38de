// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use super::{malformed_leaf_slot, Position};
use crate::{
    cache::CacheInner,
    context::Context,
    node::{Depth, InternalNode, Key, LeafNode, Node, Pointer},
    syncer::SyncerError,
};

/// Inserts `key` into the subtree held by `ptr`, whose node sits at `pos`. Returns the new pointer, which is `ptr`
/// itself if nothing changed.
///
/// The resulting shape only depends on the set of keys: an internal node exists exactly where keys diverge or where
/// one key ends and others continue, and its label spans the bits all keys below it share.
pub(super) fn insert(
    cache: &mut CacheInner,
    ctx: &Context,
    ptr: &Pointer,
    pos: &Position,
    key: &Key,
    value: &[u8],
) -> Result<Pointer, SyncerError> {
    let node = match cache.deref_node_ptr(ctx, ptr, &pos.id, Some(key))? {
        Some(node) => node,
        None => return Ok(new_leaf(key, value)),
    };
    match node.as_ref() {
        Node::Leaf(leaf) => {
            if leaf.key == *key {
                if leaf.value == value {
                    return Ok(ptr.clone());
                }
                return Ok(new_leaf(key, value));
            }
            let split = leaf.key.common_prefix_len(key);
            let mut branch = empty_branch(label_between(key, pos.bit_depth, split));
            place(&mut branch, &leaf.key, split, ptr.clone());
            place(&mut branch, key, split, new_leaf(key, value));
            Ok(Pointer::dirty(branch.into()))
        },
        Node::Internal(n) => {
            let full_path = pos.path.merge(pos.bit_depth, &n.label);
            let end = full_path.bit_length();
            let split = key.common_prefix_len(&full_path);
            if split < end {
                // The key leaves the label early, so the node moves down one level below a new branch
                let (_, rest) = full_path.split(split);
                let existing = InternalNode::new(rest, n.leaf_node.clone(), n.left.clone(), n.right.clone());
                let mut branch = empty_branch(label_between(key, pos.bit_depth, split));
                place(&mut branch, &full_path, split, Pointer::dirty(existing.into()));
                place(&mut branch, key, split, new_leaf(key, value));
                return Ok(Pointer::dirty(branch.into()));
            }

            let mut updated = n.clone();
            if key.bit_length() == end {
                let slot = pos.leaf_slot(&n.label);
                let leaf_node = match cache.deref_node_ptr(ctx, &n.leaf_node, &slot.id, Some(key))? {
                    None => new_leaf(key, value),
                    Some(existing) => match existing.as_ref() {
                        Node::Leaf(leaf) if leaf.value == value => return Ok(ptr.clone()),
                        Node::Leaf(_) => new_leaf(key, value),
                        Node::Internal(_) => malformed_leaf_slot(&slot, &n.leaf_node.hash()),
                    },
                };
                updated.leaf_node = leaf_node;
            } else {
                let right = key.get_bit(end);
                let child = if right { &n.right } else { &n.left };
                let new_child = insert(cache, ctx, child, &pos.child(&n.label, right), key, value)?;
                if same_pointer(child, &new_child) {
                    return Ok(ptr.clone());
                }
                if right {
                    updated.right = new_child;
                } else {
                    updated.left = new_child;
                }
            }
            Ok(Pointer::dirty(updated.into()))
        },
    }
}

fn new_leaf(key: &Key, value: &[u8]) -> Pointer {
    Pointer::dirty(LeafNode::new(key.clone(), value.to_vec()).into())
}

fn empty_branch(label: Key) -> InternalNode {
    InternalNode::new(label, Pointer::Null, Pointer::Null, Pointer::Null)
}

/// The bits `[from, to)` of `key`.
fn label_between(key: &Key, from: Depth, to: Depth) -> Key {
    key.prefix(to).split(from).1
}

/// Hangs `ptr` off `branch`, whose label ends at `end`, on the side given by `key`.
fn place(branch: &mut InternalNode, key: &Key, end: Depth, ptr: Pointer) {
    if key.bit_length() == end {
        branch.leaf_node = ptr;
    } else if key.get_bit(end) {
        branch.right = ptr;
    } else {
        branch.left = ptr;
    }
}

/// Identity, not content, comparison.
pub(super) fn same_pointer(a: &Pointer, b: &Pointer) -> bool {
    match (a, b) {
        (Pointer::Null, Pointer::Null) => true,
        (Pointer::Clean(a), Pointer::Clean(b)) => a == b,
        (Pointer::Dirty(a), Pointer::Dirty(b)) => std::sync::Arc::ptr_eq(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::MkvsConfig,
        node::{Namespace, Root},
        node_db::MemoryNodeDb,
    };

    fn cache() -> CacheInner {
        CacheInner::new(
            Arc::new(MemoryNodeDb::new()),
            Root::empty(Namespace::default(), 0),
            MkvsConfig::default(),
        )
    }

    fn insert_all(keys: &[&str]) -> Pointer {
        let mut cache = cache();
        let ctx = Context::background();
        let mut root = Pointer::Null;
        for key in keys {
            let key = Key::from(key.as_bytes());
            root = insert(&mut cache, &ctx, &root, &Position::root(), &key, b"v").unwrap();
        }
        root
    }

    fn internal(ptr: &Pointer) -> InternalNode {
        match ptr {
            Pointer::Dirty(node) => node.as_internal().unwrap().clone(),
            _ => panic!("expected a dirty internal node"),
        }
    }

    #[test]
    fn single_key_is_a_leaf_root() {
        let root = insert_all(&["a"]);
        match root {
            Pointer::Dirty(node) => assert!(node.is_leaf()),
            _ => panic!("expected a dirty leaf"),
        }
    }

    #[test]
    fn diverging_keys_share_a_labelled_branch() {
        // 'a' = 01100001, 'b' = 01100010
        let root = insert_all(&["a", "b"]);
        let node = internal(&root);
        assert_eq!(node.label, Key::from(&b"a"[..]).prefix(6));
        assert!(node.leaf_node.is_null());
        assert_eq!(node.left.hash(), LeafNode::new(Key::from(&b"a"[..]), b"v".to_vec()).hash());
        assert_eq!(node.right.hash(), LeafNode::new(Key::from(&b"b"[..]), b"v".to_vec()).hash());
    }

    #[test]
    fn prefix_keys_use_the_leaf_slot() {
        let root = insert_all(&["ab", "a"]);
        let node = internal(&root);
        assert_eq!(node.label, Key::from(&b"a"[..]));
        assert_eq!(node.leaf_node.hash(), LeafNode::new(Key::from(&b"a"[..]), b"v".to_vec()).hash());
        assert!(node.right.is_null());
        assert!(!node.left.is_null());
    }

    #[test]
    fn splitting_a_label_moves_the_node_down() {
        // 'a' = 01100001, 'b' = 01100010, 'q' = 01110001
        let root = insert_all(&["a", "b", "q"]);
        let node = internal(&root);
        assert_eq!(node.label, Key::from(&b"a"[..]).prefix(3));
        let lower = internal(&node.left);
        // The lower node keeps the rest of the old label, starting with its direction bit
        assert_eq!(lower.label, Key::from(&b"a"[..]).prefix(6).split(3).1);
        assert_eq!(lower.label.bit_length(), 3);
        assert!(!lower.label.get_bit(0));
        assert!(!node.right.is_null());
    }

    #[test]
    fn shape_is_independent_of_insertion_order() {
        let keys = vec!["a", "ab", "abc", "b", "q", "", "zz", "z"];
        let expected = insert_all(&keys).hash();
        let mut reversed = keys.clone();
        reversed.reverse();
        assert_eq!(insert_all(&reversed).hash(), expected);
        let mut rotated = keys.clone();
        rotated.rotate_left(3);
        assert_eq!(insert_all(&rotated).hash(), expected);
    }
}
