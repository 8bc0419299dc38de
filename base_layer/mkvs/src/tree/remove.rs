// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use super::{malformed_leaf_slot, Position};
use crate::{
    cache::CacheInner,
    context::Context,
    node::{InternalNode, Key, Node, Pointer},
    syncer::SyncerError,
};

/// Removes `key` from the subtree held by `ptr`, whose node sits at `pos`. Returns `None` if the key was not present.
///
/// A branch left with a single child is collapsed: a remaining leaf moves up into its place and a remaining
/// internal node absorbs the branch's label.
pub(super) fn remove(
    cache: &mut CacheInner,
    ctx: &Context,
    ptr: &Pointer,
    pos: &Position,
    key: &Key,
) -> Result<Option<Pointer>, SyncerError> {
    let node = match cache.deref_node_ptr(ctx, ptr, &pos.id, Some(key))? {
        Some(node) => node,
        None => return Ok(None),
    };
    let n = match node.as_ref() {
        Node::Leaf(leaf) if leaf.key == *key => return Ok(Some(Pointer::Null)),
        Node::Leaf(_) => return Ok(None),
        Node::Internal(n) => n,
    };
    if !key.matches_at(pos.bit_depth, &n.label) {
        return Ok(None);
    }
    let end = pos.bit_depth + n.label_bit_length();
    let mut updated = n.clone();
    if key.bit_length() == end {
        let slot = pos.leaf_slot(&n.label);
        match cache.deref_node_ptr(ctx, &n.leaf_node, &slot.id, Some(key))? {
            None => return Ok(None),
            Some(existing) => match existing.as_ref() {
                Node::Leaf(leaf) if leaf.key == *key => updated.leaf_node = Pointer::Null,
                Node::Leaf(_) => return Ok(None),
                Node::Internal(_) => malformed_leaf_slot(&slot, &n.leaf_node.hash()),
            },
        }
    } else {
        let right = key.get_bit(end);
        let child = if right { &n.right } else { &n.left };
        let new_child = match remove(cache, ctx, child, &pos.child(&n.label, right), key)? {
            Some(new_child) => new_child,
            None => return Ok(None),
        };
        if right {
            updated.right = new_child;
        } else {
            updated.left = new_child;
        }
    }
    collapse(cache, ctx, pos, updated).map(Some)
}

fn collapse(
    cache: &mut CacheInner,
    ctx: &Context,
    pos: &Position,
    node: InternalNode,
) -> Result<Pointer, SyncerError> {
    match (node.leaf_node.is_null(), node.left.is_null(), node.right.is_null()) {
        (true, true, true) => Ok(Pointer::Null),
        (false, true, true) => Ok(node.leaf_node),
        (true, false, true) | (true, true, false) => {
            let right = node.left.is_null();
            let child = if right { &node.right } else { &node.left };
            let child_pos = pos.child(&node.label, right);
            match cache.deref_node_ptr(ctx, child, &child_pos.id, None)? {
                None => Ok(Pointer::Null),
                Some(remaining) => match remaining.as_ref() {
                    Node::Leaf(_) => Ok(child.clone()),
                    Node::Internal(m) => {
                        let label = node.label.merge(node.label_bit_length(), &m.label);
                        Ok(Pointer::dirty(
                            InternalNode::new(label, m.leaf_node.clone(), m.left.clone(), m.right.clone()).into(),
                        ))
                    },
                },
            }
        },
        _ => Ok(Pointer::dirty(node.into())),
    }
}
