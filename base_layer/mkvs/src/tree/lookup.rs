// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use super::{malformed_leaf_slot, Position};
use crate::{
    cache::CacheInner,
    context::Context,
    node::{Key, Node},
    syncer::SyncerError,
};

/// Looks `key` up in the working copy, including pending writes.
pub(super) fn get(cache: &mut CacheInner, ctx: &Context, key: &Key) -> Result<Option<Vec<u8>>, SyncerError> {
    let mut ptr = cache.pending_root().clone();
    let mut pos = Position::root();
    loop {
        let node = match cache.deref_node_ptr(ctx, &ptr, &pos.id, Some(key))? {
            Some(node) => node,
            None => return Ok(None),
        };
        let n = match node.as_ref() {
            Node::Leaf(leaf) => return Ok((leaf.key == *key).then(|| leaf.value.clone())),
            Node::Internal(n) => n,
        };
        if !key.matches_at(pos.bit_depth, &n.label) {
            return Ok(None);
        }
        let end = pos.bit_depth + n.label_bit_length();
        if key.bit_length() == end {
            let slot = pos.leaf_slot(&n.label);
            return match cache.deref_node_ptr(ctx, &n.leaf_node, &slot.id, Some(key))? {
                None => Ok(None),
                Some(leaf) => match leaf.as_ref() {
                    Node::Leaf(leaf) => Ok((leaf.key == *key).then(|| leaf.value.clone())),
                    Node::Internal(_) => malformed_leaf_slot(&slot, &n.leaf_node.hash()),
                },
            };
        }
        let right = key.get_bit(end);
        let next = pos.child(&n.label, right);
        ptr = if right { n.right.clone() } else { n.left.clone() };
        pos = next;
    }
}
