// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::sync::Arc;

use crate::node::{Hash, InternalNode, Node, Pointer};

/// Replaces every dirty node below `ptr` by its clean form, bottom-up, collecting the new nodes into `batch`.
pub(super) fn commit_pointer(ptr: &Pointer, batch: &mut Vec<(Hash, Arc<Node>)>) -> Pointer {
    let node = match ptr {
        Pointer::Dirty(node) => node,
        clean => return clean.clone(),
    };
    let clean = match node.as_ref() {
        Node::Leaf(leaf) => Node::Leaf(leaf.clone()),
        Node::Internal(n) => Node::Internal(InternalNode::new(
            n.label.clone(),
            commit_pointer(&n.leaf_node, batch),
            commit_pointer(&n.left, batch),
            commit_pointer(&n.right, batch),
        )),
    };
    let hash = clean.hash();
    batch.push((hash, Arc::new(clean)));
    Pointer::Clean(hash)
}
