// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! Proof extraction.
//!
//! Both [`Tree::get_subtree`] and [`Tree::get_path`] are one recursive descent from a starting node, differing only
//! in the [`Policy`] that decides which nodes are decomposed into summaries and which are shipped verbatim.

use log::*;

use super::{malformed_leaf_slot, Position, Tree};
use crate::{
    cache::CacheInner,
    context::Context,
    node::{Depth, Key, Node, NodeId, Pointer, Root},
    syncer::{InternalNodeSummary, ReadSyncer, Subtree, SubtreePointer, SyncerError},
};

const LOG_TARGET: &str = "c::mkvs::sync";

#[derive(Clone, Copy, Debug)]
enum Policy<'a> {
    /// Decompose everything down to `max_depth` levels below the starting node.
    Bounded { max_depth: Depth },
    /// Decompose only the nodes on the path towards `key`.
    OnPath(&'a Key),
    /// Ship the node verbatim.
    OffPath,
}

impl<'a> Policy<'a> {
    fn key(&self) -> Option<&'a Key> {
        match self {
            Policy::OnPath(key) => Some(*key),
            _ => None,
        }
    }

    fn emit_full(&self, depth: Depth) -> bool {
        match self {
            Policy::Bounded { max_depth } => depth >= *max_depth,
            Policy::OnPath(_) => false,
            Policy::OffPath => true,
        }
    }

    /// The policy for the left or right child of an internal node whose label ends at `end`.
    fn branch(&self, end: Depth, right: bool) -> Policy<'a> {
        match self {
            Policy::OnPath(key) if end < key.bit_length() && key.get_bit(end) == right => Policy::OnPath(*key),
            Policy::OnPath(_) => Policy::OffPath,
            other => *other,
        }
    }
}

struct Extractor<'c> {
    cache: &'c mut CacheInner,
    ctx: &'c Context,
    subtree: Subtree,
}

impl<'c> Extractor<'c> {
    fn new(cache: &'c mut CacheInner, ctx: &'c Context) -> Self {
        Self {
            cache,
            ctx,
            subtree: Subtree::new(),
        }
    }

    /// Emits the subtree held by `ptr` and returns the pointer referencing it. Children are emitted before their
    /// parent.
    fn extract(
        &mut self,
        ptr: &Pointer,
        pos: &Position,
        policy: Policy<'_>,
        depth: Depth,
    ) -> Result<SubtreePointer, SyncerError> {
        let node = match self.cache.deref_node_ptr(self.ctx, ptr, &pos.id, policy.key())? {
            Some(node) => node,
            None => return Ok(SubtreePointer::absent()),
        };
        let n = match node.as_ref() {
            Node::Internal(n) if !policy.emit_full(depth) => n,
            // Leaves are never decomposed
            full => {
                let index = self.subtree.add_full_node(full.clone())?;
                return Ok(SubtreePointer::full(index));
            },
        };

        let slot = pos.leaf_slot(&n.label);
        let end = slot.bit_depth;
        let leaf_node = self.extract_leaf_slot(&n.leaf_node, &slot, policy)?;
        let left = self.extract(&n.left, &pos.child(&n.label, false), policy.branch(end, false), depth + 1)?;
        let right = self.extract(&n.right, &pos.child(&n.label, true), policy.branch(end, true), depth + 1)?;
        let index = self.subtree.add_summary(InternalNodeSummary {
            label: n.label.clone(),
            leaf_node,
            left,
            right,
        })?;
        Ok(SubtreePointer::summary(index))
    }

    /// A colocated leaf does not consume a level and is always emitted in full.
    fn extract_leaf_slot(
        &mut self,
        ptr: &Pointer,
        pos: &Position,
        policy: Policy<'_>,
    ) -> Result<SubtreePointer, SyncerError> {
        let node = match self.cache.deref_node_ptr(self.ctx, ptr, &pos.id, policy.key())? {
            Some(node) => node,
            None => return Ok(SubtreePointer::absent()),
        };
        if !node.is_leaf() {
            malformed_leaf_slot(pos, &ptr.hash());
        }
        let index = self.subtree.add_full_node(node.as_ref().clone())?;
        Ok(SubtreePointer::full(index))
    }

    fn finish(mut self, root: SubtreePointer) -> Result<Subtree, SyncerError> {
        if root.is_absent() {
            return Err(SyncerError::InvalidRoot);
        }
        self.subtree.set_root(root);
        Ok(self.subtree)
    }
}

fn start_position(id: &NodeId, bit_depth: Depth, node_id: NodeId) -> Position {
    Position::new(id.path.prefix(bit_depth), bit_depth, node_id)
}

impl Tree {
    /// Returns a proof of everything reachable from the node addressed by `id`. Internal nodes are decomposed into
    /// summaries down to `max_depth` levels below it; nodes at `max_depth` are shipped verbatim.
    ///
    /// Fails with [`SyncerError::DirtyRoot`] while writes are pending, and with [`SyncerError::InvalidRoot`] if
    /// `root` is not the sync root or nothing exists at `id`.
    pub fn get_subtree(
        &self,
        ctx: &Context,
        root: &Root,
        id: &NodeId,
        max_depth: Depth,
    ) -> Result<Subtree, SyncerError> {
        let mut cache = self.cache.lock()?;
        cache.check_read(root)?;
        debug!(target: LOG_TARGET, "get_subtree {} at {} (max depth {})", id, root, max_depth);

        let resolved = cache.deref_node_id(ctx, id)?;
        let pos = start_position(id, resolved.bit_depth, resolved.node_id);
        let mut extractor = Extractor::new(&mut cache, ctx);
        let subtree_root = extractor.extract(&resolved.pointer, &pos, Policy::Bounded { max_depth }, 0)?;
        let subtree = extractor.finish(subtree_root)?;
        trace!(target: LOG_TARGET, "get_subtree {} produced {} entries", id, subtree.len());
        Ok(subtree)
    }

    /// Returns a minimal proof of the presence or absence of `key`, starting at the node covering
    /// `start_bit_depth`. Only internal nodes on the path to the key are decomposed; their off-path children and all
    /// leaves are shipped verbatim.
    pub fn get_path(
        &self,
        ctx: &Context,
        root: &Root,
        key: &Key,
        start_bit_depth: Depth,
    ) -> Result<Subtree, SyncerError> {
        let mut cache = self.cache.lock()?;
        cache.check_read(root)?;
        debug!(target: LOG_TARGET, "get_path {} from bit {} at {}", key, start_bit_depth, root);

        let id = NodeId::new(key.clone(), start_bit_depth);
        let resolved = cache.deref_node_id(ctx, &id)?;
        let pos = start_position(&id, resolved.bit_depth, resolved.node_id);
        let mut extractor = Extractor::new(&mut cache, ctx);
        let subtree_root = extractor.extract(&resolved.pointer, &pos, Policy::OnPath(key), 0)?;
        let subtree = extractor.finish(subtree_root)?;
        trace!(target: LOG_TARGET, "get_path {} produced {} entries", key, subtree.len());
        Ok(subtree)
    }

    /// Returns the raw node addressed by `id`.
    ///
    /// The node comes from the cache, which may have fetched it from an untrusted source; callers must recompute
    /// its hash with [`Node::hash`] before relying on it.
    pub fn get_node(&self, ctx: &Context, root: &Root, id: &NodeId) -> Result<Node, SyncerError> {
        let mut cache = self.cache.lock()?;
        cache.check_read(root)?;
        debug!(target: LOG_TARGET, "get_node {} at {}", id, root);

        let resolved = cache.deref_node_id(ctx, id)?;
        match cache.deref_node_ptr(ctx, &resolved.pointer, &resolved.node_id, None)? {
            Some(node) => Ok(node.as_ref().clone()),
            None => Err(SyncerError::NodeNotFound),
        }
    }
}

impl ReadSyncer for Tree {
    fn get_subtree(&self, ctx: &Context, root: &Root, id: &NodeId, max_depth: Depth) -> Result<Subtree, SyncerError> {
        Tree::get_subtree(self, ctx, root, id, max_depth)
    }

    fn get_path(&self, ctx: &Context, root: &Root, key: &Key, start_bit_depth: Depth) -> Result<Subtree, SyncerError> {
        Tree::get_path(self, ctx, root, key, start_bit_depth)
    }

    fn get_node(&self, ctx: &Context, root: &Root, id: &NodeId) -> Result<Node, SyncerError> {
        Tree::get_node(self, ctx, root, id)
    }
}
