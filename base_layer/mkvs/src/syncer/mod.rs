// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

mod error;
mod subtree;

pub use error::{SubtreeError, SyncerError};
pub use subtree::{
    InternalNodeSummary,
    ReconstructedSubtree,
    Subtree,
    SubtreeEntry,
    SubtreeIndex,
    SubtreePointer,
    INVALID_SUBTREE_INDEX,
};

use crate::{
    context::Context,
    node::{Depth, Key, Node, NodeId, Root},
};

/// A source of tree content addressed by root.
///
/// Implemented by [`Tree`](crate::Tree), so that one tree may serve as the remote of another. Every call is checked
/// against `root`: a source that is not synchronised to it answers [`SyncerError::InvalidRoot`].
pub trait ReadSyncer: Send + Sync {
    /// A proof of everything below `id`, decomposed down to `max_depth` levels.
    fn get_subtree(&self, ctx: &Context, root: &Root, id: &NodeId, max_depth: Depth) -> Result<Subtree, SyncerError>;

    /// A minimal proof of the presence or absence of `key`, starting at `start_bit_depth`.
    fn get_path(&self, ctx: &Context, root: &Root, key: &Key, start_bit_depth: Depth) -> Result<Subtree, SyncerError>;

    /// The raw node addressed by `id`. The node is untrusted: its hash must be recomputed from content.
    fn get_node(&self, ctx: &Context, root: &Root, id: &NodeId) -> Result<Node, SyncerError>;
}

/// A read syncer that has nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopReadSyncer;

impl ReadSyncer for NopReadSyncer {
    fn get_subtree(&self, ctx: &Context, _: &Root, _: &NodeId, _: Depth) -> Result<Subtree, SyncerError> {
        ctx.check()?;
        Err(SyncerError::NodeNotFound)
    }

    fn get_path(&self, ctx: &Context, _: &Root, _: &Key, _: Depth) -> Result<Subtree, SyncerError> {
        ctx.check()?;
        Err(SyncerError::NodeNotFound)
    }

    fn get_node(&self, ctx: &Context, _: &Root, _: &NodeId) -> Result<Node, SyncerError> {
        ctx.check()?;
        Err(SyncerError::NodeNotFound)
    }
}
