// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! The backing store boundary of the tree. Nodes are stored by the hash of their content, committed roots are
//! recorded so that a tree can later be reopened at them.

mod memory;
mod overlay;

use std::sync::Arc;

pub use memory::MemoryNodeDb;
pub(crate) use overlay::OverlayNodeDb;
use thiserror::Error;

use crate::node::{Hash, Node, Root};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeDbError {
    #[error("Poisoned access to the node database")]
    PoisonedAccess,
    #[error("Node serialization error: {0}")]
    SerializationError(String),
    #[error("Node deserialization error: {0}")]
    DeserializationError(String),
}

/// Content addressed node storage.
///
/// A missing node is reported as `Ok(None)`. `Err` is reserved for failures of the store itself so that callers can
/// tell absence apart from a transient problem.
pub trait NodeDb: Send + Sync {
    fn get_node(&self, hash: &Hash) -> Result<Option<Node>, NodeDbError>;

    /// Stores a batch of committed nodes keyed by their hashes. Storing a node twice is a no-op.
    fn put_nodes(&self, nodes: &[(Hash, Arc<Node>)]) -> Result<(), NodeDbError>;

    /// Records that `root` has been committed and all of its nodes are stored.
    fn put_root(&self, root: &Root) -> Result<(), NodeDbError>;

    fn has_root(&self, root: &Root) -> Result<bool, NodeDbError>;
}

impl<T: NodeDb + ?Sized> NodeDb for Arc<T> {
    fn get_node(&self, hash: &Hash) -> Result<Option<Node>, NodeDbError> {
        (**self).get_node(hash)
    }

    fn put_nodes(&self, nodes: &[(Hash, Arc<Node>)]) -> Result<(), NodeDbError> {
        (**self).put_nodes(nodes)
    }

    fn put_root(&self, root: &Root) -> Result<(), NodeDbError> {
        (**self).put_root(root)
    }

    fn has_root(&self, root: &Root) -> Result<bool, NodeDbError> {
        (**self).has_root(root)
    }
}
