// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use thiserror::Error;

use crate::{context::CancelReason, node::Hash};

/// Failures of the read-proof operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncerError {
    /// The supplied root is not the one the tree is synchronised to, or the requested node does not exist under it.
    #[error("mkvs: invalid root")]
    InvalidRoot,
    /// Uncommitted writes are pending.
    #[error("mkvs: dirty root")]
    DirtyRoot,
    #[error("mkvs: node not found during sync")]
    NodeNotFound,
    #[error("mkvs: operation aborted: {0}")]
    Cancelled(CancelReason),
    #[error("Poisoned access to the node cache")]
    PoisonedAccess,
    #[error("Subtree error: {0}")]
    Subtree(#[from] SubtreeError),
}

/// Problems building or checking a [`Subtree`](crate::Subtree) proof.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubtreeError {
    #[error("Proof has too many entries for the 16-bit index space")]
    TooManyEntries,
    #[error("Cannot add a node with uncommitted children to a proof")]
    DirtyNode,
    #[error("Pointer in entry {entry} references index {index} which is not an earlier entry")]
    DanglingIndex { entry: usize, index: u16 },
    #[error("Pointer in entry {entry} disagrees with the kind of entry {index}")]
    EntryKindMismatch { entry: usize, index: u16 },
    #[error("Pointer in entry {entry} is not in canonical form")]
    NonCanonicalPointer { entry: usize },
    #[error("Pointer in entry {entry} is unresolved")]
    UnresolvedPointer { entry: usize },
    #[error("Entry {index} is referenced {count} times")]
    BadReferenceCount { index: usize, count: usize },
    #[error("Colocated leaf slot of entry {entry} does not hold a leaf")]
    MalformedLeafSlot { entry: usize },
    #[error("The proof does not cover the requested key")]
    Incomplete,
    #[error("Proof root hash {actual} does not match the expected {expected}")]
    RootHashMismatch { expected: Hash, actual: Hash },
    #[error("Proof decoding error: {0}")]
    DecodingError(String),
    #[error("Proof encoding error: {0}")]
    EncodingError(String),
}
