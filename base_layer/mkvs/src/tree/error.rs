// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use thiserror::Error;

use crate::{
    node::{Hash, Namespace, Round},
    node_db::NodeDbError,
    syncer::SyncerError,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Key of {len} bytes exceeds the maximum of {max} bytes")]
    KeyTooLong { len: usize, max: usize },
    #[error("Value of {len} bytes exceeds the maximum of {max} bytes")]
    ValueTooLarge { len: usize, max: usize },
    #[error("Cannot commit round {requested} after round {current}")]
    RoundNotMonotonic { current: Round, requested: Round },
    #[error("Root belongs to namespace {actual:?}, expected {expected:?}")]
    NamespaceMismatch { expected: Namespace, actual: Namespace },
    #[error("Applying the write log produced root {actual} but {expected} was expected")]
    RootMismatch { expected: Hash, actual: Hash },
    #[error("Syncer error: {0}")]
    SyncerError(#[from] SyncerError),
    #[error("Node database error: {0}")]
    NodeDbError(#[from] NodeDbError),
}
