// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! The write/commit boundary. An [`ApplyBackend`] turns a write log over a source root into a new committed root and
//! reports it in receipt bodies, one new root per storage replica.

use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    config::MkvsConfig,
    context::Context,
    node::{Hash, Namespace, Root, Round},
    node_db::{NodeDb, OverlayNodeDb},
    syncer::SyncerError,
    tree::{Tree, TreeError},
    write_log::WriteLog,
};

const LOG_TARGET: &str = "c::mkvs::apply";

pub const RECEIPT_BODY_VERSION: u16 = 1;

/// The content of a storage receipt: the roots a replica committed to for `round`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ReceiptBody {
    pub version: u16,
    pub namespace: Namespace,
    pub round: Round,
    pub roots: Vec<Hash>,
}

pub trait ApplyBackend {
    /// Applies `write_log` to the tree at `(namespace, src_round, src_root)` and commits the result at `dst_round`.
    ///
    /// The new root must equal `expected_new_root`; otherwise nothing is persisted and
    /// [`TreeError::RootMismatch`] is returned.
    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        ctx: &Context,
        namespace: Namespace,
        src_round: Round,
        src_root: Hash,
        dst_round: Round,
        expected_new_root: Hash,
        write_log: &WriteLog,
    ) -> Result<Vec<ReceiptBody>, TreeError>;
}

/// A single replica applying write logs to a local node database.
pub struct LocalApplyBackend {
    node_db: Arc<dyn NodeDb>,
    config: MkvsConfig,
}

impl LocalApplyBackend {
    pub fn new(node_db: Arc<dyn NodeDb>, config: MkvsConfig) -> Self {
        Self { node_db, config }
    }
}

impl ApplyBackend for LocalApplyBackend {
    fn apply(
        &self,
        ctx: &Context,
        namespace: Namespace,
        src_round: Round,
        src_root: Hash,
        dst_round: Round,
        expected_new_root: Hash,
        write_log: &WriteLog,
    ) -> Result<Vec<ReceiptBody>, TreeError> {
        if dst_round < src_round {
            return Err(TreeError::RoundNotMonotonic {
                current: src_round,
                requested: dst_round,
            });
        }
        let src = Root::new(namespace, src_round, src_root);
        if !src.is_empty() && !self.node_db.has_root(&src)? {
            warn!(target: LOG_TARGET, "Cannot apply a write log to unknown root {}", src);
            return Err(SyncerError::InvalidRoot.into());
        }

        let overlay = Arc::new(OverlayNodeDb::new(self.node_db.clone()));
        let tree = Tree::open(overlay.clone(), src, self.config.clone());
        tree.apply_write_log(ctx, write_log)?;
        let new_root = tree.commit(ctx, dst_round)?;
        if new_root.hash != expected_new_root {
            warn!(
                target: LOG_TARGET,
                "Write log of {} entries on {} produced {}, expected {}",
                write_log.len(),
                src,
                new_root.hash,
                expected_new_root
            );
            return Err(TreeError::RootMismatch {
                expected: expected_new_root,
                actual: new_root.hash,
            });
        }
        overlay.flush()?;
        debug!(target: LOG_TARGET, "Applied {} entries: {} -> {}", write_log.len(), src, new_root);
        Ok(vec![ReceiptBody {
            version: RECEIPT_BODY_VERSION,
            namespace,
            round: dst_round,
            roots: vec![new_root.hash],
        }])
    }
}
