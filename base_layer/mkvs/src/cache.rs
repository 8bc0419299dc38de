// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! The node cache of a tree.
//!
//! The cache is the only mutable state of a [`Tree`](crate::Tree). It is guarded by a single mutex which every tree
//! operation holds for its whole duration, including any node database or remote I/O triggered while resolving
//! pointers. Committed nodes are content addressed, so resolved nodes are handed out as shared immutable
//! `Arc<Node>`s and kept in a bounded LRU resident set keyed by hash.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::*;
use lru::LruCache;

use crate::{
    config::MkvsConfig,
    context::Context,
    node::{Depth, Hash, Key, Namespace, Node, NodeId, Pointer, Root},
    node_db::NodeDb,
    syncer::{ReadSyncer, SyncerError},
};

const LOG_TARGET: &str = "c::mkvs::cache";

/// The outcome of resolving a [`NodeId`] against the synchronised root.
#[derive(Clone, Debug)]
pub(crate) struct ResolvedId {
    /// The pointer holding the addressed node, `Pointer::Null` if there is no such node.
    pub pointer: Pointer,
    /// The bit depth at which the pointer's node sits.
    pub bit_depth: Depth,
    /// The id under which the pointer's node can be fetched remotely.
    pub node_id: NodeId,
}

pub(crate) struct Cache {
    inner: Mutex<CacheInner>,
}

impl Cache {
    pub fn new(inner: CacheInner) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Acquires the cache for the duration of one tree operation.
    pub fn lock(&self) -> Result<MutexGuard<'_, CacheInner>, SyncerError> {
        self.inner.lock().map_err(|_| SyncerError::PoisonedAccess)
    }

    pub fn into_inner(self) -> CacheInner {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct CacheInner {
    namespace: Namespace,
    /// The committed root reads are answered against.
    sync_root: Root,
    /// The root of the local working copy. Equal to the sync root unless writes are pending.
    pending_root: Pointer,
    resident: LruCache<Hash, Arc<Node>>,
    node_db: Arc<dyn NodeDb>,
    remote: Option<Arc<dyn ReadSyncer>>,
    config: MkvsConfig,
}

impl CacheInner {
    pub fn new(node_db: Arc<dyn NodeDb>, root: Root, config: MkvsConfig) -> Self {
        let resident = match config.max_resident_nodes {
            0 => LruCache::unbounded(),
            n => LruCache::new(n),
        };
        Self {
            namespace: root.namespace,
            sync_root: root,
            pending_root: Pointer::from_hash(root.hash),
            resident,
            node_db,
            remote: None,
            config,
        }
    }

    pub fn set_remote(&mut self, remote: Arc<dyn ReadSyncer>) {
        self.remote = Some(remote);
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn config(&self) -> &MkvsConfig {
        &self.config
    }

    pub fn node_db(&self) -> &Arc<dyn NodeDb> {
        &self.node_db
    }

    pub fn sync_root(&self) -> Root {
        self.sync_root
    }

    pub fn pending_root(&self) -> &Pointer {
        &self.pending_root
    }

    pub fn set_pending_root(&mut self, pointer: Pointer) {
        self.pending_root = pointer;
    }

    /// Moves the cache to a new committed root. Any pending writes are discarded.
    pub fn set_sync_root(&mut self, root: Root) {
        self.sync_root = root;
        self.pending_root = Pointer::from_hash(root.hash);
    }

    /// Whether the working copy is exactly the committed sync root.
    pub fn is_clean(&self) -> bool {
        self.pending_root.is_clean() && self.pending_root.hash() == self.sync_root.hash
    }

    /// The preconditions of every read-proof operation.
    pub fn check_read(&self, root: &Root) -> Result<(), SyncerError> {
        if !self.is_clean() {
            return Err(SyncerError::DirtyRoot);
        }
        if *root != self.sync_root {
            return Err(SyncerError::InvalidRoot);
        }
        Ok(())
    }

    pub fn resident_len(&self) -> usize {
        self.resident.len()
    }

    pub fn admit(&mut self, hash: Hash, node: Arc<Node>) {
        self.resident.put(hash, node);
    }

    /// Walks from the sync root towards `id` and returns the pointer holding the node that `id` addresses.
    ///
    /// The id `{path, d}` addresses the node whose label covers bit position `d`; a leaf answers if its key agrees
    /// with the path up to `d`. A label or key that disagrees with the path means the node does not exist, which is
    /// reported as a `Pointer::Null` rather than an error.
    pub fn deref_node_id(&mut self, ctx: &Context, id: &NodeId) -> Result<ResolvedId, SyncerError> {
        let mut resolved = ResolvedId {
            pointer: Pointer::from_hash(self.sync_root.hash),
            bit_depth: 0,
            node_id: NodeId::root(),
        };
        let absent = |resolved: ResolvedId| ResolvedId {
            pointer: Pointer::Null,
            ..resolved
        };
        let target = id.path.prefix(id.bit_depth);
        if target.bit_length() < id.bit_depth {
            return Ok(absent(resolved));
        }
        loop {
            let node = match self.deref_node_ptr(ctx, &resolved.pointer, &resolved.node_id, Some(&id.path))? {
                Some(node) => node,
                None => return Ok(resolved),
            };
            match node.as_ref() {
                Node::Leaf(leaf) => {
                    if leaf.key.matches_at(0, &target) {
                        return Ok(resolved);
                    }
                    return Ok(absent(resolved));
                },
                Node::Internal(n) => {
                    let bd = resolved.bit_depth;
                    let end = bd + n.label_bit_length();
                    if id.bit_depth <= end {
                        if target.matches_at(bd, &n.label.prefix(id.bit_depth - bd)) {
                            return Ok(resolved);
                        }
                        return Ok(absent(resolved));
                    }
                    if !target.matches_at(bd, &n.label) {
                        return Ok(absent(resolved));
                    }
                    let right = target.get_bit(end);
                    resolved = ResolvedId {
                        pointer: if right { n.right.clone() } else { n.left.clone() },
                        bit_depth: end,
                        node_id: NodeId::child(&target, end, right),
                    };
                },
            }
        }
    }

    /// Resolves a pointer to its node.
    ///
    /// Resident nodes are returned directly. A clean pointer that is not resident is looked up in the node database
    /// and, failing that, fetched from the remote read syncer (if any) by asking for the path to `id`, or towards
    /// `key` if given. Everything a remote returns is checked against its recomputed hash before it is admitted.
    pub fn deref_node_ptr(
        &mut self,
        ctx: &Context,
        ptr: &Pointer,
        id: &NodeId,
        key: Option<&Key>,
    ) -> Result<Option<Arc<Node>>, SyncerError> {
        ctx.check()?;
        match ptr {
            Pointer::Null => Ok(None),
            Pointer::Dirty(node) => Ok(Some(node.clone())),
            Pointer::Clean(hash) => self.resolve(ctx, hash, id, key).map(Some),
        }
    }

    fn resolve(
        &mut self,
        ctx: &Context,
        hash: &Hash,
        id: &NodeId,
        key: Option<&Key>,
    ) -> Result<Arc<Node>, SyncerError> {
        if let Some(node) = self.resident.get(hash) {
            trace!(target: LOG_TARGET, "Resident hit for node {} at {}", hash, id);
            return Ok(node.clone());
        }
        match self.node_db.get_node(hash) {
            Ok(Some(node)) => {
                if node.hash() == *hash {
                    trace!(target: LOG_TARGET, "Loaded node {} at {} from the node database", hash, id);
                    let node = Arc::new(node);
                    self.admit(*hash, node.clone());
                    return Ok(node);
                }
                warn!(
                    target: LOG_TARGET,
                    "Node database returned content that does not hash to {}. Ignoring it.", hash
                );
            },
            Ok(None) => {},
            Err(e) => {
                warn!(target: LOG_TARGET, "Node database lookup of {} failed: {}", hash, e);
            },
        }
        self.fetch_remote(ctx, hash, id, key)
    }

    fn fetch_remote(
        &mut self,
        ctx: &Context,
        hash: &Hash,
        id: &NodeId,
        key: Option<&Key>,
    ) -> Result<Arc<Node>, SyncerError> {
        let remote = match &self.remote {
            Some(remote) => remote.clone(),
            None => {
                debug!(target: LOG_TARGET, "Node {} at {} not found and no read syncer configured", hash, id);
                return Err(SyncerError::NodeNotFound);
            },
        };
        let own_path = id.path.prefix(id.bit_depth);
        let path = match key {
            Some(key) if self.config.remote_prefetch && key.matches_at(0, &own_path) => key.clone(),
            _ => own_path,
        };
        debug!(
            target: LOG_TARGET,
            "Fetching node {} at {} from the read syncer (path {})", hash, id, path
        );
        let subtree = match remote.get_path(ctx, &self.sync_root, &path, id.bit_depth) {
            Ok(subtree) => subtree,
            Err(e @ SyncerError::Cancelled(_)) => return Err(e),
            Err(e) => {
                warn!(target: LOG_TARGET, "Read syncer could not provide node {}: {}", hash, e);
                return Err(SyncerError::NodeNotFound);
            },
        };
        let reconstructed = match subtree.reconstruct() {
            Ok(reconstructed) => reconstructed,
            Err(e) => {
                warn!(target: LOG_TARGET, "Read syncer returned a malformed proof for {}: {}", hash, e);
                return Err(SyncerError::NodeNotFound);
            },
        };

        let mut found = None;
        for (node_hash, node) in &reconstructed.nodes {
            if node_hash == hash {
                found = Some(node.clone());
            }
            self.admit(*node_hash, node.clone());
        }
        let node = match found {
            Some(node) => node,
            None => {
                warn!(
                    target: LOG_TARGET,
                    "Proof from the read syncer does not contain node {} (proof root {})",
                    hash,
                    reconstructed.root_hash
                );
                return Err(SyncerError::NodeNotFound);
            },
        };
        if self.config.persist_fetched_nodes {
            if let Err(e) = self.node_db.put_nodes(&reconstructed.nodes) {
                warn!(target: LOG_TARGET, "Could not persist fetched nodes: {}", e);
            }
        }
        trace!(
            target: LOG_TARGET,
            "Admitted {} fetched nodes for {}",
            reconstructed.nodes.len(),
            hash
        );
        Ok(node)
    }
}
