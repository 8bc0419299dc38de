// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

mod commit;
mod error;
mod insert;
mod lookup;
mod remove;
mod sync;

use std::sync::Arc;

pub use error::TreeError;
use log::*;

use crate::{
    cache::{Cache, CacheInner},
    config::MkvsConfig,
    context::Context,
    node::{Depth, Hash, Key, KeyError, Namespace, NodeId, Root, Round},
    node_db::NodeDb,
    syncer::{ReadSyncer, SyncerError},
    write_log::WriteLog,
};

const LOG_TARGET: &str = "c::mkvs::tree";

/// A versioned, Merkleized key-value tree of one namespace.
///
/// Reads that produce proofs ([`Tree::get_subtree`], [`Tree::get_path`], [`Tree::get_node`]) are answered against
/// the committed sync root only and are refused while local writes are pending. Local writes go to a working copy
/// which [`Tree::commit`] turns into a new root. All operations on one tree are serialised.
pub struct Tree {
    cache: Cache,
}

impl Tree {
    /// An empty tree of `namespace` at round 0.
    pub fn new(node_db: Arc<dyn NodeDb>, namespace: Namespace, config: MkvsConfig) -> Self {
        Self::open(node_db, Root::empty(namespace, 0), config)
    }

    /// A tree synchronised to a committed `root`. Nodes are loaded from `node_db` on demand.
    pub fn open(node_db: Arc<dyn NodeDb>, root: Root, config: MkvsConfig) -> Self {
        Self {
            cache: Cache::new(CacheInner::new(node_db, root, config)),
        }
    }

    /// Resolves nodes missing from the node database through `remote`.
    ///
    /// The remote must be a different tree (or another source) synchronised to the same root.
    pub fn with_read_syncer(self, remote: Arc<dyn ReadSyncer>) -> Self {
        let mut inner = self.cache.into_inner();
        inner.set_remote(remote);
        Self {
            cache: Cache::new(inner),
        }
    }

    pub fn namespace(&self) -> Result<Namespace, TreeError> {
        Ok(self.cache.lock()?.namespace())
    }

    /// The committed root this tree is synchronised to.
    pub fn root(&self) -> Result<Root, TreeError> {
        Ok(self.cache.lock()?.sync_root())
    }

    /// Whether writes are pending since the last commit.
    pub fn is_dirty(&self) -> Result<bool, TreeError> {
        Ok(!self.cache.lock()?.is_clean())
    }

    /// The number of committed nodes currently held in memory.
    pub fn resident_nodes(&self) -> Result<usize, TreeError> {
        Ok(self.cache.lock()?.resident_len())
    }

    pub fn get(&self, ctx: &Context, key: &[u8]) -> Result<Option<Vec<u8>>, TreeError> {
        let mut cache = self.cache.lock()?;
        let key = checked_key(cache.config(), key)?;
        Ok(lookup::get(&mut cache, ctx, &key)?)
    }

    pub fn insert(&self, ctx: &Context, key: &[u8], value: &[u8]) -> Result<(), TreeError> {
        let mut cache = self.cache.lock()?;
        let key = checked_key(cache.config(), key)?;
        let max = cache.config().effective_max_value_size();
        if value.len() > max {
            return Err(TreeError::ValueTooLarge { len: value.len(), max });
        }
        insert_locked(&mut cache, ctx, &key, value)
    }

    /// Removes `key`. Returns whether it was present.
    pub fn remove(&self, ctx: &Context, key: &[u8]) -> Result<bool, TreeError> {
        let mut cache = self.cache.lock()?;
        let key = checked_key(cache.config(), key)?;
        remove_locked(&mut cache, ctx, &key)
    }

    /// Applies every entry of `log` in order. Entries are validated up front, so an oversized key or value leaves
    /// the tree untouched.
    pub fn apply_write_log(&self, ctx: &Context, log: &WriteLog) -> Result<(), TreeError> {
        let mut cache = self.cache.lock()?;
        let config = cache.config().clone();
        let entries = log
            .iter()
            .map(|entry| {
                let key = checked_key(&config, &entry.key)?;
                if let Some(value) = &entry.value {
                    let max = config.effective_max_value_size();
                    if value.len() > max {
                        return Err(TreeError::ValueTooLarge { len: value.len(), max });
                    }
                }
                Ok((key, entry.value.as_deref()))
            })
            .collect::<Result<Vec<_>, TreeError>>()?;
        for (key, value) in entries {
            match value {
                Some(value) => insert_locked(&mut cache, ctx, &key, value)?,
                None => {
                    remove_locked(&mut cache, ctx, &key)?;
                },
            }
        }
        debug!(target: LOG_TARGET, "Applied write log of {} entries", log.len());
        Ok(())
    }

    /// Discards all pending writes.
    pub fn rollback(&self) -> Result<(), TreeError> {
        let mut cache = self.cache.lock()?;
        let root = cache.sync_root();
        cache.set_sync_root(root);
        Ok(())
    }

    /// Hashes all pending writes, stores the new nodes and makes the result the sync root at `round`.
    pub fn commit(&self, ctx: &Context, round: Round) -> Result<Root, TreeError> {
        ctx.check()?;
        let mut cache = self.cache.lock()?;
        let current = cache.sync_root();
        if round < current.round {
            return Err(TreeError::RoundNotMonotonic {
                current: current.round,
                requested: round,
            });
        }
        let mut batch = Vec::new();
        let pointer = commit::commit_pointer(cache.pending_root(), &mut batch);
        let root = Root::new(cache.namespace(), round, pointer.hash());
        cache.node_db().put_nodes(&batch)?;
        cache.node_db().put_root(&root)?;
        debug!(
            target: LOG_TARGET,
            "Committed {} new nodes, root is now {} (was {})",
            batch.len(),
            root,
            current
        );
        for (hash, node) in batch {
            cache.admit(hash, node);
        }
        cache.set_sync_root(root);
        Ok(root)
    }

    /// Re-points a tree without pending writes at another committed root of the same namespace.
    pub fn sync_to(&self, root: Root) -> Result<(), TreeError> {
        let mut cache = self.cache.lock()?;
        if root.namespace != cache.namespace() {
            return Err(TreeError::NamespaceMismatch {
                expected: cache.namespace(),
                actual: root.namespace,
            });
        }
        if !cache.is_clean() {
            return Err(SyncerError::DirtyRoot.into());
        }
        debug!(target: LOG_TARGET, "Syncing to root {}", root);
        cache.set_sync_root(root);
        Ok(())
    }
}

fn checked_key(config: &MkvsConfig, key: &[u8]) -> Result<Key, TreeError> {
    let max = config.effective_max_key_size();
    if key.len() > max {
        return Err(TreeError::KeyTooLong { len: key.len(), max });
    }
    Key::try_new(key.to_vec()).map_err(|KeyError::TooLong { len, max }| TreeError::KeyTooLong { len, max })
}

fn insert_locked(cache: &mut CacheInner, ctx: &Context, key: &Key, value: &[u8]) -> Result<(), TreeError> {
    let root = cache.pending_root().clone();
    let pointer = insert::insert(cache, ctx, &root, &Position::root(), key, value)?;
    cache.set_pending_root(pointer);
    Ok(())
}

fn remove_locked(cache: &mut CacheInner, ctx: &Context, key: &Key) -> Result<bool, TreeError> {
    let root = cache.pending_root().clone();
    match remove::remove(cache, ctx, &root, &Position::root(), key)? {
        Some(pointer) => {
            cache.set_pending_root(pointer);
            Ok(true)
        },
        None => Ok(false),
    }
}

/// Where a pointer sits during a descent from the root.
#[derive(Clone, Debug)]
pub(crate) struct Position {
    /// The bits leading to the pointer's node, exactly `bit_depth` long.
    pub path: Key,
    pub bit_depth: Depth,
    /// The id under which the node can be fetched remotely.
    pub id: NodeId,
}

impl Position {
    pub fn root() -> Self {
        Self::new(Key::empty(), 0, NodeId::root())
    }

    pub fn new(path: Key, bit_depth: Depth, id: NodeId) -> Self {
        Self { path, bit_depth, id }
    }

    /// The position of the left or right child of an internal node with `label` sitting here.
    pub fn child(&self, label: &Key, right: bool) -> Self {
        let path = self.path.merge(self.bit_depth, label);
        let end = path.bit_length();
        let id = NodeId::child(&path, end, right);
        Self::new(path, end, id)
    }

    /// The position of the colocated leaf of an internal node with `label` sitting here.
    pub fn leaf_slot(&self, label: &Key) -> Self {
        let path = self.path.merge(self.bit_depth, label);
        let end = path.bit_length();
        let id = NodeId::branch(&path, end);
        Self::new(path, end, id)
    }
}

/// An internal node found in a colocated leaf slot means the stored tree is corrupt.
fn malformed_leaf_slot(position: &Position, hash: &Hash) -> ! {
    error!(
        target: LOG_TARGET,
        "Internal node {} found in the leaf slot at {}. The tree is corrupt.", hash, position.id
    );
    panic!("mkvs: internal node {} in the leaf slot at {}", hash, position.id);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        node::{InternalNode, Node, Pointer},
        node_db::MemoryNodeDb,
    };

    fn tree() -> Tree {
        Tree::new(Arc::new(MemoryNodeDb::new()), Namespace::default(), MkvsConfig::default())
    }

    #[test]
    fn positions() {
        let label = Key::new(vec![0b0110_0000]).prefix(3);
        let root = Position::root();
        let left = root.child(&label, false);
        assert_eq!(left.bit_depth, 3);
        assert_eq!(left.path, label);
        assert_eq!(left.id, NodeId::new(Key::new(vec![0b0110_0000]).prefix(4), 4));
        let slot = root.leaf_slot(&label);
        assert_eq!(slot.id, NodeId::new(label.clone(), 3));
        let right = left.child(&Key::new(vec![0x80]).prefix(2), true);
        assert_eq!(right.bit_depth, 5);
        assert_eq!(right.id.bit_depth, 6);
        assert!(right.id.path.get_bit(5));
    }

    #[test]
    fn write_commit_read() {
        let ctx = Context::background();
        let tree = tree();
        assert!(!tree.is_dirty().unwrap());
        tree.insert(&ctx, b"key", b"value").unwrap();
        assert!(tree.is_dirty().unwrap());
        assert_eq!(tree.get(&ctx, b"key").unwrap(), Some(b"value".to_vec()));
        let root = tree.commit(&ctx, 1).unwrap();
        assert!(!tree.is_dirty().unwrap());
        assert_eq!(tree.root().unwrap(), root);
        assert_eq!(tree.get(&ctx, b"key").unwrap(), Some(b"value".to_vec()));
        assert_eq!(tree.get(&ctx, b"other").unwrap(), None);
    }

    #[test]
    fn size_limits() {
        let ctx = Context::background();
        let tree = Tree::new(Arc::new(MemoryNodeDb::new()), Namespace::default(), MkvsConfig {
            max_key_size: 4,
            max_value_size: 2,
            ..Default::default()
        });
        assert_eq!(
            tree.insert(&ctx, b"12345", b"v"),
            Err(TreeError::KeyTooLong { len: 5, max: 4 })
        );
        assert_eq!(
            tree.insert(&ctx, b"k", b"vvv"),
            Err(TreeError::ValueTooLarge { len: 3, max: 2 })
        );
        assert!(!tree.is_dirty().unwrap());

        // Configured limits above what a key or leaf hash can hold are capped
        let tree = Tree::new(Arc::new(MemoryNodeDb::new()), Namespace::default(), MkvsConfig {
            max_key_size: usize::MAX,
            max_value_size: usize::MAX,
            ..Default::default()
        });
        let long = vec![1u8; Key::MAX_BYTE_LENGTH + 1];
        assert_eq!(
            tree.insert(&ctx, &long, b"v"),
            Err(TreeError::KeyTooLong {
                len: Key::MAX_BYTE_LENGTH + 1,
                max: Key::MAX_BYTE_LENGTH
            })
        );
        tree.insert(&ctx, &long[1..], b"v").unwrap();
        assert_eq!(tree.get(&ctx, &long[1..]).unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn rounds_must_not_decrease() {
        let ctx = Context::background();
        let tree = tree();
        tree.insert(&ctx, b"k", b"v").unwrap();
        tree.commit(&ctx, 5).unwrap();
        assert_eq!(
            tree.commit(&ctx, 4),
            Err(TreeError::RoundNotMonotonic {
                current: 5,
                requested: 4
            })
        );
        assert_eq!(tree.commit(&ctx, 5).unwrap().round, 5);
    }

    #[test]
    fn rollback_discards_pending_writes() {
        let ctx = Context::background();
        let tree = tree();
        tree.insert(&ctx, b"k", b"v").unwrap();
        let root = tree.commit(&ctx, 1).unwrap();
        tree.insert(&ctx, b"x", b"y").unwrap();
        assert!(tree.is_dirty().unwrap());
        tree.rollback().unwrap();
        assert!(!tree.is_dirty().unwrap());
        assert_eq!(tree.get(&ctx, b"x").unwrap(), None);
        assert_eq!(tree.root().unwrap(), root);
    }

    #[test]
    fn sync_to_checks_namespace_and_cleanliness() {
        let ctx = Context::background();
        let tree = tree();
        tree.insert(&ctx, b"k", b"v").unwrap();
        let first = tree.commit(&ctx, 1).unwrap();
        tree.insert(&ctx, b"k2", b"v2").unwrap();
        let second = tree.commit(&ctx, 2).unwrap();

        tree.sync_to(first).unwrap();
        assert_eq!(tree.get(&ctx, b"k2").unwrap(), None);
        tree.sync_to(second).unwrap();
        assert_eq!(tree.get(&ctx, b"k2").unwrap(), Some(b"v2".to_vec()));

        let other = Root::new(Namespace::new([1; 32]), 1, first.hash);
        assert!(matches!(
            tree.sync_to(other),
            Err(TreeError::NamespaceMismatch { .. })
        ));
        tree.insert(&ctx, b"k3", b"v3").unwrap();
        assert_eq!(tree.sync_to(first), Err(TreeError::SyncerError(SyncerError::DirtyRoot)));
    }

    #[test]
    fn reinserting_the_same_value_keeps_the_tree_clean() {
        let ctx = Context::background();
        let tree = tree();
        tree.insert(&ctx, b"a", b"1").unwrap();
        tree.insert(&ctx, b"b", b"2").unwrap();
        tree.commit(&ctx, 1).unwrap();
        tree.insert(&ctx, b"a", b"1").unwrap();
        assert!(!tree.is_dirty().unwrap());
        assert!(!tree.remove(&ctx, b"missing").unwrap());
        assert!(!tree.is_dirty().unwrap());
    }

    #[test]
    #[should_panic]
    fn internal_node_in_leaf_slot_is_fatal() {
        let ctx = Context::background();
        let db = Arc::new(MemoryNodeDb::new());
        let bad = Node::from(InternalNode::new(
            Key::new(b"a".to_vec()).prefix(6),
            Pointer::Null,
            Pointer::Null,
            Pointer::Null,
        ));
        let root = Node::from(InternalNode::new(
            Key::new(b"a".to_vec()).prefix(6),
            Pointer::Clean(bad.hash()),
            Pointer::Null,
            Pointer::Null,
        ));
        let root_hash = root.hash();
        db.put_nodes(&[(bad.hash(), Arc::new(bad)), (root_hash, Arc::new(root))])
            .unwrap();
        let root = Root::new(Namespace::default(), 1, root_hash);
        let tree = Tree::open(db, root, MkvsConfig::default());
        let _ = tree.get_subtree(&ctx, &root, &NodeId::root(), 10);
    }
}
