// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! Merkleized, versioned key-value store: synchronisation and proof extraction.
//!
//! A [`Tree`] is a compressed binary radix trie whose nodes are addressed by the hash of their content. Every
//! committed version of a namespace's tree is identified by a [`Root`]. Given a root, the tree can answer
//! "give me enough of the tree to verify key K" ([`Tree::get_path`]), "give me the subtree under this node"
//! ([`Tree::get_subtree`]) or "give me this raw node" ([`Tree::get_node`]) without shipping the whole dataset.
//!
//! Nodes that are not resident in memory are resolved lazily by the tree's node cache from a [`NodeDb`] and, if
//! configured, from a remote [`ReadSyncer`] (which may itself be another [`Tree`]).
//!
//! ```
//! use std::sync::Arc;
//!
//! use tari_mkvs::{Context, Key, MemoryNodeDb, MkvsConfig, Namespace, NodeId, Tree};
//!
//! let ctx = Context::background();
//! let tree = Tree::new(Arc::new(MemoryNodeDb::new()), Namespace::default(), MkvsConfig::default());
//! tree.insert(&ctx, b"moo", b"cow").unwrap();
//! tree.insert(&ctx, b"baa", b"sheep").unwrap();
//! let root = tree.commit(&ctx, 1).unwrap();
//!
//! let proof = tree.get_path(&ctx, &root, &Key::new(b"moo".to_vec()), 0).unwrap();
//! proof.verify(&root.hash).unwrap();
//!
//! let subtree = tree.get_subtree(&ctx, &root, &NodeId::root(), 10).unwrap();
//! assert_eq!(subtree.root_hash().unwrap(), root.hash);
//! ```

#![cfg_attr(not(debug_assertions), deny(unused_variables))]
#![cfg_attr(not(debug_assertions), deny(unused_imports))]
#![cfg_attr(not(debug_assertions), deny(dead_code))]
#![cfg_attr(not(debug_assertions), deny(unused_extern_crates))]
#![deny(unused_must_use)]
#![deny(unreachable_patterns)]
#![deny(unknown_lints)]

mod apply;
mod cache;
mod config;
mod context;
pub mod node;
pub mod node_db;
pub mod syncer;
mod tree;
mod write_log;

pub use apply::{ApplyBackend, LocalApplyBackend, ReceiptBody, RECEIPT_BODY_VERSION};
pub use config::MkvsConfig;
pub use context::{CancelReason, Context};
pub use node::{
    Depth,
    Hash,
    InternalNode,
    Key,
    KeyError,
    LeafNode,
    Namespace,
    Node,
    NodeId,
    Pointer,
    Root,
    Round,
    EMPTY_HASH,
};
pub use node_db::{MemoryNodeDb, NodeDb, NodeDbError};
pub use syncer::{
    InternalNodeSummary,
    NopReadSyncer,
    ReadSyncer,
    ReconstructedSubtree,
    Subtree,
    SubtreeEntry,
    SubtreeError,
    SubtreeIndex,
    SubtreePointer,
    SyncerError,
    INVALID_SUBTREE_INDEX,
};
pub use tree::{Tree, TreeError};
pub use write_log::{LogEntry, WriteLog};
