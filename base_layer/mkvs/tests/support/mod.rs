// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tari_mkvs::{
    Context,
    Hash,
    Key,
    MemoryNodeDb,
    MkvsConfig,
    Namespace,
    Node,
    NodeDb,
    NodeDbError,
    Root,
    Subtree,
    SubtreeEntry,
    Tree,
};
use tokio_util::sync::CancellationToken;

pub fn namespace() -> Namespace {
    Namespace::new([0x42; 32])
}

/// A committed tree holding `pairs`, together with its node database and root.
pub fn committed_tree(pairs: &[(&str, &str)]) -> (Tree, Arc<MemoryNodeDb>, Root) {
    let ctx = Context::background();
    let db = Arc::new(MemoryNodeDb::new());
    let tree = Tree::new(db.clone(), namespace(), MkvsConfig::default());
    for (key, value) in pairs {
        tree.insert(&ctx, key.as_bytes(), value.as_bytes()).unwrap();
    }
    let root = tree.commit(&ctx, 1).unwrap();
    (tree, db, root)
}

pub fn key(s: &str) -> Key {
    Key::new(s.as_bytes().to_vec())
}

/// `count` distinct random keys of 1 to 8 bytes, with values derived from their position.
pub fn random_pairs(seed: u64, count: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(count);
    while pairs.len() < count {
        let len = rng.gen_range(1..=8);
        let key: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        if pairs.iter().any(|(k, _)| *k == key) {
            continue;
        }
        let value = format!("value-{}", pairs.len()).into_bytes();
        pairs.push((key, value));
    }
    pairs
}

/// Counts the summaries visited when walking a fully decomposed proof towards `key`.
pub fn summaries_on_path(full: &Subtree, key: &Key) -> usize {
    let mut count = 0;
    let mut ptr = full.root();
    let mut bit_depth = 0;
    while let Some(index) = ptr.target() {
        let summary = match &full.entries()[index] {
            SubtreeEntry::Summary(summary) => summary,
            SubtreeEntry::Full(_) => break,
        };
        count += 1;
        if !key.matches_at(bit_depth, &summary.label) {
            break;
        }
        let end = bit_depth + summary.label.bit_length();
        if key.bit_length() == end {
            break;
        }
        ptr = if key.get_bit(end) { summary.right } else { summary.left };
        bit_depth = end;
    }
    count
}

/// Checks that every summary of `proof` has at most one summarised child, and that colocated leaves are full.
pub fn assert_single_path(proof: &Subtree) {
    for summary in proof.summaries() {
        assert!(summary.leaf_node.is_absent() || summary.leaf_node.full);
        let summarised = [summary.left, summary.right]
            .iter()
            .filter(|p| p.target().is_some() && !p.full)
            .count();
        assert!(summarised <= 1, "proof branches into {} summaries", summarised);
    }
}

/// Every full entry that is a leaf.
pub fn leaf_entries(proof: &Subtree) -> usize {
    proof.full_nodes().filter(|n| n.is_leaf()).count()
}

/// A node database that counts reads and can fire a cancellation once a number of reads has happened.
pub struct CountingNodeDb {
    inner: Arc<MemoryNodeDb>,
    reads: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl CountingNodeDb {
    pub fn new(inner: Arc<MemoryNodeDb>) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            cancel_after: None,
        }
    }

    pub fn cancelling_after(inner: Arc<MemoryNodeDb>, reads: usize, token: CancellationToken) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            cancel_after: Some((reads, token)),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl NodeDb for CountingNodeDb {
    fn get_node(&self, hash: &Hash) -> Result<Option<Node>, NodeDbError> {
        let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after {
            if reads >= *limit {
                token.cancel();
            }
        }
        self.inner.get_node(hash)
    }

    fn put_nodes(&self, nodes: &[(Hash, Arc<Node>)]) -> Result<(), NodeDbError> {
        self.inner.put_nodes(nodes)
    }

    fn put_root(&self, root: &Root) -> Result<(), NodeDbError> {
        self.inner.put_root(root)
    }

    fn has_root(&self, root: &Root) -> Result<bool, NodeDbError> {
        self.inner.has_root(root)
    }
}
