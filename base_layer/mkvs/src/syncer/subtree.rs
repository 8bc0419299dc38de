// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! The proof container produced by the read syncer.
//!
//! A [`Subtree`] is an append-only list of entries. Each entry is either a full node, shipped verbatim, or the
//! summary of an internal node whose children are referenced by their index in the same list. Entries are appended
//! in post-order: every child is added before the summary that references it, so a pointer inside entry `i` always
//! refers to an index below `i` and the root pointer refers to the last entry. A verifier can therefore replay the
//! list front to back, re-deriving every hash from content.

use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    node::{Depth, Hash, InternalNode, Key, Node, Pointer, EMPTY_HASH},
    syncer::SubtreeError,
};

pub type SubtreeIndex = u16;

/// The index of a pointer that references no entry.
pub const INVALID_SUBTREE_INDEX: SubtreeIndex = 0xffff;

/// A reference from one proof entry to another.
///
/// Only three forms are ever emitted:
/// * absent: `{INVALID_SUBTREE_INDEX, full: false, valid: true}`, the child provably does not exist;
/// * full: `{i, full: true, valid: true}`, entry `i` holds the verbatim node;
/// * summary: `{i, full: false, valid: true}`, entry `i` holds an [`InternalNodeSummary`].
///
/// `valid: false` marks a pointer as unresolved in this proof. It is rejected by [`Subtree::validate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct SubtreePointer {
    pub index: SubtreeIndex,
    pub full: bool,
    pub valid: bool,
}

impl SubtreePointer {
    pub const fn absent() -> Self {
        Self {
            index: INVALID_SUBTREE_INDEX,
            full: false,
            valid: true,
        }
    }

    pub const fn full(index: SubtreeIndex) -> Self {
        Self {
            index,
            full: true,
            valid: true,
        }
    }

    pub const fn summary(index: SubtreeIndex) -> Self {
        Self {
            index,
            full: false,
            valid: true,
        }
    }

    pub const fn unresolved() -> Self {
        Self {
            index: INVALID_SUBTREE_INDEX,
            full: false,
            valid: false,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.valid && self.index == INVALID_SUBTREE_INDEX
    }

    /// The entry this pointer references, if any.
    pub fn target(&self) -> Option<usize> {
        if self.valid && self.index != INVALID_SUBTREE_INDEX {
            Some(self.index as usize)
        } else {
            None
        }
    }
}

impl Default for SubtreePointer {
    fn default() -> Self {
        Self::unresolved()
    }
}

/// An internal node with its children replaced by proof-local references.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct InternalNodeSummary {
    pub label: Key,
    pub leaf_node: SubtreePointer,
    pub left: SubtreePointer,
    pub right: SubtreePointer,
}

impl InternalNodeSummary {
    pub fn label_bit_length(&self) -> Depth {
        self.label.bit_length()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum SubtreeEntry {
    Summary(InternalNodeSummary),
    Full(Node),
}

impl SubtreeEntry {
    pub fn is_full(&self) -> bool {
        matches!(self, SubtreeEntry::Full(_))
    }
}

/// Every node of a proof, re-derived from the proof's content.
#[derive(Clone, Debug)]
pub struct ReconstructedSubtree {
    pub root_hash: Hash,
    /// Clean nodes keyed by their recomputed hashes, in emission order.
    pub nodes: Vec<(Hash, Arc<Node>)>,
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct Subtree {
    root: SubtreePointer,
    entries: Vec<SubtreeEntry>,
}

impl Default for Subtree {
    fn default() -> Self {
        Self::new()
    }
}

impl Subtree {
    pub fn new() -> Self {
        Self {
            root: SubtreePointer::unresolved(),
            entries: Vec::new(),
        }
    }

    pub fn root(&self) -> SubtreePointer {
        self.root
    }

    pub fn set_root(&mut self, root: SubtreePointer) {
        self.root = root;
    }

    pub fn entries(&self) -> &[SubtreeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summaries(&self) -> impl Iterator<Item = &InternalNodeSummary> {
        self.entries.iter().filter_map(|e| match e {
            SubtreeEntry::Summary(s) => Some(s),
            SubtreeEntry::Full(_) => None,
        })
    }

    pub fn full_nodes(&self) -> impl Iterator<Item = &Node> {
        self.entries.iter().filter_map(|e| match e {
            SubtreeEntry::Full(n) => Some(n),
            SubtreeEntry::Summary(_) => None,
        })
    }

    /// Appends a verbatim node and returns its index. The node must not hold uncommitted children.
    pub fn add_full_node(&mut self, node: Node) -> Result<SubtreeIndex, SubtreeError> {
        if !node.is_clean() {
            return Err(SubtreeError::DirtyNode);
        }
        self.push(SubtreeEntry::Full(node))
    }

    /// Appends a summary and returns its index.
    pub fn add_summary(&mut self, summary: InternalNodeSummary) -> Result<SubtreeIndex, SubtreeError> {
        self.push(SubtreeEntry::Summary(summary))
    }

    fn push(&mut self, entry: SubtreeEntry) -> Result<SubtreeIndex, SubtreeError> {
        let index = self.entries.len();
        if index >= INVALID_SUBTREE_INDEX as usize {
            return Err(SubtreeError::TooManyEntries);
        }
        self.entries.push(entry);
        Ok(index as SubtreeIndex)
    }

    /// Checks the structure of the proof: every pointer is in one of the three canonical forms, references an
    /// earlier entry of the right kind, every entry is referenced exactly once and colocated leaf slots hold leaves.
    pub fn validate(&self) -> Result<(), SubtreeError> {
        let mut refs = vec![0usize; self.entries.len()];
        for (i, entry) in self.entries.iter().enumerate() {
            if let SubtreeEntry::Summary(summary) = entry {
                if let Some(leaf) = self.check_pointer(i, &summary.leaf_node, i, &mut refs)? {
                    if !matches!(self.entries[leaf], SubtreeEntry::Full(Node::Leaf(_))) {
                        return Err(SubtreeError::MalformedLeafSlot { entry: i });
                    }
                }
                self.check_pointer(i, &summary.left, i, &mut refs)?;
                self.check_pointer(i, &summary.right, i, &mut refs)?;
            }
        }
        let n = self.entries.len();
        self.check_pointer(n, &self.root, n, &mut refs)?;
        match refs.iter().enumerate().find(|(_, count)| **count != 1) {
            Some((index, count)) => Err(SubtreeError::BadReferenceCount { index, count: *count }),
            None => Ok(()),
        }
    }

    fn check_pointer(
        &self,
        entry: usize,
        ptr: &SubtreePointer,
        limit: usize,
        refs: &mut [usize],
    ) -> Result<Option<usize>, SubtreeError> {
        if !ptr.valid {
            return Err(SubtreeError::UnresolvedPointer { entry });
        }
        if ptr.index == INVALID_SUBTREE_INDEX {
            if ptr.full {
                return Err(SubtreeError::NonCanonicalPointer { entry });
            }
            return Ok(None);
        }
        let index = ptr.index as usize;
        if index >= limit {
            return Err(SubtreeError::DanglingIndex {
                entry,
                index: ptr.index,
            });
        }
        if self.entries[index].is_full() != ptr.full {
            return Err(SubtreeError::EntryKindMismatch {
                entry,
                index: ptr.index,
            });
        }
        refs[index] += 1;
        Ok(Some(index))
    }

    /// Validates the proof and re-derives every node in it, bottom-up.
    pub fn reconstruct(&self) -> Result<ReconstructedSubtree, SubtreeError> {
        self.validate()?;
        let mut nodes: Vec<(Hash, Arc<Node>)> = Vec::with_capacity(self.entries.len());
        let hash_of = |nodes: &[(Hash, Arc<Node>)], ptr: &SubtreePointer| match ptr.target() {
            Some(index) => nodes[index].0,
            None => EMPTY_HASH,
        };
        for entry in &self.entries {
            let node = match entry {
                SubtreeEntry::Full(node) => node.clone(),
                SubtreeEntry::Summary(summary) => Node::Internal(InternalNode::new(
                    summary.label.clone(),
                    Pointer::from_hash(hash_of(&nodes, &summary.leaf_node)),
                    Pointer::from_hash(hash_of(&nodes, &summary.left)),
                    Pointer::from_hash(hash_of(&nodes, &summary.right)),
                )),
            };
            nodes.push((node.hash(), Arc::new(node)));
        }
        let root_hash = hash_of(&nodes, &self.root);
        Ok(ReconstructedSubtree { root_hash, nodes })
    }

    /// The hash of the (sub)tree this proof commits to.
    pub fn root_hash(&self) -> Result<Hash, SubtreeError> {
        Ok(self.reconstruct()?.root_hash)
    }

    pub fn verify(&self, expected: &Hash) -> Result<(), SubtreeError> {
        let actual = self.root_hash()?;
        if actual != *expected {
            return Err(SubtreeError::RootHashMismatch {
                expected: *expected,
                actual,
            });
        }
        Ok(())
    }

    /// Looks `key` up in a proof rooted at the top of the tree (bit depth 0).
    ///
    /// Returns the value if the proof shows the key is present, `None` if it shows the key is absent and
    /// [`SubtreeError::Incomplete`] if the proof does not reach far enough to decide. The proof must be verified
    /// against a trusted root hash first.
    pub fn lookup(&self, key: &Key) -> Result<Option<&[u8]>, SubtreeError> {
        self.validate()?;
        let mut ptr = self.root;
        let mut bit_depth: Depth = 0;
        loop {
            let index = match ptr.target() {
                Some(index) => index,
                None => return Ok(None),
            };
            match &self.entries[index] {
                SubtreeEntry::Full(Node::Leaf(leaf)) => {
                    return Ok((leaf.key == *key).then(|| leaf.value.as_slice()));
                },
                SubtreeEntry::Full(Node::Internal(node)) => {
                    if !key.matches_at(bit_depth, &node.label) {
                        return Ok(None);
                    }
                    let end = bit_depth + node.label.bit_length();
                    let next = if key.bit_length() == end {
                        &node.leaf_node
                    } else if key.get_bit(end) {
                        &node.right
                    } else {
                        &node.left
                    };
                    return if next.is_null() {
                        Ok(None)
                    } else {
                        Err(SubtreeError::Incomplete)
                    };
                },
                SubtreeEntry::Summary(summary) => {
                    if !key.matches_at(bit_depth, &summary.label) {
                        return Ok(None);
                    }
                    let end = bit_depth + summary.label.bit_length();
                    if key.bit_length() == end {
                        ptr = summary.leaf_node;
                    } else {
                        ptr = if key.get_bit(end) { summary.right } else { summary.left };
                        bit_depth = end;
                    }
                },
            }
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SubtreeError> {
        borsh::to_vec(self).map_err(|e| SubtreeError::EncodingError(e.to_string()))
    }

    /// Decodes and validates a proof. Trailing bytes are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SubtreeError> {
        let subtree: Subtree = borsh::from_slice(bytes).map_err(|e| SubtreeError::DecodingError(e.to_string()))?;
        subtree.validate()?;
        Ok(subtree)
    }
}
