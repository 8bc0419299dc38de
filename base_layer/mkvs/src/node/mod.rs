// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! The node model of the tree.
//!
//! The tree is a binary radix trie with path compression. An [`InternalNode`] carries a `label`: the run of bits
//! shared by everything below it, starting at the bit position where the node sits. The first bit of the label of
//! any non-root node is the direction bit taken from its parent (0 = left, 1 = right), so every non-root internal
//! node has a label of at least one bit. A key that ends exactly where a label ends is stored in the branch's
//! colocated `leaf_node` slot instead of forcing an extra level.
//!
//! Children are held through [`Pointer`]s. A clean pointer only knows the hash of the subtree it points at and is
//! resolved through the cache; a dirty pointer owns uncommitted content.

mod hash;
mod key;

use std::{
    fmt,
    fmt::{Display, Formatter},
    io,
    sync::Arc,
};

use borsh::{BorshDeserialize, BorshSerialize};
pub(crate) use hash::NodeHasher;
pub use hash::{Hash, EMPTY_HASH};
pub use key::{Depth, Key, KeyError};
use serde::{Deserialize, Serialize};
use tari_utilities::hex::to_hex;

/// A monotonically increasing version number of a namespace's tree.
pub type Round = u64;

/// Opaque identifier partitioning independent trees that share one store.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Namespace([u8; 32]);

impl Namespace {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Namespace {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({})", to_hex(&self.0))
    }
}

/// One immutable, fully committed version of one namespace's tree. Two roots are equal iff all fields match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Root {
    pub namespace: Namespace,
    pub round: Round,
    pub hash: Hash,
}

impl Root {
    pub fn new(namespace: Namespace, round: Round, hash: Hash) -> Self {
        Self { namespace, round, hash }
    }

    /// The root of the empty tree of `namespace` at `round`.
    pub fn empty(namespace: Namespace, round: Round) -> Self {
        Self::new(namespace, round, EMPTY_HASH)
    }

    pub fn is_empty(&self) -> bool {
        self.hash.is_empty()
    }
}

impl Display for Root {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.hash, self.round)
    }
}

/// Addresses a node by the bit path from the root, truncated to `bit_depth` bits.
///
/// The id `{path, d}` addresses the node whose label covers bit position `d`, i.e. the node sitting at `bd` with a
/// label of length `l` such that `bd < d <= bd + l`. The root additionally answers `d == 0`. Because labels are
/// compressed, several ids may resolve to the same node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct NodeId {
    pub path: Key,
    pub bit_depth: Depth,
}

impl NodeId {
    pub fn new(path: Key, bit_depth: Depth) -> Self {
        Self { path, bit_depth }
    }

    pub fn root() -> Self {
        Self::default()
    }

    /// The id of the child sitting at `bit_depth` on the side given by `path`'s bit at that position.
    pub(crate) fn child(path: &Key, bit_depth: Depth, right: bool) -> Self {
        Self::new(path.append_bit(bit_depth, right), bit_depth + 1)
    }

    /// The id of the branch whose label ends at `bit_depth`, used to reach its colocated leaf.
    pub(crate) fn branch(path: &Key, bit_depth: Depth) -> Self {
        Self::new(path.prefix(bit_depth), bit_depth)
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.path.prefix(self.bit_depth), self.bit_depth)
    }
}

/// An ownership cell held by a parent node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Pointer {
    /// No child here.
    #[default]
    Null,
    /// Committed content, identified by the hash of the subtree only. Safe to evict and refetch.
    Clean(Hash),
    /// Uncommitted local content. Must stay resident until committed.
    Dirty(Arc<Node>),
}

impl Pointer {
    pub fn dirty(node: Node) -> Self {
        Pointer::Dirty(Arc::new(node))
    }

    /// A clean pointer to `hash`, or `Null` for the empty hash.
    pub fn from_hash(hash: Hash) -> Self {
        if hash.is_empty() {
            Pointer::Null
        } else {
            Pointer::Clean(hash)
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Pointer::Null)
    }

    pub fn is_clean(&self) -> bool {
        !matches!(self, Pointer::Dirty(_))
    }

    /// The hash of the subtree this pointer refers to. Dirty content is hashed recursively.
    pub fn hash(&self) -> Hash {
        match self {
            Pointer::Null => EMPTY_HASH,
            Pointer::Clean(hash) => *hash,
            Pointer::Dirty(node) => node.hash(),
        }
    }
}

// Only clean pointers are part of the encoding; an absent child encodes as the empty hash.
impl BorshSerialize for Pointer {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Pointer::Null => BorshSerialize::serialize(&EMPTY_HASH, writer),
            Pointer::Clean(hash) => BorshSerialize::serialize(hash, writer),
            Pointer::Dirty(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "mkvs: cannot encode a dirty pointer",
            )),
        }
    }
}

impl BorshDeserialize for Pointer {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        Ok(Pointer::from_hash(Hash::deserialize_reader(reader)?))
    }
}

/// A branch point of the trie.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct InternalNode {
    /// The compressed run of bits shared by everything below this node, relative to where the node sits.
    pub label: Key,
    /// A leaf whose key ends exactly where the label ends.
    pub leaf_node: Pointer,
    pub left: Pointer,
    pub right: Pointer,
}

impl InternalNode {
    pub fn new(label: Key, leaf_node: Pointer, left: Pointer, right: Pointer) -> Self {
        Self {
            label,
            leaf_node,
            left,
            right,
        }
    }

    pub fn label_bit_length(&self) -> Depth {
        self.label.bit_length()
    }

    pub fn is_clean(&self) -> bool {
        self.leaf_node.is_clean() && self.left.is_clean() && self.right.is_clean()
    }

    pub fn hash(&self) -> Hash {
        NodeHasher::new("internal")
            .chain(self.label.bit_length().to_le_bytes())
            .chain(self.label.as_bytes())
            .chain(self.leaf_node.hash())
            .chain(self.left.hash())
            .chain(self.right.hash())
            .finalize()
    }
}

/// A full key and its value. Always a terminal in traversal.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct LeafNode {
    pub key: Key,
    pub value: Vec<u8>,
}

impl LeafNode {
    pub fn new(key: Key, value: Vec<u8>) -> Self {
        Self { key, value }
    }

    pub fn hash(&self) -> Hash {
        NodeHasher::new("leaf")
            .chain(self.key.bit_length().to_le_bytes())
            .chain(self.key.as_bytes())
            .chain((self.value.len() as u32).to_le_bytes())
            .chain(&self.value)
            .finalize()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Node {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl Node {
    /// Recomputes the content hash of this node. Hashes reported by untrusted sources must be checked against this.
    pub fn hash(&self) -> Hash {
        match self {
            Node::Internal(n) => n.hash(),
            Node::Leaf(n) => n.hash(),
        }
    }

    pub fn is_clean(&self) -> bool {
        match self {
            Node::Internal(n) => n.is_clean(),
            Node::Leaf(_) => true,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn as_internal(&self) -> Option<&InternalNode> {
        match self {
            Node::Internal(n) => Some(n),
            Node::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&LeafNode> {
        match self {
            Node::Leaf(n) => Some(n),
            Node::Internal(_) => None,
        }
    }
}

impl From<InternalNode> for Node {
    fn from(node: InternalNode) -> Self {
        Node::Internal(node)
    }
}

impl From<LeafNode> for Node {
    fn from(node: LeafNode) -> Self {
        Node::Leaf(node)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn leaf(key: &[u8], value: &[u8]) -> LeafNode {
        LeafNode::new(Key::from(key), value.to_vec())
    }

    #[test]
    fn leaf_hash_commits_to_key_and_value() {
        let a = leaf(b"a", b"1");
        assert_eq!(a.hash(), leaf(b"a", b"1").hash());
        assert_ne!(a.hash(), leaf(b"a", b"2").hash());
        assert_ne!(a.hash(), leaf(b"b", b"1").hash());
        // A key prefix must not collide with a shorter key holding the rest in its value
        assert_ne!(leaf(b"ab", b"").hash(), leaf(b"a", b"b").hash());
    }

    #[test]
    fn dirty_pointers_hash_like_their_committed_form() {
        let a = leaf(b"a", b"1");
        let b = leaf(b"b", b"2");
        let dirty = InternalNode::new(
            Key::new(vec![0x60]).prefix(6),
            Pointer::Null,
            Pointer::dirty(a.clone().into()),
            Pointer::dirty(b.clone().into()),
        );
        let clean = InternalNode::new(
            dirty.label.clone(),
            Pointer::Null,
            Pointer::Clean(a.hash()),
            Pointer::Clean(b.hash()),
        );
        assert!(!dirty.is_clean());
        assert!(clean.is_clean());
        assert_eq!(dirty.hash(), clean.hash());
        assert_eq!(Pointer::dirty(dirty.into()).hash(), clean.hash());
    }

    #[test]
    fn encoding_round_trips_and_refuses_dirty_content() {
        let node = Node::Internal(InternalNode::new(
            Key::new(vec![0xf0]).prefix(3),
            Pointer::Clean(leaf(b"x", b"y").hash()),
            Pointer::Null,
            Pointer::Clean(Hash::new([7; 32])),
        ));
        let encoded = borsh::to_vec(&node).unwrap();
        assert_eq!(borsh::from_slice::<Node>(&encoded).unwrap(), node);

        let dirty = Node::Internal(InternalNode::new(
            Key::empty(),
            Pointer::Null,
            Pointer::dirty(leaf(b"x", b"y").into()),
            Pointer::Null,
        ));
        assert!(borsh::to_vec(&dirty).is_err());
    }

    #[test]
    fn pointers_encode_as_their_hash() {
        let null = borsh::to_vec(&Pointer::Null).unwrap();
        assert_eq!(null, vec![0u8; 32]);
        assert_eq!(borsh::from_slice::<Pointer>(&null).unwrap(), Pointer::Null);

        let hash = Hash::new([9; 32]);
        let clean = borsh::to_vec(&Pointer::Clean(hash)).unwrap();
        assert_eq!(clean, borsh::to_vec(&hash).unwrap());
        assert_eq!(borsh::from_slice::<Pointer>(&clean).unwrap(), Pointer::Clean(hash));

        assert!(borsh::to_vec(&Pointer::dirty(leaf(b"x", b"y").into())).is_err());
    }

    #[test]
    fn node_ids() {
        let path = Key::new(vec![0b1010_0000]);
        assert_eq!(NodeId::child(&path, 2, false), NodeId::new(Key::new(vec![0b1000_0000]).prefix(3), 3));
        assert_eq!(NodeId::branch(&path, 4), NodeId::new(path.prefix(4), 4));
        assert_eq!(NodeId::root().bit_depth, 0);
    }
}
