// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    fmt,
    fmt::{Debug, Display, Formatter},
};

use blake2::Blake2b;
use borsh::{BorshDeserialize, BorshSerialize};
use digest::{consts::U32, Digest};
use serde::{Deserialize, Serialize};
use tari_crypto::{hash_domain, hashing::DomainSeparatedHasher};
use tari_utilities::hex::to_hex;

hash_domain!(MkvsNodeHashDomain, "com.tari.base_layer.mkvs.node", 1);

/// The hash of an absent subtree, and therefore also the root hash of an empty tree.
pub const EMPTY_HASH: Hash = Hash([0u8; 32]);

/// A 32-byte digest identifying the content of a node (and, transitively, of its whole subtree).
#[derive(
    Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord,
    BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn is_empty(&self) -> bool {
        *self == EMPTY_HASH
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        to_hex(&self.0)
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

/// Incremental, domain separated hasher used for all node hashes.
pub(crate) struct NodeHasher<D> {
    digest: D,
}

impl NodeHasher<DomainSeparatedHasher<Blake2b<U32>, MkvsNodeHashDomain>> {
    pub fn new(label: &'static str) -> Self {
        Self {
            digest: DomainSeparatedHasher::new_with_label(label),
        }
    }
}

impl<D> NodeHasher<D>
where D: Digest<OutputSize = U32>
{
    pub fn chain<T: AsRef<[u8]>>(mut self, data: T) -> Self {
        self.digest.update(data);
        self
    }

    pub fn finalize(self) -> Hash {
        Hash(self.digest.finalize().into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn labels_separate_domains() {
        let leaf = NodeHasher::new("leaf").chain(b"data").finalize();
        let internal = NodeHasher::new("internal").chain(b"data").finalize();
        assert_ne!(leaf, internal);
        assert_eq!(leaf, NodeHasher::new("leaf").chain(b"data").finalize());
        assert!(!leaf.is_empty());
    }

    #[test]
    fn display_is_hex() {
        let hash = Hash::new([0xab; 32]);
        assert_eq!(hash.to_string(), "ab".repeat(32));
        assert!(EMPTY_HASH.is_empty());
    }
}
