// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use crate::{
    node::{Hash, Node, Root},
    node_db::{NodeDb, NodeDbError},
};

/// A node database that keeps borsh encoded nodes in a `HashMap` guarded by a `RwLock`. Nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryNodeDb {
    nodes: RwLock<HashMap<Hash, Vec<u8>>>,
    roots: RwLock<HashSet<Root>>,
}

impl MemoryNodeDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of stored nodes.
    pub fn len(&self) -> Result<usize, NodeDbError> {
        Ok(self.nodes.read().map_err(|_| NodeDbError::PoisonedAccess)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, NodeDbError> {
        Ok(self.len()? == 0)
    }

    pub fn contains_node(&self, hash: &Hash) -> Result<bool, NodeDbError> {
        Ok(self
            .nodes
            .read()
            .map_err(|_| NodeDbError::PoisonedAccess)?
            .contains_key(hash))
    }

    /// Drops a stored node. Returns whether it was present.
    pub fn remove_node(&self, hash: &Hash) -> Result<bool, NodeDbError> {
        Ok(self
            .nodes
            .write()
            .map_err(|_| NodeDbError::PoisonedAccess)?
            .remove(hash)
            .is_some())
    }

    /// Overwrites the raw encoding stored under `hash`.
    pub fn put_raw(&self, hash: Hash, encoded: Vec<u8>) -> Result<(), NodeDbError> {
        self.nodes
            .write()
            .map_err(|_| NodeDbError::PoisonedAccess)?
            .insert(hash, encoded);
        Ok(())
    }
}

impl NodeDb for MemoryNodeDb {
    fn get_node(&self, hash: &Hash) -> Result<Option<Node>, NodeDbError> {
        match self.nodes.read().map_err(|_| NodeDbError::PoisonedAccess)?.get(hash) {
            Some(buf) => borsh::from_slice(buf)
                .map(Some)
                .map_err(|e| NodeDbError::DeserializationError(e.to_string())),
            None => Ok(None),
        }
    }

    fn put_nodes(&self, nodes: &[(Hash, Arc<Node>)]) -> Result<(), NodeDbError> {
        let encoded = nodes
            .iter()
            .map(|(hash, node)| {
                borsh::to_vec(node.as_ref())
                    .map(|buf| (*hash, buf))
                    .map_err(|e| NodeDbError::SerializationError(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.nodes
            .write()
            .map_err(|_| NodeDbError::PoisonedAccess)?
            .extend(encoded);
        Ok(())
    }

    fn put_root(&self, root: &Root) -> Result<(), NodeDbError> {
        self.roots.write().map_err(|_| NodeDbError::PoisonedAccess)?.insert(*root);
        Ok(())
    }

    fn has_root(&self, root: &Root) -> Result<bool, NodeDbError> {
        Ok(self.roots.read().map_err(|_| NodeDbError::PoisonedAccess)?.contains(root))
    }
}
