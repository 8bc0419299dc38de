// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{
    node::{Hash, Node, Root},
    node_db::{NodeDb, NodeDbError},
};

/// Buffers writes in memory on top of another node database. Reads see the buffered writes first. Nothing reaches
/// the underlying database until [`OverlayNodeDb::flush`] is called.
pub(crate) struct OverlayNodeDb {
    nodes: RwLock<HashMap<Hash, Arc<Node>>>,
    roots: RwLock<Vec<Root>>,

    actual_db: Arc<dyn NodeDb>,
}

impl OverlayNodeDb {
    pub fn new(actual_db: Arc<dyn NodeDb>) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            roots: RwLock::new(Vec::new()),
            actual_db,
        }
    }

    /// Writes all buffered nodes, then all buffered roots, to the underlying database.
    pub fn flush(&self) -> Result<(), NodeDbError> {
        let nodes = self
            .nodes
            .read()
            .map_err(|_| NodeDbError::PoisonedAccess)?
            .iter()
            .map(|(hash, node)| (*hash, node.clone()))
            .collect::<Vec<_>>();
        self.actual_db.put_nodes(&nodes)?;
        let roots = self.roots.read().map_err(|_| NodeDbError::PoisonedAccess)?.clone();
        for root in &roots {
            self.actual_db.put_root(root)?;
        }
        Ok(())
    }
}

impl NodeDb for OverlayNodeDb {
    fn get_node(&self, hash: &Hash) -> Result<Option<Node>, NodeDbError> {
        let buffered = self
            .nodes
            .read()
            .map_err(|_| NodeDbError::PoisonedAccess)?
            .get(hash)
            .cloned();
        match buffered {
            Some(node) => Ok(Some(node.as_ref().clone())),
            None => self.actual_db.get_node(hash),
        }
    }

    fn put_nodes(&self, nodes: &[(Hash, Arc<Node>)]) -> Result<(), NodeDbError> {
        if nodes.iter().any(|(_, node)| !node.is_clean()) {
            return Err(NodeDbError::SerializationError("cannot store uncommitted nodes".to_string()));
        }
        self.nodes
            .write()
            .map_err(|_| NodeDbError::PoisonedAccess)?
            .extend(nodes.iter().cloned());
        Ok(())
    }

    fn put_root(&self, root: &Root) -> Result<(), NodeDbError> {
        self.roots.write().map_err(|_| NodeDbError::PoisonedAccess)?.push(*root);
        Ok(())
    }

    fn has_root(&self, root: &Root) -> Result<bool, NodeDbError> {
        if self.roots.read().map_err(|_| NodeDbError::PoisonedAccess)?.contains(root) {
            return Ok(true);
        }
        self.actual_db.has_root(root)
    }
}
