// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};

use crate::node::Key;

const MAX_VALUE_LENGTH: usize = u32::MAX as usize;

/// Configuration of a [`Tree`](crate::Tree) and its node cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct MkvsConfig {
    /// The maximum number of committed nodes the cache keeps resident. Evicted nodes are re-read from the node
    /// database (or the remote read syncer) on demand. 0 disables the bound.
    pub max_resident_nodes: usize,
    /// The maximum key length in bytes accepted by the write path.
    pub max_key_size: usize,
    /// The maximum value length in bytes accepted by the write path. Never more than `u32::MAX`.
    pub max_value_size: usize,
    /// Store nodes fetched from the remote read syncer in the local node database.
    pub persist_fetched_nodes: bool,
    /// When resolving a missing node remotely, ask for the path towards the key being looked up rather than only
    /// the path to the node itself.
    pub remote_prefetch: bool,
}

impl Default for MkvsConfig {
    fn default() -> Self {
        Self {
            max_resident_nodes: 65_536,
            max_key_size: 1024,
            max_value_size: 1024 * 1024,
            persist_fetched_nodes: true,
            remote_prefetch: true,
        }
    }
}

impl MkvsConfig {
    pub const fn main_key_prefix() -> &'static str {
        "storage.mkvs"
    }

    /// Loads the configuration from the `storage.mkvs` section of `config`, using the defaults when the section is
    /// absent.
    pub fn load_from(config: &Config) -> Result<Self, ConfigError> {
        match config.get::<Self>(Self::main_key_prefix()) {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// The effective key size limit. Keys longer than [`Key::MAX_BYTE_LENGTH`] cannot be addressed bitwise.
    pub fn effective_max_key_size(&self) -> usize {
        self.max_key_size.min(Key::MAX_BYTE_LENGTH)
    }

    /// The effective value size limit. Leaf hashes commit to the value length as a `u32`.
    pub fn effective_max_value_size(&self) -> usize {
        self.max_value_size.min(MAX_VALUE_LENGTH)
    }
}
