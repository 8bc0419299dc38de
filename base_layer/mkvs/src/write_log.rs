// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{collections::BTreeMap, slice};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// One mutation: set `key` to `value`, or remove `key` if `value` is `None`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct LogEntry {
    pub key: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

impl LogEntry {
    pub fn insert<K: Into<Vec<u8>>, V: Into<Vec<u8>>>(key: K, value: V) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn remove<K: Into<Vec<u8>>>(key: K) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn is_removal(&self) -> bool {
        self.value.is_none()
    }
}

/// An ordered batch of mutations. When a key appears more than once the later entry wins.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct WriteLog(Vec<LogEntry>);

impl WriteLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.0.push(entry);
    }

    pub fn insert<K: Into<Vec<u8>>, V: Into<Vec<u8>>>(&mut self, key: K, value: V) -> &mut Self {
        self.push(LogEntry::insert(key, value));
        self
    }

    pub fn remove<K: Into<Vec<u8>>>(&mut self, key: K) -> &mut Self {
        self.push(LogEntry::remove(key));
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, LogEntry> {
        self.0.iter()
    }

    /// The net effect of the log: one entry per key, sorted by key, holding the last write to that key.
    pub fn compacted(&self) -> WriteLog {
        let net = self
            .0
            .iter()
            .map(|entry| (entry.key.clone(), entry.value.clone()))
            .collect::<BTreeMap<_, _>>();
        net.into_iter().map(|(key, value)| LogEntry { key, value }).collect()
    }
}

impl FromIterator<LogEntry> for WriteLog {
    fn from_iter<T: IntoIterator<Item = LogEntry>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<LogEntry>> for WriteLog {
    fn from(entries: Vec<LogEntry>) -> Self {
        Self(entries)
    }
}

impl<'a> IntoIterator for &'a WriteLog {
    type IntoIter = slice::Iter<'a, LogEntry>;
    type Item = &'a LogEntry;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn later_entries_win() {
        let mut log = WriteLog::new();
        log.insert("b", "1").insert("a", "2").remove("b").insert("a", "3");
        assert_eq!(log.len(), 4);
        let compacted = log.compacted();
        assert_eq!(
            compacted,
            WriteLog::from(vec![LogEntry::insert("a", "3"), LogEntry::remove("b")])
        );
        assert!(compacted.iter().nth(1).unwrap().is_removal());
    }

    #[test]
    fn encoding() {
        let log: WriteLog = vec![LogEntry::insert("k", "v"), LogEntry::remove("x")].into_iter().collect();
        let bytes = borsh::to_vec(&log).unwrap();
        assert_eq!(borsh::from_slice::<WriteLog>(&bytes).unwrap(), log);
    }
}
