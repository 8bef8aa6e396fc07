//! Per-user transaction log: the synchronization substrate.
//!
//! The log maps each relative path to an append-only list of entries. It is
//! serialized as a whole and stored in the DHT like any other resource, keyed
//! by `EncodedPublicKey::txlog_id`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Identifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEntry {
    pub operation: Operation,
    pub client_id: Identifier,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEntity {
    pub resource_name: String,
    pub resource_id: Identifier,
    pub entries: Vec<TransactionEntry>,
}

impl TransactionEntity {
    /// Entry with the maximum timestamp. On ties the later entry in list
    /// order wins, so a reconciling client converges on the entry appended
    /// last.
    pub fn latest_entry(&self) -> Option<&TransactionEntry> {
        let mut latest: Option<&TransactionEntry> = None;
        for entry in &self.entries {
            if latest.is_none_or(|last| entry.timestamp >= last.timestamp) {
                latest = Some(entry);
            }
        }
        latest
    }
}

/// Map from relative path to the history of operations on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLog(pub BTreeMap<String, TransactionEntity>);

impl TransactionLog {
    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&TransactionEntity> {
        self.0.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TransactionEntity)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends an entry for `path`, creating the entity on first touch.
    pub fn append(&mut self, path: &str, operation: Operation, client_id: Identifier, timestamp: u64) {
        self.0
            .entry(path.to_owned())
            .or_insert_with(|| TransactionEntity {
                resource_name: path.to_owned(),
                resource_id: Identifier::resource_id(path),
                entries: Vec::new(),
            })
            .entries
            .push(TransactionEntry {
                operation,
                client_id,
                timestamp,
            });
    }
}
