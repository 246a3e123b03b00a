use crate::timestamp::Timestamp;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Reason reported when a write loses to the record already stored.
pub const STALE_TIMESTAMP: &str = "stale_timestamp";

/// A value together with the timestamp it was written at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub value: String,
    pub timestamp: Timestamp,
}

/// Result of offering a write to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PutOutcome {
    Applied,
    /// The stored record has an equal or newer timestamp, nothing changed.
    Stale,
}

impl PutOutcome {
    pub fn applied(self) -> bool {
        matches!(self, PutOutcome::Applied)
    }

    pub fn reason(self) -> Option<&'static str> {
        match self {
            PutOutcome::Applied => None,
            PutOutcome::Stale => Some(STALE_TIMESTAMP),
        }
    }
}

/// An in-memory key-value store with last-writer-wins merging.
///
/// This is the only conflict-resolution policy in the system: the leader's
/// local writes and the follower's replicated writes both go through
/// [`KvStore::put`]. Cloning is cheap and clones share the same data.
#[derive(Clone, Debug, Default)]
pub struct KvStore {
    /// Keydir maps keys to their current record.
    ///
    /// This uses [`DashMap`] to allow for concurrent reads and writes, the
    /// entry API holds the shard lock across the timestamp comparison.
    keydir: Arc<DashMap<String, Record>>,
}

impl KvStore {
    pub fn new() -> KvStore {
        KvStore::default()
    }

    /// Offer `value` at `timestamp` for `key`.
    ///
    /// Absent keys are inserted. Present keys are replaced only when the new
    /// timestamp is strictly greater; ties keep the first writer.
    pub fn put(&self, key: String, value: String, timestamp: Timestamp) -> PutOutcome {
        match self.keydir.entry(key) {
            Entry::Occupied(mut entry) => {
                if timestamp > entry.get().timestamp {
                    debug!(key = entry.key(), %timestamp, "Replacing record");
                    entry.insert(Record { value, timestamp });
                    PutOutcome::Applied
                } else {
                    debug!(
                        key = entry.key(),
                        %timestamp,
                        stored = %entry.get().timestamp,
                        "Ignoring stale write"
                    );
                    PutOutcome::Stale
                }
            }
            Entry::Vacant(entry) => {
                debug!(key = entry.key(), %timestamp, "Inserting record");
                entry.insert(Record { value, timestamp });
                PutOutcome::Applied
            }
        }
    }

    /// Retrieve the record for a key.
    /// If the key does not exist, then [`None`] is returned.
    pub fn get(&self, key: &str) -> Option<Record> {
        self.keydir.get(key).map(|r| r.value().clone())
    }

    /// Values of every key, without timestamps, in key order.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.keydir
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().value.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.keydir.clear();
    }

    pub fn len(&self) -> usize {
        self.keydir.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keydir.is_empty()
    }
}
