use std::collections::BTreeMap;

use tracing::{debug, info};

use super::{Mode, WriteAck};
use crate::engine::KvsNode;
use crate::store::{KvStore, PutOutcome, Record};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

/// A replica that only accepts writes pushed by the leader.
///
/// Applying is a straight pass-through to [`KvStore::put`], so re-delivering
/// the same write, or delivering an older one late, is a no-op.
#[derive(Clone, Debug)]
pub struct Follower {
    name: String,
    store: KvStore,
}

impl Follower {
    pub fn new(name: String) -> Self {
        Self {
            name,
            store: KvStore::new(),
        }
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn apply(&self, key: String, value: String, timestamp: Timestamp) -> PutOutcome {
        let outcome = self.store.put(key, value, timestamp);
        debug!(follower = self.name, %timestamp, applied = outcome.applied(), "Applied replicated write");
        outcome
    }
}

impl KvsNode for Follower {
    fn role(&self) -> Mode {
        Mode::Follower
    }

    async fn write(&self, _key: String, _value: String) -> Result<WriteAck> {
        Err(Error::UnsupportedOperation {
            role: Mode::Follower,
            operation: "write",
        })
    }

    fn read(&self, key: &str) -> Option<Record> {
        self.store.get(key)
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        self.store.snapshot()
    }

    fn apply(&self, key: String, value: String, timestamp: Timestamp) -> Result<PutOutcome> {
        Ok(Follower::apply(self, key, value, timestamp))
    }

    fn set_quorum(&self, _quorum: i64) -> Result<i64> {
        Err(Error::UnsupportedOperation {
            role: Mode::Follower,
            operation: "set_quorum",
        })
    }

    fn clear(&self) {
        info!(follower = self.name, "Clearing store");
        self.store.clear();
    }

    async fn shutdown(&self) {}
}
