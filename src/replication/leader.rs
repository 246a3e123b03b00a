use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Mode, Peer, ReplicationEntry, ReplicationTasks, SimulatedDelay};
use crate::engine::KvsNode;
use crate::quorum::QuorumSetting;
use crate::store::{KvStore, PutOutcome, Record};
use crate::timestamp::{Clock, Timestamp};
use crate::{Error, Result};

/// Successful outcome of a leader write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteAck {
    /// No followers are configured, the write only exists on the leader.
    LocalOnly { timestamp: Timestamp },
    /// `acks` followers confirmed before the caller was released. Attempts
    /// still running at that point keep going in the background.
    Replicated {
        timestamp: Timestamp,
        acks: usize,
        required: usize,
    },
}

impl WriteAck {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            WriteAck::LocalOnly { timestamp } | WriteAck::Replicated { timestamp, .. } => *timestamp,
        }
    }
}

/// The write coordinator.
///
/// Every write is stamped by the leader's clock, applied to the local store
/// and fanned out to all followers concurrently. The local write is never
/// rolled back, so a write that fails to reach quorum can leave the leader
/// ahead of some followers.
pub struct Leader<P> {
    /// Identifier for the node.
    ///
    /// This is used for troubleshooting/debugging purposes.
    name: String,
    store: KvStore,
    followers: Arc<Vec<Arc<P>>>,
    quorum: Arc<QuorumSetting>,
    delay: SimulatedDelay,
    clock: Arc<Clock>,
    tasks: ReplicationTasks,
}

impl<P> Clone for Leader<P> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            store: self.store.clone(),
            followers: self.followers.clone(),
            quorum: self.quorum.clone(),
            delay: self.delay,
            clock: self.clock.clone(),
            tasks: self.tasks.clone(),
        }
    }
}

impl<P> Leader<P>
where
    P: Peer,
{
    pub fn new(name: String, followers: Vec<P>, quorum: i64, delay: SimulatedDelay) -> Self {
        Self {
            name,
            store: KvStore::new(),
            followers: Arc::new(followers.into_iter().map(Arc::new).collect()),
            quorum: Arc::new(QuorumSetting::new(quorum)),
            delay,
            clock: Arc::new(Clock::new()),
            tasks: ReplicationTasks::new(),
        }
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn quorum(&self) -> i64 {
        self.quorum.get()
    }

    pub fn follower_count(&self) -> usize {
        self.followers.len()
    }

    /// Replication attempts that have not completed yet.
    pub fn in_flight(&self) -> usize {
        self.tasks.in_flight()
    }

    /// Write `value` under `key` and wait for the quorum snapshot taken at
    /// dispatch time.
    pub async fn write(&self, key: String, value: String) -> Result<WriteAck> {
        let timestamp = self.clock.now();
        if let PutOutcome::Stale = self.store.put(key.clone(), value.clone(), timestamp) {
            // Only reachable if the store was seeded with a newer record.
            warn!(leader = self.name, key, %timestamp, "Local write was stale");
        }

        if self.followers.is_empty() {
            debug!(leader = self.name, key, %timestamp, "No followers, written locally only");
            return Ok(WriteAck::LocalOnly { timestamp });
        }

        let quorum = self.quorum.get();
        let entry = ReplicationEntry {
            key,
            value,
            timestamp,
        };
        let mut completions = self.dispatch(entry);

        if quorum <= 0 {
            debug!(leader = self.name, %timestamp, "Quorum disabled, not waiting for followers");
            return Ok(WriteAck::Replicated {
                timestamp,
                acks: 0,
                required: 0,
            });
        }

        let required = (quorum as usize).min(self.followers.len());
        if required < quorum as usize {
            warn!(
                leader = self.name,
                quorum,
                followers = self.followers.len(),
                "Quorum exceeds follower count, waiting for every follower instead"
            );
        }

        let mut acks = 0;
        let mut failures = 0;
        while let Some(succeeded) = completions.recv().await {
            if succeeded {
                acks += 1;
                if acks >= required {
                    debug!(leader = self.name, %timestamp, acks, required, "Quorum met");
                    return Ok(WriteAck::Replicated {
                        timestamp,
                        acks,
                        required,
                    });
                }
            } else {
                failures += 1;
            }
        }

        warn!(
            leader = self.name,
            %timestamp,
            acks,
            failures,
            required,
            "Write quorum not met"
        );
        Err(Error::QuorumNotMet { acks, required })
    }

    /// Start one attempt per follower.
    ///
    /// Each attempt reports success or failure on the returned channel, in
    /// completion order. The channel closes once every attempt has finished.
    fn dispatch(&self, entry: ReplicationEntry) -> mpsc::UnboundedReceiver<bool> {
        let (tx, rx) = mpsc::unbounded_channel();
        for follower in self.followers.iter() {
            let follower = follower.clone();
            let entry = entry.clone();
            let delay = self.delay.sample();
            let tx = tx.clone();
            self.tasks.spawn(async move {
                let succeeded = replicate(follower.as_ref(), entry, delay).await;
                // The writer may already have returned.
                let _ = tx.send(succeeded);
            });
        }
        rx
    }

    pub fn set_quorum(&self, quorum: i64) -> i64 {
        let previous = self.quorum.set(quorum);
        info!(leader = self.name, previous, quorum, "Write quorum updated");
        quorum
    }

    /// Wait for every background replication attempt.
    pub async fn drain(&self) {
        self.tasks.drain().await;
    }
}

async fn replicate<P: Peer>(
    follower: &P,
    entry: ReplicationEntry,
    delay: std::time::Duration,
) -> bool {
    tokio::time::sleep(delay).await;
    let key = entry.key.clone();
    let timestamp = entry.timestamp;
    match follower.apply(entry).await {
        Ok(outcome) => {
            debug!(
                follower = follower.name(),
                key,
                %timestamp,
                delay_us = delay.as_micros() as u64,
                applied = outcome.applied(),
                "Replicated"
            );
            true
        }
        Err(e) => {
            warn!(follower = follower.name(), key, %timestamp, error = %e, "Failed to replicate");
            false
        }
    }
}

impl<P> KvsNode for Leader<P>
where
    P: Peer,
{
    fn role(&self) -> Mode {
        Mode::Leader
    }

    async fn write(&self, key: String, value: String) -> Result<WriteAck> {
        Leader::write(self, key, value).await
    }

    fn read(&self, key: &str) -> Option<Record> {
        self.store.get(key)
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        self.store.snapshot()
    }

    fn apply(&self, _key: String, _value: String, _timestamp: Timestamp) -> Result<PutOutcome> {
        Err(Error::UnsupportedOperation {
            role: Mode::Leader,
            operation: "apply",
        })
    }

    fn set_quorum(&self, quorum: i64) -> Result<i64> {
        Ok(Leader::set_quorum(self, quorum))
    }

    fn clear(&self) {
        info!(leader = self.name, "Clearing store");
        self.store.clear();
    }

    async fn shutdown(&self) {
        info!(leader = self.name, in_flight = self.tasks.in_flight(), "Waiting for replication to finish");
        self.drain().await;
    }
}
