use std::time::Duration;

use super::{Follower, Peer, ReplicationEntry};
use crate::store::PutOutcome;
use crate::Result;

/// A follower living in the same process as the leader.
///
/// Useful for embedding a whole cluster in one binary and for measuring the
/// coordinator without any network in the way. An optional latency is added
/// on top of the leader's simulated delay.
#[derive(Clone, Debug)]
pub struct LocalPeer {
    name: String,
    follower: Follower,
    latency: Duration,
}

impl LocalPeer {
    pub fn new(follower: Follower) -> Self {
        Self {
            name: "local".to_string(),
            follower,
            latency: Duration::ZERO,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn follower(&self) -> &Follower {
        &self.follower
    }
}

impl Peer for LocalPeer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, entry: ReplicationEntry) -> Result<PutOutcome> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.follower.apply(entry.key, entry.value, entry.timestamp))
    }
}
