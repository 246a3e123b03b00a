//! Replication is achieved through a single-leader, semi-synchronous model.
//!
//! The [`Leader`] stamps each write, applies it locally and then pushes it
//! to every configured [`Peer`] at once. The caller gets an answer as soon as
//! the quorum of followers has acknowledged; the remaining attempts keep
//! running inside [`ReplicationTasks`] until they finish on their own.
//!
//! The [`Follower`] feeds every replicated write through the store's
//! last-writer-wins rule, which is what makes out-of-order delivery safe.

mod follower;
mod leader;
mod local;
mod tasks;

pub use follower::Follower;
pub use leader::{Leader, WriteAck};
pub use local::LocalPeer;
pub use tasks::ReplicationTasks;

use crate::store::PutOutcome;
use crate::timestamp::Timestamp;
use crate::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Mode {
    Leader,
    Follower,
}

impl From<Mode> for clap::builder::OsStr {
    fn from(value: Mode) -> Self {
        match value {
            Mode::Leader => "leader".into(),
            Mode::Follower => "follower".into(),
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Leader => write!(f, "leader"),
            Mode::Follower => write!(f, "follower"),
        }
    }
}

/// One write as shipped to a follower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationEntry {
    pub key: String,
    pub value: String,
    pub timestamp: Timestamp,
}

/// The receiving end of a replication attempt, as seen from the leader.
///
/// Any error counts as a failed attempt; the leader never retries.
pub trait Peer: Send + Sync + 'static {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    fn apply(&self, entry: ReplicationEntry) -> impl Future<Output = Result<PutOutcome>> + Send;
}

/// Artificial latency added before every replication call.
///
/// Each attempt draws its own delay uniformly from `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimulatedDelay {
    pub min: Duration,
    pub max: Duration,
}

impl SimulatedDelay {
    pub fn new(min: Duration, max: Duration) -> Self {
        SimulatedDelay { min, max }
    }

    pub fn none() -> Self {
        SimulatedDelay::default()
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}
