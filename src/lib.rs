//! An in-memory key-value store with a single leader and semi-synchronous
//! replication to any number of followers.
//!
//! Writes go through the [`Leader`], which stamps them, applies them locally
//! and returns once the configured write quorum of followers has confirmed.
//! Every store, leader and followers alike, resolves conflicting writes with
//! last-writer-wins on the leader's timestamp, so all replicas converge once
//! the background replication has finished.

pub mod analysis;
pub mod client;
pub mod config;
mod engine;
mod error;
pub mod protocol;
pub mod quorum;
pub mod replication;
pub mod server;
mod store;
pub mod timestamp;

pub use engine::KvsNode;
pub use error::Error;
pub use replication::{Follower, Leader, LocalPeer, Mode, Peer, SimulatedDelay, WriteAck};
pub use store::{KvStore, PutOutcome, Record, STALE_TIMESTAMP};
pub use timestamp::Timestamp;

pub type Result<T> = std::result::Result<T, Error>;
