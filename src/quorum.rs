use std::sync::atomic::{AtomicI64, Ordering};

/// Number of follower acknowledgements a write waits for.
///
/// Shared by every in-flight write on the leader. A write reads it exactly
/// once, before dispatching replication, and keeps that value even if the
/// setting changes while it is still waiting. Zero or a negative value means
/// "do not wait at all".
#[derive(Debug, Default)]
pub struct QuorumSetting(AtomicI64);

impl QuorumSetting {
    pub fn new(quorum: i64) -> Self {
        QuorumSetting(AtomicI64::new(quorum))
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Overwrite the setting, returning the previous value.
    pub fn set(&self, quorum: i64) -> i64 {
        self.0.swap(quorum, Ordering::SeqCst)
    }
}
