//! Cluster-level checks driven from the client side.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::client::RemoteNodeClient;
use crate::Result;

/// Differences between one follower and the leader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowerDiff {
    pub follower: String,
    /// Keys the leader holds that the follower does not.
    pub missing: Vec<String>,
    /// Keys present on both sides with different values.
    pub mismatched: Vec<String>,
}

impl FollowerDiff {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub leader_keys: usize,
    pub followers: Vec<FollowerDiff>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.followers.iter().all(FollowerDiff::is_consistent)
    }
}

/// Compare the contents of two stores, taking `leader` as the reference.
pub fn diff(
    follower: &str,
    leader: &BTreeMap<String, String>,
    replica: &BTreeMap<String, String>,
) -> FollowerDiff {
    let mut result = FollowerDiff {
        follower: follower.to_string(),
        ..Default::default()
    };
    for (key, value) in leader {
        match replica.get(key) {
            None => result.missing.push(key.clone()),
            Some(v) if v != value => result.mismatched.push(key.clone()),
            Some(_) => {}
        }
    }
    result
}

/// Read everything from the leader and every follower and report where the
/// followers disagree.
pub async fn check_consistency(
    leader: &RemoteNodeClient,
    followers: &[RemoteNodeClient],
) -> Result<ConsistencyReport> {
    let reference = leader.read_all().await?;
    let mut report = ConsistencyReport {
        leader_keys: reference.len(),
        followers: Vec::with_capacity(followers.len()),
    };
    for follower in followers {
        let replica = follower.read_all().await?;
        let found = diff(follower.addr(), &reference, &replica);
        if !found.is_consistent() {
            warn!(
                follower = follower.addr(),
                missing = found.missing.len(),
                mismatched = found.mismatched.len(),
                "Follower diverges from leader"
            );
        }
        report.followers.push(found);
    }
    Ok(report)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatencyReport {
    pub quorum: i64,
    pub successes: usize,
    pub failures: usize,
    pub mean_ms: f64,
    pub max_ms: f64,
}

impl LatencyReport {
    fn from_samples(quorum: i64, samples: &[Option<Duration>]) -> Self {
        let ok: Vec<f64> = samples
            .iter()
            .flatten()
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();
        let mean_ms = if ok.is_empty() {
            0.0
        } else {
            ok.iter().sum::<f64>() / ok.len() as f64
        };
        LatencyReport {
            quorum,
            successes: ok.len(),
            failures: samples.len() - ok.len(),
            mean_ms,
            max_ms: ok.iter().copied().fold(0.0, f64::max),
        }
    }
}

/// Set the leader's quorum, then issue `writes` writes spread over `keys`
/// keys with at most `concurrency` in flight.
pub async fn measure_write_latency(
    leader: &RemoteNodeClient,
    quorum: i64,
    writes: usize,
    concurrency: usize,
    keys: usize,
) -> Result<LatencyReport> {
    leader.set_quorum(quorum).await?;
    let keys = keys.max(1);

    let samples: Vec<Option<Duration>> = stream::iter(0..writes)
        .map(|i| {
            let leader = leader.clone();
            async move {
                let key = format!("key_{}", i % keys);
                let value = format!("value_{i}");
                let start = Instant::now();
                match leader.write(key, value).await {
                    Ok(_) => Some(start.elapsed()),
                    Err(e) => {
                        debug!(error = %e, "Write failed");
                        None
                    }
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    Ok(LatencyReport::from_samples(quorum, &samples))
}
