use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use crate::replication::{Mode, SimulatedDelay};
use crate::{Error, Result};

/// Startup configuration for a node.
///
/// Every flag falls back to an environment variable so a node can be
/// configured entirely from its environment.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct NodeConfig {
    #[clap(long, env = "ROLE", default_value = Mode::Follower)]
    pub role: Mode,

    #[clap(long, env = "ADDR", default_value = "127.0.0.1:4000")]
    pub addr: SocketAddr,

    /// Follower addresses the leader replicates to.
    #[clap(long, env = "FOLLOWERS", value_delimiter = ',')]
    pub followers: Vec<String>,

    /// Lower bound of the simulated replication delay, in seconds.
    #[clap(long, env = "MIN_DELAY", default_value = "0.0001")]
    pub min_delay: f64,

    /// Upper bound of the simulated replication delay, in seconds.
    #[clap(long, env = "MAX_DELAY", default_value = "0.001")]
    pub max_delay: f64,

    /// Follower acknowledgements a write waits for.
    #[clap(long, env = "WRITE_QUORUM", default_value = "1", allow_negative_numbers = true)]
    pub write_quorum: i64,

    /// Deadline for a single replication call, in seconds.
    #[clap(long, env = "REPLICATION_TIMEOUT", default_value = "5")]
    pub replication_timeout: f64,

    #[clap(long, default_value = "info", env = "SEMISYNC_LOG")]
    pub log_level: LevelFilter,
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        let delay = self.simulated_delay()?;
        if delay.min > delay.max {
            return Err(Error::InvalidConfig(format!(
                "--min-delay ({}) is greater than --max-delay ({})",
                self.min_delay, self.max_delay
            )));
        }
        if self.replication_timeout()?.is_zero() {
            return Err(Error::InvalidConfig(format!(
                "--replication-timeout must be positive, got {}",
                self.replication_timeout
            )));
        }
        if self.followers.iter().any(|addr| addr.trim().is_empty()) {
            return Err(Error::InvalidConfig(format!(
                "--followers contains an empty address: {:?}",
                self.followers
            )));
        }
        Ok(())
    }

    /// Name used to tag log lines from this node.
    pub fn name(&self) -> String {
        format!("{}@{}", self.role, self.addr)
    }

    pub fn simulated_delay(&self) -> Result<SimulatedDelay> {
        Ok(SimulatedDelay::new(
            seconds("min-delay", self.min_delay)?,
            seconds("max-delay", self.max_delay)?,
        ))
    }

    pub fn replication_timeout(&self) -> Result<Duration> {
        seconds("replication-timeout", self.replication_timeout)
    }
}

/// Rejects negative, non-finite and out of range values.
fn seconds(flag: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| {
        Error::InvalidConfig(format!(
            "--{flag} must be a non-negative number of seconds, got {secs}: {e}"
        ))
    })
}
