use clap::Parser;
use semisync::client::RemoteNodeClient;
use semisync::config::NodeConfig;
use semisync::server::Server;
use semisync::{Follower, Leader, Mode};
use tokio::signal::ctrl_c;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = NodeConfig::parse();
    config.validate()?;

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(semisync::Error::from)?;

    let shutdown = async {
        match ctrl_c().await {
            Ok(_) => info!("Received Ctrl-C"),
            Err(e) => error!("Error receiving Ctrl-C: {e}"),
        }
    };

    match config.role {
        Mode::Leader => {
            let timeout = config.replication_timeout()?;
            let followers: Vec<RemoteNodeClient> = config
                .followers
                .iter()
                .map(|addr| RemoteNodeClient::new(addr).with_timeout(timeout))
                .collect();
            info!(
                followers = ?config.followers,
                write_quorum = config.write_quorum,
                min_delay = config.min_delay,
                max_delay = config.max_delay,
                "Starting leader"
            );
            let leader = Leader::new(
                config.name(),
                followers,
                config.write_quorum,
                config.simulated_delay()?,
            );
            Server::bind(leader, config.addr).await?.run(shutdown).await?;
        }
        Mode::Follower => {
            if !config.followers.is_empty() {
                warn!(followers = ?config.followers, "Ignoring followers on a follower node");
            }
            let follower = Follower::new(config.name());
            Server::bind(follower, config.addr).await?.run(shutdown).await?;
        }
    }

    Ok(())
}
