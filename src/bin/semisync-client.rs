use clap::Parser;
use semisync::analysis::{check_consistency, measure_write_latency};
use semisync::client::{Action, RemoteNodeClient};
use semisync::{Error, WriteAck};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct App {
    #[clap(name = "addr", global = true, long, default_value = "127.0.0.1:4000")]
    server: String,

    #[clap(subcommand)]
    subcmd: Action,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = App::parse();
    let node = RemoteNodeClient::new(cli.server);

    match cli.subcmd {
        Action::Write { key, value } => match node.write(key, value).await {
            Ok(WriteAck::LocalOnly { timestamp }) => {
                println!("written_local_only timestamp={timestamp}");
            }
            Ok(WriteAck::Replicated {
                timestamp,
                acks,
                required,
            }) => println!("ok timestamp={timestamp} acks={acks} required={required}"),
            Err(Error::QuorumNotMet { acks, required }) => {
                eprintln!("Write quorum not met: {acks} of {required}");
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        },
        Action::Read { key } => match node.read(key).await? {
            Some(record) => println!("{} (timestamp={})", record.value, record.timestamp),
            None => {
                eprintln!("Key not found");
                std::process::exit(1);
            }
        },
        Action::ReadAll => {
            for (key, value) in node.read_all().await? {
                println!("{key}={value}");
            }
        }
        Action::SetQuorum { quorum } => {
            println!("write_quorum={}", node.set_quorum(quorum).await?);
        }
        Action::Clear => println!("cleared {}", node.clear().await?),
        Action::Health => println!("{}", node.health().await?),
        Action::Check { followers } => {
            let followers: Vec<RemoteNodeClient> =
                followers.into_iter().map(RemoteNodeClient::new).collect();
            let report = check_consistency(&node, &followers).await?;
            println!("leader keys: {}", report.leader_keys);
            for diff in &report.followers {
                println!(
                    "{}: missing={} mismatched={}",
                    diff.follower,
                    diff.missing.len(),
                    diff.mismatched.len()
                );
                for key in &diff.missing {
                    println!("  missing {key}");
                }
                for key in &diff.mismatched {
                    println!("  mismatched {key}");
                }
            }
            if !report.is_consistent() {
                std::process::exit(1);
            }
        }
        Action::Bench {
            quorums,
            writes,
            concurrency,
            keys,
        } => {
            println!("quorum\tok\tfailed\tmean_ms\tmax_ms");
            for quorum in quorums {
                let report = measure_write_latency(&node, quorum, writes, concurrency, keys).await?;
                println!(
                    "{}\t{}\t{}\t{:.3}\t{:.3}",
                    report.quorum, report.successes, report.failures, report.mean_ms, report.max_ms
                );
            }
        }
    }

    Ok(())
}
