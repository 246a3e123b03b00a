use crate::engine::KvsNode;
use crate::protocol::{read_frame, write_frame, Request, Response};
use crate::{Error, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// How long open connections get to finish their current request once
/// shutdown starts. Connections still running after that are aborted.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Serves requests for a single node over TCP.
///
/// The server has no knowledge of roles, it hands every request to its
/// [`KvsNode`] and writes back whatever that node answers.
pub struct Server<N> {
    node: N,
    listener: TcpListener,
}

impl<N> Server<N>
where
    N: KvsNode,
{
    pub async fn bind(node: N, addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { node, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves, then wait for open
    /// connections and the node's background work to finish.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!(%addr, role = %self.node.role(), "Listening");
        info!("semisync-server version: {}", env!("CARGO_PKG_VERSION"));

        let mut connections = JoinSet::new();
        let (stop_tx, stop_rx) = watch::channel(());
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, remote)) => {
                            debug!(%remote, "Connection established");
                            let node = self.node.clone();
                            let stop = stop_rx.clone();
                            connections.spawn(async move {
                                if let Err(e) = handle_connection(stream, node, stop).await {
                                    error!(%remote, error = %e, "Connection failed");
                                }
                            });
                        }
                        Err(e) => error!(error = %e, "Failed to accept connection"),
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(self.listener);
        // Idle connections stop reading once this is sent.
        let _ = stop_tx.send(());
        let closing = async { while connections.join_next().await.is_some() {} };
        let closed = tokio::time::timeout(SHUTDOWN_GRACE, closing).await;
        if closed.is_err() {
            warn!(
                remaining = connections.len(),
                "Connections did not close in time, aborting them"
            );
            connections.shutdown().await;
        }
        self.node.shutdown().await;
        Ok(())
    }
}

/// Serve requests until the peer hangs up or the server stops.
///
/// A request that has been read is always answered; shutdown only interrupts
/// the wait for the next one.
async fn handle_connection<N: KvsNode>(
    mut stream: TcpStream,
    node: N,
    mut stop: watch::Receiver<()>,
) -> Result<()> {
    loop {
        let request = tokio::select! {
            frame = read_frame::<_, Request>(&mut stream) => frame?,
            _ = stop.changed() => {
                debug!("Closing connection for shutdown");
                return Ok(());
            }
        };
        let Some(request) = request else {
            return Ok(());
        };
        let response = dispatch(&node, request).await;
        write_frame(&mut stream, &response).await?;
    }
}

/// Run a single request against the node.
pub async fn dispatch<N: KvsNode>(node: &N, request: Request) -> Response {
    match request {
        Request::Write { key, value } => match node.write(key, value).await {
            Ok(ack) => Response::Written(ack),
            Err(Error::QuorumNotMet { acks, required }) => Response::QuorumNotMet { acks, required },
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Read { key } => Response::Value(node.read(&key)),
        Request::ReadAll => Response::All(node.read_all()),
        Request::Apply {
            key,
            value,
            timestamp,
        } => match node.apply(key, value, timestamp) {
            Ok(outcome) => Response::Applied(outcome),
            Err(e) => Response::Error(e.to_string()),
        },
        Request::SetQuorum { quorum } => match node.set_quorum(quorum) {
            Ok(quorum) => Response::QuorumUpdated { quorum },
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Clear => {
            node.clear();
            Response::Cleared { role: node.role() }
        }
        Request::Health => Response::Health { role: node.role() },
    }
}
