use crate::protocol::{read_frame, write_frame, Request, Response};
use crate::replication::{Mode, Peer, ReplicationEntry, WriteAck};
use crate::store::{PutOutcome, Record};
use crate::{Error, Result};
use clap::Subcommand;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::net::TcpStream;

/// Default deadline for a single request, including connecting.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Actions that can be performed by the client.
#[derive(Debug, Subcommand)]
pub enum Action {
    /// Write a key-value pair through the leader.
    Write { key: String, value: String },

    /// Read a key, with its timestamp, from the node.
    Read { key: String },

    /// Dump every key-value pair held by the node.
    ReadAll,

    /// Change the write quorum on the leader.
    SetQuorum { quorum: i64 },

    /// Remove every key from the node.
    Clear,

    /// Report the role of the node.
    Health,

    /// Compare every follower against the leader.
    Check {
        /// Follower addresses to compare.
        #[clap(long, value_delimiter = ',', required = true)]
        followers: Vec<String>,
    },

    /// Measure write latency for one or more quorum values.
    Bench {
        /// Quorum values to measure, in order.
        #[clap(long, value_delimiter = ',', default_value = "1,2,3,4,5")]
        quorums: Vec<i64>,

        #[clap(long, default_value = "100")]
        writes: usize,

        #[clap(long, default_value = "10")]
        concurrency: usize,

        /// Number of distinct keys the writes are spread over.
        #[clap(long, default_value = "10")]
        keys: usize,
    },
}

/// Client for a single remote node.
///
/// Every request opens its own connection and is bounded by the client's
/// timeout. The leader uses this type to reach its followers.
#[derive(Debug, Clone)]
pub struct RemoteNodeClient {
    addr: String,
    timeout: Duration,
}

impl RemoteNodeClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn call(&self, request: Request) -> Result<Response> {
        match tokio::time::timeout(self.timeout, self.exchange(request)).await {
            Ok(Ok(Response::Error(message))) => Err(Error::Remote(message)),
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                peer: self.addr.clone(),
                timeout: self.timeout,
            }),
        }
    }

    async fn exchange(&self, request: Request) -> Result<Response> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        write_frame(&mut stream, &request).await?;
        read_frame(&mut stream).await?.ok_or_else(|| {
            Error::IoError(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before a response was sent",
            ))
        })
    }

    fn unexpected(&self, response: Response) -> Error {
        Error::UnexpectedResponse {
            peer: self.addr.clone(),
            response: response.kind().to_string(),
        }
    }

    pub async fn write(&self, key: String, value: String) -> Result<WriteAck> {
        match self.call(Request::Write { key, value }).await? {
            Response::Written(ack) => Ok(ack),
            Response::QuorumNotMet { acks, required } => Err(Error::QuorumNotMet { acks, required }),
            other => Err(self.unexpected(other)),
        }
    }

    pub async fn read(&self, key: String) -> Result<Option<Record>> {
        match self.call(Request::Read { key }).await? {
            Response::Value(record) => Ok(record),
            other => Err(self.unexpected(other)),
        }
    }

    pub async fn read_all(&self) -> Result<BTreeMap<String, String>> {
        match self.call(Request::ReadAll).await? {
            Response::All(entries) => Ok(entries),
            other => Err(self.unexpected(other)),
        }
    }

    pub async fn set_quorum(&self, quorum: i64) -> Result<i64> {
        match self.call(Request::SetQuorum { quorum }).await? {
            Response::QuorumUpdated { quorum } => Ok(quorum),
            other => Err(self.unexpected(other)),
        }
    }

    pub async fn clear(&self) -> Result<Mode> {
        match self.call(Request::Clear).await? {
            Response::Cleared { role } => Ok(role),
            other => Err(self.unexpected(other)),
        }
    }

    pub async fn health(&self) -> Result<Mode> {
        match self.call(Request::Health).await? {
            Response::Health { role } => Ok(role),
            other => Err(self.unexpected(other)),
        }
    }
}

impl Peer for RemoteNodeClient {
    fn name(&self) -> &str {
        &self.addr
    }

    async fn apply(&self, entry: ReplicationEntry) -> Result<PutOutcome> {
        let request = Request::Apply {
            key: entry.key,
            value: entry.value,
            timestamp: entry.timestamp,
        };
        match self.call(request).await? {
            Response::Applied(outcome) => Ok(outcome),
            other => Err(self.unexpected(other)),
        }
    }
}
