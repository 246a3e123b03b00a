//! Wire format shared by the server, the client and leader-to-follower
//! replication.
//!
//! Every frame is a big-endian `u64` size hint followed by that many bytes of
//! bincode, so the reader can use `read_exact` without scanning.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::replication::{Mode, WriteAck};
use crate::store::{PutOutcome, Record};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

/// Largest frame either side will accept.
pub const MAX_FRAME_SIZE: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Write {
        key: String,
        value: String,
    },
    Read {
        key: String,
    },
    ReadAll,
    /// Replicated write pushed by the leader.
    Apply {
        key: String,
        value: String,
        timestamp: Timestamp,
    },
    SetQuorum {
        quorum: i64,
    },
    Clear,
    Health,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Written(WriteAck),
    QuorumNotMet { acks: usize, required: usize },
    Value(Option<Record>),
    All(BTreeMap<String, String>),
    Applied(PutOutcome),
    QuorumUpdated { quorum: i64 },
    Cleared { role: Mode },
    Health { role: Mode },
    Error(String),
}

impl Response {
    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Written(_) => "written",
            Response::QuorumNotMet { .. } => "quorum_not_met",
            Response::Value(_) => "value",
            Response::All(_) => "all",
            Response::Applied(_) => "applied",
            Response::QuorumUpdated { .. } => "quorum_updated",
            Response::Cleared { .. } => "cleared",
            Response::Health { .. } => "health",
            Response::Error(_) => "error",
        }
    }
}

pub async fn write_frame<W, T>(stream: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = bincode::serialize(message)?;
    stream.write_u64(data.len() as u64).await?;
    stream.write_all(&data).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one frame. Returns [`None`] on a clean end of stream.
pub async fn read_frame<R, T>(stream: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let size = match stream.read_u64().await {
        Ok(size) => size,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if size > MAX_FRAME_SIZE {
        return Err(Error::FrameTooLarge {
            size,
            limit: MAX_FRAME_SIZE,
        });
    }
    let mut buf = vec![0; size as usize];
    stream.read_exact(&mut buf).await?;
    Ok(Some(bincode::deserialize(&buf)?))
}
