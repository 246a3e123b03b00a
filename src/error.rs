use std::time::Duration;

use crate::replication::Mode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unable to serialize: {0}")]
    BincodeSerialization(#[from] bincode::Error),

    #[error("Unable to setup tracing: {0}")]
    TracingError(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Write quorum not met: {acks} of {required} acknowledgements")]
    QuorumNotMet { acks: usize, required: usize },

    #[error("A {role} node does not support {operation}")]
    UnsupportedOperation { role: Mode, operation: &'static str },

    #[error("Request to {peer} timed out after {timeout:?}")]
    Timeout { peer: String, timeout: Duration },

    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: u64, limit: u64 },

    #[error("Remote node error: {0}")]
    Remote(String),

    #[error("Unexpected response from {peer}: {response}")]
    UnexpectedResponse { peer: String, response: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
