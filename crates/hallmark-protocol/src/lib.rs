//! Hallmark Protocol -- identify wire record, one-frame codec, error taxonomy.
//!
//! One bidirectional substream per exchange. Unsigned varint length prefix +
//! protobuf-encoded identify record.

pub mod codec;
pub mod message;

pub use message::IdentifyMessage;

/// First segment of both protocol ids unless overridden in config.
pub const DEFAULT_PROTOCOL_PREFIX: &str = "ipfs";

/// Version segment of the identify protocol id.
pub const IDENTIFY_VERSION: &str = "1.0.0";

/// Version segment of the identify-push protocol id.
pub const PUSH_VERSION: &str = "1.0.0";

/// Identify protocol id under the default prefix.
pub const IDENTIFY_PROTOCOL: &str = "/ipfs/id/1.0.0";

/// Identify-push protocol id under the default prefix.
pub const PUSH_PROTOCOL: &str = "/ipfs/id/push/1.0.0";

/// Default cap on a single identify frame.
pub const MAX_IDENTIFY_MESSAGE_SIZE: usize = 8192;

/// Build the identify protocol id for a prefix.
pub fn identify_protocol(prefix: &str) -> String {
    format!("/{prefix}/id/{IDENTIFY_VERSION}")
}

/// Build the identify-push protocol id for a prefix.
pub fn push_protocol(prefix: &str) -> String {
    format!("/{prefix}/id/push/{PUSH_VERSION}")
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("stream ended before a complete frame arrived")]
    ConnectionEnded,
    #[error("frame too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("invalid identify message: {0}")]
    InvalidMessage(String),
    #[error("identify response carried no public key")]
    MissingPublicKey,
    #[error("invalid peer: {0}")]
    InvalidPeer(String),
    #[error("envelope signature verification failed")]
    InvalidSignature,
    #[error("exchange deadline exceeded")]
    Timeout,
    #[error("exchange cancelled")]
    Cancelled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<prost::DecodeError> for ProtocolError {
    fn from(err: prost::DecodeError) -> Self {
        ProtocolError::InvalidMessage(err.to_string())
    }
}
