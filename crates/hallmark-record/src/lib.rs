//! Hallmark Record -- host identity, peer records, signed envelopes.
//!
//! An envelope binds a domain separator and a payload (here, a peer record)
//! to a public key. Consumers accept a record only when the signature
//! verifies and the enclosed peer id matches the signer.

pub mod envelope;
pub mod identity;
pub mod peer_record;

pub use envelope::Envelope;
pub use identity::HostIdentity;
pub use peer_record::PeerRecord;

/// Domain separator for peer-record envelopes.
pub const PEER_RECORD_DOMAIN: &str = "libp2p-peer-record";

/// Multicodec payload type identifying a peer record inside an envelope.
pub const PEER_RECORD_PAYLOAD_TYPE: &[u8] = &[0x03, 0x01];

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("envelope signature verification failed")]
    InvalidSignature,
    #[error("envelope payload type mismatch")]
    WrongPayloadType,
    #[error("peer record names a different peer than its signing key")]
    PeerIdMismatch,
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<prost::DecodeError> for RecordError {
    fn from(err: prost::DecodeError) -> Self {
        RecordError::Malformed(err.to_string())
    }
}
