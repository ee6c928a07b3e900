//! Hallmark Store -- peer store and address manager contracts.
//!
//! The identify engine is the only writer of these fields for remote peers.
//! Implementations must keep `consume_peer_record` atomic with respect to
//! concurrent callers; sequence numbers decide which record wins.

pub mod address_manager;
pub mod memory;

pub use address_manager::{AddressManager, MemoryAddressManager};
pub use memory::MemoryPeerStore;

use hallmark_record::Envelope;
use libp2p_identity::PeerId;
use multiaddr::Multiaddr;

/// Metadata key for a peer's advertised agent string.
pub const AGENT_VERSION_KEY: &str = "AgentVersion";

/// Metadata key for a peer's advertised protocol-version string.
pub const PROTOCOL_VERSION_KEY: &str = "ProtocolVersion";

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("malformed peer record: {0}")]
    MalformedRecord(String),
}

impl From<hallmark_record::RecordError> for StoreError {
    fn from(err: hallmark_record::RecordError) -> Self {
        StoreError::MalformedRecord(err.to_string())
    }
}

/// Address, protocol, and metadata book for known peers.
pub trait PeerStore: Send + Sync {
    /// Known addresses for a peer, certified or legacy.
    fn addresses(&self, peer: &PeerId) -> Vec<Multiaddr>;

    /// Replace a peer's addresses verbatim. Legacy path; a stored envelope
    /// keeps gating future `consume_peer_record` calls.
    fn set_addresses(&self, peer: &PeerId, addrs: Vec<Multiaddr>);

    /// Offer a verified envelope. Returns `false` when the stored record's
    /// sequence number is not older than the offered one; on acceptance the
    /// record's addresses replace the peer's.
    fn consume_peer_record(&self, envelope: &Envelope) -> Result<bool>;

    /// Stored envelope for a peer, if any.
    fn envelope(&self, peer: &PeerId) -> Option<Envelope>;

    fn protocols(&self, peer: &PeerId) -> Vec<String>;

    fn set_protocols(&self, peer: &PeerId, protocols: Vec<String>);

    fn metadata(&self, peer: &PeerId, key: &str) -> Option<Vec<u8>>;

    fn set_metadata(&self, peer: &PeerId, key: &str, value: Vec<u8>);
}
