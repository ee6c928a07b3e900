//! Identify wire record.
//!
//! Every field is optional on the wire so legacy peers that omit the newer
//! ones still decode. Multiaddrs travel in their binary form.

use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct IdentifyMessage {
    /// Sender's public key, in its protobuf encoding.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub public_key: Option<Vec<u8>>,
    /// Addresses the sender listens on, binary multiaddrs.
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub listen_addrs: Vec<Vec<u8>>,
    /// Application protocols the sender supports.
    #[prost(string, repeated, tag = "3")]
    pub protocols: Vec<String>,
    /// How the sender sees the receiver, binary multiaddr.
    #[prost(bytes = "vec", optional, tag = "4")]
    pub observed_addr: Option<Vec<u8>>,
    #[prost(string, optional, tag = "5")]
    pub protocol_version: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub agent_version: Option<String>,
    /// Envelope wrapping the sender's peer record.
    #[prost(bytes = "vec", optional, tag = "8")]
    pub signed_peer_record: Option<Vec<u8>>,
}

impl IdentifyMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(bytes)
    }
}
