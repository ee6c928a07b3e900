//! Peer record -- a peer's self-declared listen addresses under a monotonic
//! sequence number.

use libp2p_identity::PeerId;
use multiaddr::Multiaddr;
use prost::Message;

use crate::RecordError;

#[derive(Clone, PartialEq, Message)]
struct PeerRecordProto {
    #[prost(bytes = "vec", tag = "1")]
    peer_id: Vec<u8>,
    #[prost(uint64, tag = "2")]
    seq: u64,
    #[prost(message, repeated, tag = "3")]
    addresses: Vec<AddressInfo>,
}

#[derive(Clone, PartialEq, Message)]
struct AddressInfo {
    #[prost(bytes = "vec", tag = "1")]
    multiaddr: Vec<u8>,
}

/// A versioned declaration of a peer's listen addresses.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerRecord {
    pub peer_id: PeerId,
    pub seq: u64,
    pub addresses: Vec<Multiaddr>,
}

impl PeerRecord {
    pub fn new(peer_id: PeerId, seq: u64, addresses: Vec<Multiaddr>) -> Self {
        Self {
            peer_id,
            seq,
            addresses,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        PeerRecordProto {
            peer_id: self.peer_id.to_bytes(),
            seq: self.seq,
            addresses: self
                .addresses
                .iter()
                .map(|a| AddressInfo {
                    multiaddr: a.to_vec(),
                })
                .collect(),
        }
        .encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let proto = PeerRecordProto::decode(bytes)?;
        let peer_id = PeerId::from_bytes(&proto.peer_id)
            .map_err(|e| RecordError::Malformed(format!("peer id: {e}")))?;
        let mut addresses = Vec::with_capacity(proto.addresses.len());
        for info in proto.addresses {
            let addr = Multiaddr::try_from(info.multiaddr)
                .map_err(|e| RecordError::Malformed(format!("multiaddr: {e}")))?;
            addresses.push(addr);
        }
        Ok(Self {
            peer_id,
            seq: proto.seq,
            addresses,
        })
    }
}
