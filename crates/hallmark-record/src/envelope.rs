//! Signed envelope -- binds a domain separator and a payload to a public key.
//!
//! The signature covers the varint-length-prefixed concatenation of domain,
//! payload type, and payload, so an envelope sealed for one domain cannot be
//! replayed under another.

use libp2p_identity::{Keypair, PeerId, PublicKey};
use prost::encoding::encode_varint;
use prost::Message;

use crate::peer_record::PeerRecord;
use crate::{RecordError, PEER_RECORD_DOMAIN, PEER_RECORD_PAYLOAD_TYPE};

#[derive(Clone, PartialEq, Message)]
struct EnvelopeProto {
    #[prost(bytes = "vec", tag = "1")]
    public_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    payload_type: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    payload: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    signature: Vec<u8>,
}

/// A sealed (and, when read off the wire, verified) envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    public_key: PublicKey,
    payload_type: Vec<u8>,
    payload: Vec<u8>,
    signature: Vec<u8>,
}

impl Envelope {
    /// Seal a peer record under the local signing key.
    pub fn seal(record: &PeerRecord, keypair: &Keypair) -> Result<Self, RecordError> {
        let payload = record.to_bytes();
        let unsigned = signing_payload(PEER_RECORD_DOMAIN, PEER_RECORD_PAYLOAD_TYPE, &payload);
        let signature = keypair
            .sign(&unsigned)
            .map_err(|e| RecordError::Signing(e.to_string()))?;
        Ok(Self {
            public_key: keypair.public(),
            payload_type: PEER_RECORD_PAYLOAD_TYPE.to_vec(),
            payload,
            signature,
        })
    }

    /// Parse an envelope and verify its signature under `domain`.
    pub fn open_and_certify(bytes: &[u8], domain: &str) -> Result<Self, RecordError> {
        let proto = EnvelopeProto::decode(bytes)?;
        let public_key = PublicKey::try_decode_protobuf(&proto.public_key)
            .map_err(|e| RecordError::Malformed(format!("public key: {e}")))?;
        if proto.payload_type != PEER_RECORD_PAYLOAD_TYPE {
            return Err(RecordError::WrongPayloadType);
        }
        let unsigned = signing_payload(domain, &proto.payload_type, &proto.payload);
        if !public_key.verify(&unsigned, &proto.signature) {
            return Err(RecordError::InvalidSignature);
        }
        Ok(Self {
            public_key,
            payload_type: proto.payload_type,
            payload: proto.payload,
            signature: proto.signature,
        })
    }

    /// Peer id derived from the signing key.
    pub fn peer_id(&self) -> PeerId {
        self.public_key.to_peer_id()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Decode the enclosed peer record. The record must name the signing
    /// key's peer; a valid signature over somebody else's record is not a
    /// record for that peer.
    pub fn peer_record(&self) -> Result<PeerRecord, RecordError> {
        let record = PeerRecord::from_bytes(&self.payload)?;
        if record.peer_id != self.peer_id() {
            return Err(RecordError::PeerIdMismatch);
        }
        Ok(record)
    }

    /// Wire encoding of the envelope.
    pub fn to_bytes(&self) -> Vec<u8> {
        EnvelopeProto {
            public_key: self.public_key.encode_protobuf(),
            payload_type: self.payload_type.clone(),
            payload: self.payload.clone(),
            signature: self.signature.clone(),
        }
        .encode_to_vec()
    }
}

/// Varint-length-prefixed concatenation of domain, payload type, and payload.
fn signing_payload(domain: &str, payload_type: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(domain.len() + payload_type.len() + payload.len() + 12);
    encode_varint(domain.len() as u64, &mut buf);
    buf.extend_from_slice(domain.as_bytes());
    encode_varint(payload_type.len() as u64, &mut buf);
    buf.extend_from_slice(payload_type);
    encode_varint(payload.len() as u64, &mut buf);
    buf.extend_from_slice(payload);
    buf
}
