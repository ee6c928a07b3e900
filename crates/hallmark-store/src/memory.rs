//! In-memory peer store -- lock-guarded registry keyed by peer id.

use std::collections::HashMap;

use hallmark_record::Envelope;
use libp2p_identity::PeerId;
use multiaddr::Multiaddr;
use parking_lot::RwLock;

use crate::{PeerStore, Result};

#[derive(Default)]
struct PeerEntry {
    addrs: Vec<Multiaddr>,
    /// Last accepted envelope and its record's sequence number.
    envelope: Option<(Envelope, u64)>,
    protocols: Vec<String>,
    metadata: HashMap<String, Vec<u8>>,
}

/// Thread-safe in-memory `PeerStore`.
#[derive(Default)]
pub struct MemoryPeerStore {
    inner: RwLock<HashMap<PeerId, PeerEntry>>,
}

impl MemoryPeerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PeerStore for MemoryPeerStore {
    fn addresses(&self, peer: &PeerId) -> Vec<Multiaddr> {
        self.inner
            .read()
            .get(peer)
            .map(|e| e.addrs.clone())
            .unwrap_or_default()
    }

    fn set_addresses(&self, peer: &PeerId, addrs: Vec<Multiaddr>) {
        let mut inner = self.inner.write();
        let entry = inner.entry(*peer).or_default();
        tracing::debug!(%peer, count = addrs.len(), "store: addresses set");
        entry.addrs = addrs;
    }

    fn consume_peer_record(&self, envelope: &Envelope) -> Result<bool> {
        let record = envelope.peer_record()?;
        let mut inner = self.inner.write();
        let entry = inner.entry(record.peer_id).or_default();
        if let Some((_, stored_seq)) = &entry.envelope {
            if record.seq <= *stored_seq {
                tracing::debug!(
                    peer = %record.peer_id,
                    seq = record.seq,
                    stored_seq,
                    "store: peer record not newer, ignored"
                );
                return Ok(false);
            }
        }
        tracing::debug!(
            peer = %record.peer_id,
            seq = record.seq,
            count = record.addresses.len(),
            "store: peer record consumed"
        );
        entry.addrs = record.addresses;
        entry.envelope = Some((envelope.clone(), record.seq));
        Ok(true)
    }

    fn envelope(&self, peer: &PeerId) -> Option<Envelope> {
        self.inner
            .read()
            .get(peer)
            .and_then(|e| e.envelope.as_ref().map(|(env, _)| env.clone()))
    }

    fn protocols(&self, peer: &PeerId) -> Vec<String> {
        self.inner
            .read()
            .get(peer)
            .map(|e| e.protocols.clone())
            .unwrap_or_default()
    }

    fn set_protocols(&self, peer: &PeerId, protocols: Vec<String>) {
        let mut inner = self.inner.write();
        inner.entry(*peer).or_default().protocols = protocols;
    }

    fn metadata(&self, peer: &PeerId, key: &str) -> Option<Vec<u8>> {
        self.inner
            .read()
            .get(peer)
            .and_then(|e| e.metadata.get(key).cloned())
    }

    fn set_metadata(&self, peer: &PeerId, key: &str, value: Vec<u8>) {
        let mut inner = self.inner.write();
        inner
            .entry(*peer)
            .or_default()
            .metadata
            .insert(key.to_string(), value);
    }
}
