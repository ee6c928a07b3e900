//! Host events consumed by the identify engine.
//!
//! Connection lifecycle and local-identity mutations arrive over a broadcast
//! channel; the host owns the sender, the engine subscribes at start.

use std::fmt;
use std::sync::Arc;

use libp2p_identity::PeerId;

use crate::connection::Connection;

#[derive(Clone)]
pub enum HostEvent {
    /// A transport connection to a remote peer was established.
    ConnectionEstablished { connection: Arc<dyn Connection> },
    /// A peer's listen addresses changed.
    ListenAddrsChanged { peer: PeerId },
    /// A peer's supported protocol set changed.
    ProtocolsChanged { peer: PeerId },
}

impl fmt::Debug for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostEvent::ConnectionEstablished { connection } => f
                .debug_struct("ConnectionEstablished")
                .field("remote_peer", &connection.remote_peer())
                .finish(),
            HostEvent::ListenAddrsChanged { peer } => f
                .debug_struct("ListenAddrsChanged")
                .field("peer", peer)
                .finish(),
            HostEvent::ProtocolsChanged { peer } => f
                .debug_struct("ProtocolsChanged")
                .field("peer", peer)
                .finish(),
        }
    }
}
