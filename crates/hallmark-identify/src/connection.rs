//! Collaborator contracts -- connections, the connection manager, and the
//! protocol-selection registrar.
//!
//! The engine never owns transport state. It opens substreams through
//! `Connection`, enumerates peers through `ConnectionManager`, and serves
//! inbound streams through handlers registered with `Registrar`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use libp2p_identity::PeerId;
use multiaddr::Multiaddr;
use tokio::io::{AsyncRead, AsyncWrite};

use hallmark_protocol::ProtocolError;

/// Bidirectional byte stream provided by the stream multiplexer.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

/// Boxed substream handed to protocol code.
pub type Substream = Box<dyn ByteStream>;

/// An established transport connection to one remote peer.
#[async_trait]
pub trait Connection: Send + Sync {
    /// The remote's peer id.
    fn remote_peer(&self) -> PeerId;

    /// The remote's transport address as this node sees it.
    fn remote_addr(&self) -> Multiaddr;

    /// Open a new outbound substream negotiated to `protocol`.
    async fn open_stream(&self, protocol: &str) -> Result<Substream, ProtocolError>;
}

/// Enumerates currently established connections.
pub trait ConnectionManager: Send + Sync {
    fn connections(&self) -> Vec<Arc<dyn Connection>>;
}

/// Concurrent-substream caps announced when registering a handler. The
/// protocol-selection layer refuses streams beyond these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    pub max_inbound: usize,
    pub max_outbound: usize,
}

/// Callback invoked with each inbound substream for a registered protocol.
pub type ProtocolHandler =
    Arc<dyn Fn(Substream, Arc<dyn Connection>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Protocol-selection layer: maps protocol ids to inbound stream handlers.
pub trait Registrar: Send + Sync {
    fn handle(&self, protocol: &str, handler: ProtocolHandler, limits: StreamLimits);

    fn unhandle(&self, protocol: &str);
}
