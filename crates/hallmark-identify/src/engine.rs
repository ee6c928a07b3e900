//! Identify protocol engine -- initiator and responder roles for identify
//! and identify-push.
//!
//! Identify: the initiator opens a substream and reads the one frame the
//! responder writes. Push: the initiator writes one frame the responder
//! reads. Initiator errors surface to the caller; responder and push errors
//! are logged and never disrupt the engine. Every exit path closes the
//! substream and releases its deadline.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::{join_all, BoxFuture};
use libp2p_identity::PublicKey;
use multiaddr::{Multiaddr, Protocol};
use tokio::io::AsyncWriteExt;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

use hallmark_protocol::codec::{read_message, write_message};
use hallmark_protocol::{IdentifyMessage, ProtocolError};
use hallmark_record::{Envelope, HostIdentity, PeerRecord};
use hallmark_store::{AddressManager, PeerStore, AGENT_VERSION_KEY, PROTOCOL_VERSION_KEY};

use crate::config::IdentifyConfig;
use crate::connection::{
    Connection, ConnectionManager, ProtocolHandler, Registrar, StreamLimits, Substream,
};
use crate::events::HostEvent;
use crate::reconcile::{self, ReconcileMode};

/// Per-call options for an initiator exchange.
#[derive(Default)]
pub struct IdentifyOptions {
    /// Caller-supplied cancel signal. Replaces the internal timeout.
    pub cancel: Option<CancellationToken>,
}

/// The identify engine. Created once with a fixed configuration and host
/// identity, started once, stopped once.
pub struct Identify {
    inner: Arc<Inner>,
    shutdown: broadcast::Sender<()>,
    coupler: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

struct Inner {
    config: IdentifyConfig,
    host: HostIdentity,
    store: Arc<dyn PeerStore>,
    addr_mgr: Arc<dyn AddressManager>,
    conn_mgr: Arc<dyn ConnectionManager>,
    registrar: Arc<dyn Registrar>,
    events: broadcast::Sender<HostEvent>,
    identify_protocol: String,
    push_protocol: String,
}

impl Identify {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: IdentifyConfig,
        host: HostIdentity,
        store: Arc<dyn PeerStore>,
        addr_mgr: Arc<dyn AddressManager>,
        conn_mgr: Arc<dyn ConnectionManager>,
        registrar: Arc<dyn Registrar>,
        events: broadcast::Sender<HostEvent>,
    ) -> Self {
        let identify_protocol = config.identify_protocol();
        let push_protocol = config.push_protocol();
        Self {
            inner: Arc::new(Inner {
                config,
                host,
                store,
                addr_mgr,
                conn_mgr,
                registrar,
                events,
                identify_protocol,
                push_protocol,
            }),
            shutdown: broadcast::channel(1).0,
            coupler: Mutex::new(None),
        }
    }

    /// Protocol id served by the identify responder.
    pub fn identify_protocol(&self) -> &str {
        &self.inner.identify_protocol
    }

    /// Protocol id served by the push responder.
    pub fn push_protocol(&self) -> &str {
        &self.inner.push_protocol
    }

    /// Seed local metadata, register both responders, and start the event
    /// coupler.
    pub async fn start(&self) {
        let mut coupler = self.coupler.lock().await;
        if coupler.is_some() {
            tracing::warn!("identify: already started");
            return;
        }

        let inner = &self.inner;
        let local = inner.host.peer_id();
        inner.store.set_metadata(
            &local,
            AGENT_VERSION_KEY,
            inner.host.agent_version().as_bytes().to_vec(),
        );
        inner.store.set_metadata(
            &local,
            PROTOCOL_VERSION_KEY,
            inner.host.protocol_version().as_bytes().to_vec(),
        );

        let identify_inner = Arc::clone(inner);
        let identify_handler: ProtocolHandler = Arc::new(move |stream, conn| {
            let inner = Arc::clone(&identify_inner);
            let fut: BoxFuture<'static, ()> =
                Box::pin(async move { inner.handle_identify(stream, conn).await });
            fut
        });
        inner.registrar.handle(
            &inner.identify_protocol,
            identify_handler,
            StreamLimits {
                max_inbound: inner.config.max_inbound_streams,
                max_outbound: inner.config.max_outbound_streams,
            },
        );

        let push_inner = Arc::clone(inner);
        let push_handler: ProtocolHandler = Arc::new(move |stream, conn| {
            let inner = Arc::clone(&push_inner);
            let fut: BoxFuture<'static, ()> =
                Box::pin(async move { inner.handle_push(stream, conn).await });
            fut
        });
        inner.registrar.handle(
            &inner.push_protocol,
            push_handler,
            StreamLimits {
                max_inbound: inner.config.max_push_incoming_streams,
                max_outbound: inner.config.max_push_outgoing_streams,
            },
        );

        let events = inner.events.subscribe();
        let shutdown = self.shutdown.subscribe();
        let coupler_inner = Arc::clone(inner);
        *coupler = Some(tokio::spawn(coupler_loop(coupler_inner, events, shutdown)));

        tracing::info!(
            peer_id = %local,
            identify = %inner.identify_protocol,
            push = %inner.push_protocol,
            "identify: engine started"
        );
    }

    /// Unregister both responders and stop the event coupler. In-flight
    /// exchanges die with their own deadlines.
    pub async fn stop(&self) {
        self.inner.registrar.unhandle(&self.inner.identify_protocol);
        self.inner.registrar.unhandle(&self.inner.push_protocol);
        let _ = self.shutdown.send(());
        if let Some(handle) = self.coupler.lock().await.take() {
            let _ = handle.await;
        }
        tracing::info!("identify: engine stopped");
    }

    /// Run one identify exchange against `connection` as the initiator.
    pub async fn identify(
        &self,
        connection: Arc<dyn Connection>,
        options: IdentifyOptions,
    ) -> Result<(), ProtocolError> {
        self.inner.identify(connection, options).await
    }

    /// Send the current identity to each connection, in parallel. Per-peer
    /// failures are logged, not surfaced.
    pub async fn push(&self, connections: Vec<Arc<dyn Connection>>) -> Result<(), ProtocolError> {
        self.inner.push(connections).await
    }

    /// Push to every connected peer that advertises the push protocol.
    pub async fn push_to_peer_store(&self) -> Result<(), ProtocolError> {
        self.inner.push_to_peer_store().await
    }
}

impl Inner {
    async fn identify(
        &self,
        connection: Arc<dyn Connection>,
        options: IdentifyOptions,
    ) -> Result<(), ProtocolError> {
        let remote = connection.remote_peer();
        tracing::debug!(%remote, "identify: opening exchange");

        // The deadline covers the whole exchange, substream open included;
        // abandoning the future drops (and thereby closes) the stream.
        let exchange = self.run_identify_exchange(&connection);
        let result = match options.cancel {
            Some(cancel) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(ProtocolError::Cancelled),
                    res = exchange => res,
                }
            }
            None => match tokio::time::timeout(self.config.timeout(), exchange).await {
                Ok(res) => res,
                Err(_) => Err(ProtocolError::Timeout),
            },
        };

        if let Err(err) = &result {
            tracing::debug!(%remote, "identify: exchange failed: {err}");
        }
        result
    }

    async fn run_identify_exchange(
        &self,
        connection: &Arc<dyn Connection>,
    ) -> Result<(), ProtocolError> {
        let mut stream = connection.open_stream(&self.identify_protocol).await?;
        let result = self.read_identify_response(&mut stream, connection).await;
        let _ = stream.shutdown().await;
        result
    }

    async fn read_identify_response(
        &self,
        stream: &mut Substream,
        connection: &Arc<dyn Connection>,
    ) -> Result<(), ProtocolError> {
        let msg = read_message(stream, self.config.max_identify_message_size).await?;

        let key_bytes = msg
            .public_key
            .as_deref()
            .filter(|bytes| !bytes.is_empty())
            .ok_or(ProtocolError::MissingPublicKey)?;
        let public_key = PublicKey::try_decode_protobuf(key_bytes)
            .map_err(|e| ProtocolError::InvalidMessage(format!("public key: {e}")))?;

        let derived = public_key.to_peer_id();
        let remote = connection.remote_peer();
        if derived != remote {
            return Err(ProtocolError::InvalidPeer(format!(
                "public key derives {derived}, connection carries {remote}"
            )));
        }
        if derived == self.host.peer_id() {
            return Err(ProtocolError::InvalidPeer(
                "identify answered with the local peer id".into(),
            ));
        }

        tracing::debug!(
            %remote,
            agent = msg.agent_version.as_deref().unwrap_or(""),
            listen_addrs = msg.listen_addrs.len(),
            protocols = msg.protocols.len(),
            "identify: identity received"
        );
        reconcile::apply(
            self.store.as_ref(),
            self.addr_mgr.as_ref(),
            remote,
            &msg,
            ReconcileMode::Identify,
            self.config.max_observed_addresses,
        );
        Ok(())
    }

    /// Identify responder: write the current identity as one frame.
    async fn handle_identify(&self, mut stream: Substream, connection: Arc<dyn Connection>) {
        let remote = connection.remote_peer();
        let msg = self.build_identify_message(&connection);
        match tokio::time::timeout(self.config.timeout(), write_message(&mut stream, &msg)).await {
            Ok(Ok(())) => tracing::debug!(%remote, "identify: served identity"),
            Ok(Err(err)) => tracing::debug!(%remote, "identify: responder write failed: {err}"),
            Err(_) => tracing::debug!(%remote, "identify: responder timed out"),
        }
        let _ = stream.shutdown().await;
    }

    /// Push responder: read one frame and reconcile it.
    async fn handle_push(&self, mut stream: Substream, connection: Arc<dyn Connection>) {
        let remote = connection.remote_peer();
        if remote == self.host.peer_id() {
            tracing::warn!(%remote, "push: frame from the local peer id, dropped");
            let _ = stream.shutdown().await;
            return;
        }

        let read = read_message(&mut stream, self.config.max_identify_message_size);
        let msg = match tokio::time::timeout(self.config.timeout(), read).await {
            Ok(Ok(msg)) => msg,
            Ok(Err(err)) => {
                tracing::debug!(%remote, "push: read failed: {err}");
                let _ = stream.shutdown().await;
                return;
            }
            Err(_) => {
                tracing::debug!(%remote, "push: timed out");
                let _ = stream.shutdown().await;
                return;
            }
        };
        let _ = stream.shutdown().await;

        tracing::debug!(
            %remote,
            listen_addrs = msg.listen_addrs.len(),
            protocols = msg.protocols.len(),
            "push: identity update received"
        );
        reconcile::apply(
            self.store.as_ref(),
            self.addr_mgr.as_ref(),
            remote,
            &msg,
            ReconcileMode::Push,
            self.config.max_observed_addresses,
        );
    }

    async fn push(&self, connections: Vec<Arc<dyn Connection>>) -> Result<(), ProtocolError> {
        if connections.is_empty() {
            return Ok(());
        }
        let msg = self.build_push_message();
        let msg_ref = &msg;
        let pushes = connections.iter().map(|connection| async move {
            let remote = connection.remote_peer();
            match self.push_one(connection, msg_ref).await {
                Ok(()) => tracing::debug!(%remote, "push: identity update sent"),
                Err(err) => tracing::debug!(%remote, "push: failed: {err}"),
            }
        });
        join_all(pushes).await;
        Ok(())
    }

    async fn push_one(
        &self,
        connection: &Arc<dyn Connection>,
        msg: &IdentifyMessage,
    ) -> Result<(), ProtocolError> {
        let work = async {
            let mut stream = connection.open_stream(&self.push_protocol).await?;
            let result = write_message(&mut stream, msg).await;
            let _ = stream.shutdown().await;
            result
        };
        match tokio::time::timeout(self.config.timeout(), work).await {
            Ok(res) => res,
            Err(_) => Err(ProtocolError::Timeout),
        }
    }

    async fn push_to_peer_store(&self) -> Result<(), ProtocolError> {
        let connections: Vec<Arc<dyn Connection>> = self
            .conn_mgr
            .connections()
            .into_iter()
            .filter(|conn| {
                self.store
                    .protocols(&conn.remote_peer())
                    .iter()
                    .any(|p| p == &self.push_protocol)
            })
            .collect();
        if connections.is_empty() {
            tracing::debug!("push: no connected peers advertise the push protocol");
            return Ok(());
        }
        tracing::debug!(peers = connections.len(), "push: broadcasting identity");
        self.push(connections).await
    }

    /// Full identity record served to identify initiators.
    fn build_identify_message(&self, connection: &Arc<dyn Connection>) -> IdentifyMessage {
        let local = self.host.peer_id();
        let listen_addrs: Vec<Multiaddr> = self
            .addr_mgr
            .addresses()
            .iter()
            .map(strip_p2p_suffix)
            .collect();
        let signed_peer_record = self.local_envelope(&listen_addrs);
        IdentifyMessage {
            public_key: Some(self.host.public_key().encode_protobuf()),
            listen_addrs: listen_addrs.iter().map(|a| a.to_vec()).collect(),
            protocols: self.store.protocols(&local),
            observed_addr: Some(connection.remote_addr().to_vec()),
            protocol_version: Some(self.host.protocol_version().to_string()),
            agent_version: Some(self.host.agent_version().to_string()),
            signed_peer_record: signed_peer_record.map(|e| e.to_bytes()),
        }
    }

    /// Reduced record broadcast by push: envelope, listen addresses,
    /// protocols.
    fn build_push_message(&self) -> IdentifyMessage {
        let local = self.host.peer_id();
        let listen_addrs: Vec<Multiaddr> = self
            .addr_mgr
            .addresses()
            .iter()
            .map(strip_p2p_suffix)
            .collect();
        IdentifyMessage {
            listen_addrs: listen_addrs.iter().map(|a| a.to_vec()).collect(),
            protocols: self.store.protocols(&local),
            signed_peer_record: self.local_envelope(&listen_addrs).map(|e| e.to_bytes()),
            ..Default::default()
        }
    }

    /// The stored self envelope, or a freshly minted one when this node has
    /// listen addresses but no record yet. The fresh envelope is persisted
    /// through the store's normal consume path.
    fn local_envelope(&self, listen_addrs: &[Multiaddr]) -> Option<Envelope> {
        let local = self.host.peer_id();
        if let Some(envelope) = self.store.envelope(&local) {
            return Some(envelope);
        }
        if listen_addrs.is_empty() {
            return None;
        }
        let record = PeerRecord::new(local, unix_millis(), listen_addrs.to_vec());
        match Envelope::seal(&record, self.host.keypair()) {
            Ok(envelope) => {
                if let Err(err) = self.store.consume_peer_record(&envelope) {
                    tracing::debug!("identify: could not persist fresh self record: {err}");
                }
                Some(envelope)
            }
            Err(err) => {
                tracing::warn!("identify: sealing self record failed: {err}");
                None
            }
        }
    }
}

/// Couples host events to protocol invocations until shutdown.
async fn coupler_loop(
    inner: Arc<Inner>,
    mut events: broadcast::Receiver<HostEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(HostEvent::ConnectionEstablished { connection }) => {
                    if !inner.config.run_on_connect {
                        continue;
                    }
                    let inner = Arc::clone(&inner);
                    tokio::spawn(async move {
                        let remote = connection.remote_peer();
                        if let Err(err) =
                            inner.identify(connection, IdentifyOptions::default()).await
                        {
                            tracing::warn!(%remote, "identify: automatic exchange failed: {err}");
                        }
                    });
                }
                Ok(HostEvent::ListenAddrsChanged { peer })
                | Ok(HostEvent::ProtocolsChanged { peer }) => {
                    if peer != inner.host.peer_id() {
                        continue;
                    }
                    let inner = Arc::clone(&inner);
                    tokio::spawn(async move {
                        let _ = inner.push_to_peer_store().await;
                    });
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "identify: event subscriber lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.recv() => break,
        }
    }
}

/// Strip a trailing `/p2p/<id>` component from a listen address.
fn strip_p2p_suffix(addr: &Multiaddr) -> Multiaddr {
    if matches!(addr.iter().last(), Some(Protocol::P2p(_))) {
        addr.iter().take(addr.iter().count() - 1).collect()
    } else {
        addr.clone()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
