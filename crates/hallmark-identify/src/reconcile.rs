//! Store reconciler -- applies a decoded identify view to the peer store and
//! address manager in a fixed order.
//!
//! Order: a consumable envelope supersedes legacy listen addresses;
//! protocols are always replaced; agent/protocol version metadata is written
//! when present; an observed address is offered to the address manager under
//! the retention cap, identify mode only.

use libp2p_identity::PeerId;
use multiaddr::Multiaddr;

use hallmark_protocol::IdentifyMessage;
use hallmark_record::{Envelope, PEER_RECORD_DOMAIN};
use hallmark_store::{AddressManager, PeerStore, AGENT_VERSION_KEY, PROTOCOL_VERSION_KEY};

/// Which role produced the message being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReconcileMode {
    Identify,
    Push,
}

/// Apply `msg` for remote peer `remote`. Returns `false` when the update was
/// discarded wholesale (push with a foreign envelope).
pub(crate) fn apply(
    store: &dyn PeerStore,
    addr_mgr: &dyn AddressManager,
    remote: PeerId,
    msg: &IdentifyMessage,
    mode: ReconcileMode,
    max_observed: usize,
) -> bool {
    // An envelope that verifies and names the connection's peer wins over
    // the legacy listen addresses.
    let mut envelope_won = false;
    if let Some(bytes) = &msg.signed_peer_record {
        match Envelope::open_and_certify(bytes, PEER_RECORD_DOMAIN) {
            Ok(envelope) if envelope.peer_id() == remote => {
                match store.consume_peer_record(&envelope) {
                    Ok(true) => {
                        envelope_won = true;
                        tracing::debug!(%remote, "identify: peer record consumed");
                    }
                    Ok(false) => {
                        tracing::debug!(%remote, "identify: stored peer record is newer");
                    }
                    Err(err) => {
                        tracing::debug!(%remote, "identify: peer record rejected: {err}");
                    }
                }
            }
            Ok(envelope) => {
                // A push vouched for by somebody else's envelope is dropped
                // outright, books untouched.
                if mode == ReconcileMode::Push {
                    tracing::warn!(
                        %remote,
                        envelope_peer = %envelope.peer_id(),
                        "push: envelope peer id mismatch, update dropped"
                    );
                    return false;
                }
                tracing::debug!(
                    %remote,
                    envelope_peer = %envelope.peer_id(),
                    "identify: envelope peer id mismatch, using listen addrs"
                );
            }
            Err(err) => {
                tracing::debug!(%remote, "identify: envelope rejected: {err}, using listen addrs");
            }
        }
    }

    if !envelope_won {
        let listen: Vec<Multiaddr> = msg
            .listen_addrs
            .iter()
            .filter_map(|bytes| match Multiaddr::try_from(bytes.clone()) {
                Ok(addr) => Some(addr),
                Err(err) => {
                    tracing::debug!(%remote, "identify: skipping unparseable listen addr: {err}");
                    None
                }
            })
            .collect();
        store.set_addresses(&remote, listen);
    }

    store.set_protocols(&remote, msg.protocols.clone());

    if let Some(agent) = &msg.agent_version {
        store.set_metadata(&remote, AGENT_VERSION_KEY, agent.as_bytes().to_vec());
    }
    if let Some(version) = &msg.protocol_version {
        store.set_metadata(&remote, PROTOCOL_VERSION_KEY, version.as_bytes().to_vec());
    }

    if mode == ReconcileMode::Identify {
        if let Some(bytes) = &msg.observed_addr {
            match Multiaddr::try_from(bytes.clone()) {
                Ok(observed) => {
                    if addr_mgr.observed_addresses().len() < max_observed {
                        addr_mgr.add_observed_address(observed);
                    } else {
                        tracing::debug!(%remote, "identify: observed address cap reached");
                    }
                }
                Err(err) => {
                    tracing::debug!(%remote, "identify: unparseable observed addr: {err}");
                }
            }
        }
    }

    true
}
