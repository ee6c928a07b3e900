//! Initiator-side identify exchanges: the happy path, legacy peers, and the
//! rejection matrix (mismatched keys, oversize frames, timeouts, cancels).

use std::time::Duration;

use libp2p_identity::Keypair;
use multiaddr::Multiaddr;
use tokio_util::sync::CancellationToken;

use hallmark_identify::{IdentifyConfig, IdentifyOptions, ProtocolError};
use hallmark_protocol::codec::encode_frame;
use hallmark_protocol::IdentifyMessage;
use hallmark_record::{Envelope, PeerRecord};
use hallmark_store::{AddressManager, PeerStore, AGENT_VERSION_KEY, PROTOCOL_VERSION_KEY};

use crate::harness::{
    connect, store_is_empty_for, CannedConnection, HangingConnection, StalledConnection, TestHost,
};

fn ma(s: &str) -> Multiaddr {
    s.parse().unwrap()
}

/// A well-formed identify response for `keypair`, without an envelope.
fn legacy_message(keypair: &Keypair, listen: &[&str]) -> IdentifyMessage {
    IdentifyMessage {
        public_key: Some(keypair.public().encode_protobuf()),
        listen_addrs: listen.iter().map(|s| ma(s).to_vec()).collect(),
        protocols: vec!["/chat/1".into(), "/ping/1".into()],
        observed_addr: None,
        protocol_version: Some("ipfs/0.1.0".into()),
        agent_version: Some("a/1".into()),
        signed_peer_record: None,
    }
}

#[tokio::test]
async fn test_happy_path_with_envelope() {
    let a = TestHost::with_config(IdentifyConfig {
        agent_version: "a/1".into(),
        ..Default::default()
    });
    let b = TestHost::new();

    a.listen_on("/ip4/10.0.0.1/tcp/4001");
    a.support_protocols(&["/chat/1", "/ping/1"]);
    a.engine.start().await;

    let (_ab, ba) = connect(&a, &b);
    b.engine
        .identify(ba, IdentifyOptions::default())
        .await
        .unwrap();

    let a_id = a.peer_id();
    assert_eq!(b.store.addresses(&a_id), vec![ma("/ip4/10.0.0.1/tcp/4001")]);
    // The addresses came through a consumed envelope, not the legacy path.
    assert!(b.store.envelope(&a_id).is_some());
    assert_eq!(
        b.store.protocols(&a_id),
        vec!["/chat/1".to_string(), "/ping/1".to_string()]
    );
    assert_eq!(
        b.store.metadata(&a_id, AGENT_VERSION_KEY),
        Some(b"a/1".to_vec())
    );
    assert!(b.store.metadata(&a_id, PROTOCOL_VERSION_KEY).is_some());
    // B learned how A sees it.
    assert_eq!(
        b.addr_mgr.observed_addresses(),
        vec![ma("/ip4/127.0.0.1/tcp/4002")]
    );
}

#[tokio::test]
async fn test_legacy_peer_without_envelope() {
    let b = TestHost::new();
    let keypair = Keypair::generate_ed25519();
    let remote = keypair.public().to_peer_id();

    let msg = legacy_message(&keypair, &["/ip4/10.0.0.2/tcp/4001"]);
    let conn = CannedConnection::new(remote, encode_frame(&msg));

    b.engine
        .identify(conn, IdentifyOptions::default())
        .await
        .unwrap();

    assert_eq!(b.store.addresses(&remote), vec![ma("/ip4/10.0.0.2/tcp/4001")]);
    assert!(b.store.envelope(&remote).is_none());
    assert_eq!(
        b.store.metadata(&remote, AGENT_VERSION_KEY),
        Some(b"a/1".to_vec())
    );
}

#[tokio::test]
async fn test_peer_id_mismatch_rejected() {
    let b = TestHost::new();
    let claimed = Keypair::generate_ed25519().public().to_peer_id();
    let actual_key = Keypair::generate_ed25519();

    let msg = legacy_message(&actual_key, &["/ip4/10.0.0.2/tcp/4001"]);
    let conn = CannedConnection::new(claimed, encode_frame(&msg));

    match b.engine.identify(conn, IdentifyOptions::default()).await {
        Err(ProtocolError::InvalidPeer(_)) => {}
        other => panic!("expected InvalidPeer, got {other:?}"),
    }
    assert!(store_is_empty_for(&b.store, &claimed));
    assert!(store_is_empty_for(
        &b.store,
        &actual_key.public().to_peer_id()
    ));
}

#[tokio::test]
async fn test_self_identify_rejected() {
    let b = TestHost::new();
    let own = b.identity.keypair().clone();

    let msg = legacy_message(&own, &["/ip4/10.0.0.2/tcp/4001"]);
    let conn = CannedConnection::new(b.peer_id(), encode_frame(&msg));

    match b.engine.identify(conn, IdentifyOptions::default()).await {
        Err(ProtocolError::InvalidPeer(_)) => {}
        other => panic!("expected InvalidPeer, got {other:?}"),
    }
    assert!(b.store.addresses(&b.peer_id()).is_empty());
}

#[tokio::test]
async fn test_missing_public_key_rejected() {
    let b = TestHost::new();
    let remote = Keypair::generate_ed25519().public().to_peer_id();

    let msg = IdentifyMessage {
        listen_addrs: vec![ma("/ip4/10.0.0.2/tcp/4001").to_vec()],
        ..Default::default()
    };
    let conn = CannedConnection::new(remote, encode_frame(&msg));

    match b.engine.identify(conn, IdentifyOptions::default()).await {
        Err(ProtocolError::MissingPublicKey) => {}
        other => panic!("expected MissingPublicKey, got {other:?}"),
    }
    assert!(store_is_empty_for(&b.store, &remote));
}

#[tokio::test]
async fn test_oversize_frame_rejected() {
    let b = TestHost::new();
    let remote = Keypair::generate_ed25519().public().to_peer_id();

    // Varint prefix declaring 9000 bytes, then a sliver of garbage.
    let mut frame = vec![0xa8, 0x46];
    frame.extend_from_slice(&[0u8; 64]);
    let conn = CannedConnection::new(remote, frame);

    match b.engine.identify(conn, IdentifyOptions::default()).await {
        Err(ProtocolError::MessageTooLarge { size: 9000, max }) => {
            assert_eq!(max, 8192);
        }
        other => panic!("expected MessageTooLarge, got {other:?}"),
    }
    assert!(store_is_empty_for(&b.store, &remote));
}

#[tokio::test]
async fn test_broken_envelope_falls_back_to_listen_addrs() {
    let b = TestHost::new();
    let keypair = Keypair::generate_ed25519();
    let remote = keypair.public().to_peer_id();

    // Envelope sealed by an unrelated key: it opens, but its peer id is not
    // the connection's peer, so the exchange downgrades to legacy addresses.
    let foreign = Keypair::generate_ed25519();
    let record = PeerRecord::new(
        foreign.public().to_peer_id(),
        1,
        vec![ma("/ip4/203.0.113.5/tcp/4001")],
    );
    let envelope = Envelope::seal(&record, &foreign).unwrap();

    let mut msg = legacy_message(&keypair, &["/ip4/10.0.0.2/tcp/4001"]);
    msg.signed_peer_record = Some(envelope.to_bytes());
    let conn = CannedConnection::new(remote, encode_frame(&msg));

    b.engine
        .identify(conn, IdentifyOptions::default())
        .await
        .unwrap();

    assert_eq!(b.store.addresses(&remote), vec![ma("/ip4/10.0.0.2/tcp/4001")]);
    assert!(b.store.envelope(&remote).is_none());
    // Protocols and metadata still land despite the envelope downgrade.
    assert_eq!(
        b.store.protocols(&remote),
        vec!["/chat/1".to_string(), "/ping/1".to_string()]
    );
}

#[tokio::test]
async fn test_poisoned_peer_record_does_not_touch_victim() {
    let b = TestHost::new();
    let keypair = Keypair::generate_ed25519();
    let remote = keypair.public().to_peer_id();
    let victim = Keypair::generate_ed25519().public().to_peer_id();

    // The responder signs with its own key but names a victim inside the
    // record -- a poisoning attempt under a valid signature.
    let record = PeerRecord::new(victim, 7, vec![ma("/ip4/203.0.113.9/tcp/4001")]);
    let envelope = Envelope::seal(&record, &keypair).unwrap();

    let mut msg = legacy_message(&keypair, &["/ip4/10.0.0.2/tcp/4001"]);
    msg.signed_peer_record = Some(envelope.to_bytes());
    let conn = CannedConnection::new(remote, encode_frame(&msg));

    b.engine
        .identify(conn, IdentifyOptions::default())
        .await
        .unwrap();

    assert!(store_is_empty_for(&b.store, &victim));
    assert_eq!(b.store.addresses(&remote), vec![ma("/ip4/10.0.0.2/tcp/4001")]);
    assert!(b.store.envelope(&remote).is_none());
}

#[tokio::test]
async fn test_empty_response_is_connection_ended() {
    let b = TestHost::new();
    let remote = Keypair::generate_ed25519().public().to_peer_id();
    let conn = CannedConnection::new(remote, Vec::new());

    match b.engine.identify(conn, IdentifyOptions::default()).await {
        Err(ProtocolError::ConnectionEnded) => {}
        other => panic!("expected ConnectionEnded, got {other:?}"),
    }
}

#[tokio::test]
async fn test_silent_responder_times_out() {
    let b = TestHost::with_config(IdentifyConfig {
        timeout_ms: 100,
        ..Default::default()
    });
    let remote = Keypair::generate_ed25519().public().to_peer_id();
    let conn = HangingConnection::new(remote);

    match b.engine.identify(conn, IdentifyOptions::default()).await {
        Err(ProtocolError::Timeout) => {}
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_hanging_stream_open_times_out() {
    let b = TestHost::with_config(IdentifyConfig {
        timeout_ms: 100,
        ..Default::default()
    });
    let remote = Keypair::generate_ed25519().public().to_peer_id();
    let conn = StalledConnection::new(remote);

    match b.engine.identify(conn, IdentifyOptions::default()).await {
        Err(ProtocolError::Timeout) => {}
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_hanging_stream_open_cancelled() {
    let b = TestHost::with_config(IdentifyConfig {
        timeout_ms: 30_000,
        ..Default::default()
    });
    let remote = Keypair::generate_ed25519().public().to_peer_id();
    let conn = StalledConnection::new(remote);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let options = IdentifyOptions {
        cancel: Some(cancel),
    };
    match b.engine.identify(conn, options).await {
        Err(ProtocolError::Cancelled) => {}
        other => panic!("expected Cancelled, got {other:?}"),
    }
}

#[tokio::test]
async fn test_caller_cancel_replaces_timeout() {
    // Generous internal timeout; the caller's token fires first.
    let b = TestHost::with_config(IdentifyConfig {
        timeout_ms: 30_000,
        ..Default::default()
    });
    let remote = Keypair::generate_ed25519().public().to_peer_id();
    let conn = HangingConnection::new(remote);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let options = IdentifyOptions {
        cancel: Some(cancel),
    };
    match b.engine.identify(conn, options).await {
        Err(ProtocolError::Cancelled) => {}
        other => panic!("expected Cancelled, got {other:?}"),
    }
}
