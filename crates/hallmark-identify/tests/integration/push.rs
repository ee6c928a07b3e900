//! Identify-push: proactive broadcast of local identity changes, the push
//! peer-id gate, and observed-address bounds.

use std::time::Duration;

use libp2p_identity::Keypair;
use multiaddr::Multiaddr;
use tokio::io::AsyncWriteExt;

use hallmark_identify::IdentifyConfig;
use hallmark_protocol::codec::encode_frame;
use hallmark_protocol::IdentifyMessage;
use hallmark_record::{Envelope, PeerRecord};
use hallmark_store::{AddressManager, PeerStore};

use crate::harness::{
    connect, connect_with_addrs, store_is_empty_for, wait_until, CannedConnection, TestHost,
};

fn ma(s: &str) -> Multiaddr {
    s.parse().unwrap()
}

#[tokio::test]
async fn test_push_updates_addresses() {
    let a = TestHost::new();
    let b = TestHost::new();
    b.engine.start().await;

    let (ab, _ba) = connect(&a, &b);
    let a_id = a.peer_id();

    // B already holds an old record for A.
    let old = PeerRecord::new(a_id, 1, vec![ma("/ip4/10.0.0.1/tcp/4001")]);
    let old = Envelope::seal(&old, a.identity.keypair()).unwrap();
    assert!(b.store.consume_peer_record(&old).unwrap());

    // A gains a new listen address and broadcasts it.
    a.listen_on("/ip4/10.0.0.3/tcp/4001");
    a.support_protocols(&["/chat/1"]);
    a.engine.push(vec![ab]).await.unwrap();

    assert!(
        wait_until(
            || b.store.addresses(&a_id) == vec![ma("/ip4/10.0.0.3/tcp/4001")],
            Duration::from_secs(2),
        )
        .await,
        "push did not update B's addresses for A"
    );
    assert_eq!(b.store.protocols(&a_id), vec!["/chat/1".to_string()]);
}

#[tokio::test]
async fn test_push_to_peer_store_filters_by_protocol() {
    let a = TestHost::new();
    let b = TestHost::new();
    let c = TestHost::new();
    b.engine.start().await;

    let (_, _) = connect_with_addrs(&a, &b, "/ip4/127.0.0.1/tcp/1", "/ip4/127.0.0.1/tcp/2");
    let (_, _) = connect_with_addrs(&a, &c, "/ip4/127.0.0.1/tcp/1", "/ip4/127.0.0.1/tcp/3");

    // A's proto book: B advertises push, C does not.
    let push_proto = a.engine.push_protocol().to_string();
    a.store.set_protocols(&b.peer_id(), vec![push_proto]);
    a.store.set_protocols(&c.peer_id(), vec!["/chat/1".into()]);

    a.listen_on("/ip4/10.0.0.1/tcp/4001");
    a.engine.push_to_peer_store().await.unwrap();

    let a_id = a.peer_id();
    assert!(
        wait_until(
            || !b.store.addresses(&a_id).is_empty(),
            Duration::from_secs(2)
        )
        .await,
        "push-capable peer was not updated"
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store_is_empty_for(&c.store, &a_id));
}

#[tokio::test]
async fn test_observed_addresses_capped() {
    let b = TestHost::with_config(IdentifyConfig {
        max_observed_addresses: 1,
        ..Default::default()
    });
    let a1 = TestHost::new();
    let a2 = TestHost::new();
    a1.listen_on("/ip4/10.0.0.1/tcp/4001");
    a2.listen_on("/ip4/10.0.0.2/tcp/4001");
    a1.engine.start().await;
    a2.engine.start().await;

    // Two peers each report a different observed address for B.
    let (_, b_to_a1) = connect_with_addrs(
        &a1,
        &b,
        "/ip4/198.51.100.1/tcp/4001",
        "/ip4/203.0.113.1/tcp/4001",
    );
    let (_, b_to_a2) = connect_with_addrs(
        &a2,
        &b,
        "/ip4/198.51.100.2/tcp/4001",
        "/ip4/203.0.113.2/tcp/4001",
    );

    b.engine.identify(b_to_a1, Default::default()).await.unwrap();
    b.engine.identify(b_to_a2, Default::default()).await.unwrap();

    // Exactly one observation retained; the second is dropped silently.
    assert_eq!(
        b.addr_mgr.observed_addresses(),
        vec![ma("/ip4/203.0.113.1/tcp/4001")]
    );
}

#[tokio::test]
async fn test_push_with_foreign_envelope_dropped() {
    let b = TestHost::new();
    b.engine.start().await;

    let a_key = Keypair::generate_ed25519();
    let mallory = Keypair::generate_ed25519().public().to_peer_id();

    // Mallory replays A's envelope from its own connection.
    let record = PeerRecord::new(
        a_key.public().to_peer_id(),
        9,
        vec![ma("/ip4/203.0.113.9/tcp/4001")],
    );
    let envelope = Envelope::seal(&record, &a_key).unwrap();
    let msg = IdentifyMessage {
        listen_addrs: vec![ma("/ip4/203.0.113.9/tcp/4001").to_vec()],
        protocols: vec!["/chat/1".into()],
        signed_peer_record: Some(envelope.to_bytes()),
        ..Default::default()
    };

    let (mut near, far) = tokio::io::duplex(4096);
    let conn = CannedConnection::new(mallory, Vec::new());
    assert!(b
        .registrar
        .dispatch(b.engine.push_protocol(), Box::new(far), conn));
    near.write_all(&encode_frame(&msg)).await.unwrap();
    near.shutdown().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store_is_empty_for(&b.store, &mallory));
    assert!(store_is_empty_for(&b.store, &a_key.public().to_peer_id()));
}

#[tokio::test]
async fn test_push_from_local_peer_dropped() {
    let b = TestHost::new();
    b.engine.start().await;
    let b_id = b.peer_id();

    let msg = IdentifyMessage {
        listen_addrs: vec![ma("/ip4/203.0.113.9/tcp/4001").to_vec()],
        ..Default::default()
    };

    let (mut near, far) = tokio::io::duplex(4096);
    let conn = CannedConnection::new(b_id, Vec::new());
    assert!(b
        .registrar
        .dispatch(b.engine.push_protocol(), Box::new(far), conn));
    near.write_all(&encode_frame(&msg)).await.unwrap();
    near.shutdown().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(b.store.addresses(&b_id).is_empty());
}

#[tokio::test]
async fn test_push_to_unregistered_responder_is_logged_not_fatal() {
    let a = TestHost::new();
    let c = TestHost::new(); // never started: push protocol unregistered

    let (ac, _) = connect(&a, &c);
    a.listen_on("/ip4/10.0.0.1/tcp/4001");

    // Best-effort: the failed stream open is swallowed.
    a.engine.push(vec![ac]).await.unwrap();
    assert!(store_is_empty_for(&c.store, &a.peer_id()));
}
