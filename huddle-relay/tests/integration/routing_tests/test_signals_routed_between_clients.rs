use huddle_core::{CallKind, ClientSignal, RelaySignal};

use crate::integration::init_tracing;
use crate::utils::{TestClient, start_relay};

#[tokio::test]
async fn test_call_setup_routed_between_clients() {
    init_tracing();

    let (addr, _service) = start_relay().await;
    let mut alice = TestClient::connect(addr, "alice").await.unwrap();
    let mut bob = TestClient::connect(addr, "bob").await.unwrap();

    alice
        .send(&ClientSignal::InitiateCall {
            to: "bob".to_string(),
            kind: CallKind::Audio,
        })
        .await
        .unwrap();

    let RelaySignal::IncomingCall { from, kind } = bob.recv(2000).await.unwrap() else {
        panic!("bob should be ringing");
    };
    assert_eq!(from.user, "alice");
    assert_eq!(from.participant_id, alice.participant_id);
    assert_eq!(kind, CallKind::Audio);

    bob.send(&ClientSignal::AcceptCall {
        to: from.participant_id.clone(),
    })
    .await
    .unwrap();

    let RelaySignal::CallAccepted { from } = alice.recv(2000).await.unwrap() else {
        panic!("alice should see the accept");
    };
    assert_eq!(from.participant_id, bob.participant_id);

    alice
        .send(&ClientSignal::Offer {
            to: bob.participant_id.clone(),
            sdp: "v=0".to_string(),
            reason: None,
        })
        .await
        .unwrap();

    assert_eq!(
        bob.recv(2000).await.unwrap(),
        RelaySignal::Offer {
            from: alice.participant_id.clone(),
            sdp: "v=0".to_string()
        }
    );
}

#[tokio::test]
async fn test_call_to_offline_user_reports_error() {
    init_tracing();

    let (addr, _service) = start_relay().await;
    let mut alice = TestClient::connect(addr, "alice").await.unwrap();

    alice
        .send(&ClientSignal::InitiateCall {
            to: "nobody".to_string(),
            kind: CallKind::Video,
        })
        .await
        .unwrap();

    let RelaySignal::Error { message } = alice.recv(2000).await.unwrap() else {
        panic!("expected an error");
    };
    assert!(message.contains("nobody"));
}
