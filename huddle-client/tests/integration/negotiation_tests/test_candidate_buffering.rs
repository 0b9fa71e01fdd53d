use huddle_client::{CallPhase, NegotiationState};
use huddle_core::{CallKind, ClientSignal, IceCandidate, RelaySignal, TrackKind};

use crate::integration::{caller, create_test_controller, init_tracing};
use crate::utils::fake_sdp;

#[tokio::test]
async fn test_candidates_before_offer_are_applied_in_order() {
    init_tracing();

    let ctl = create_test_controller().await;
    let alice = caller("alice");
    let peer = alice.participant_id.clone();

    ctl.relay(RelaySignal::IncomingCall {
        from: alice.clone(),
        kind: CallKind::Audio,
    })
    .await;
    ctl.wait_until(1000, |s| s.phase == CallPhase::RingingIn)
        .await;
    ctl.handle.accept_call().await.unwrap();
    ctl.wait_until(2000, |s| s.session(&peer).is_some()).await;

    assert!(ctl.signaling.sent().contains(&ClientSignal::AcceptCall {
        to: peer.clone()
    }));

    let first = IceCandidate::new("candidate:1 1 udp 1 10.0.0.2 5000 typ host");
    let second = IceCandidate::new("candidate:2 1 udp 1 10.0.0.2 5001 typ host");
    for candidate in [first.clone(), second.clone()] {
        ctl.relay(RelaySignal::IceCandidate {
            from: peer.clone(),
            candidate,
        })
        .await;
    }

    let s = ctl
        .wait_until(1000, |s| {
            s.session(&peer).is_some_and(|x| x.pending_candidates == 2)
        })
        .await;
    let session = s.session(&peer).unwrap();
    assert_eq!(session.state, NegotiationState::New);
    assert_eq!(session.applied_candidates, 0);

    ctl.relay(RelaySignal::Offer {
        from: peer.clone(),
        sdp: fake_sdp("offer", &[TrackKind::Audio], false),
    })
    .await;

    let s = ctl
        .wait_until(1000, |s| {
            s.session(&peer)
                .is_some_and(|x| x.state == NegotiationState::Stable)
        })
        .await;
    let session = s.session(&peer).unwrap();
    assert_eq!(session.pending_candidates, 0);
    assert_eq!(session.applied_candidates, 2);

    let connection = ctl.factory.connection(&peer).unwrap();
    assert_eq!(connection.applied_candidates(), vec![first, second]);

    // The answer went out after the remote description was applied
    let ops = connection.ops();
    let set_remote = ops.iter().position(|op| op == "set-remote-offer").unwrap();
    let answer = ops.iter().position(|op| op == "create-answer").unwrap();
    assert!(set_remote < answer);
    assert!(
        ctl.signaling
            .sent()
            .iter()
            .any(|s| matches!(s, ClientSignal::Answer { to, .. } if *to == peer))
    );

    // Later candidates go straight in
    let third = IceCandidate::new("candidate:3 1 udp 1 10.0.0.2 5002 typ host");
    ctl.relay(RelaySignal::IceCandidate {
        from: peer.clone(),
        candidate: third.clone(),
    })
    .await;
    ctl.wait_until(1000, |s| {
        s.session(&peer).is_some_and(|x| x.applied_candidates == 3)
    })
    .await;
    assert_eq!(connection.applied_candidates().last(), Some(&third));
}

#[tokio::test]
async fn test_candidate_outside_call_is_ignored() {
    init_tracing();

    let ctl = create_test_controller().await;
    let alice = caller("alice");

    ctl.relay(RelaySignal::IceCandidate {
        from: alice.participant_id.clone(),
        candidate: IceCandidate::new("candidate:1 1 udp 1 10.0.0.2 5000 typ host"),
    })
    .await;

    let s = ctl.handle.snapshot().await.unwrap();
    assert!(s.sessions.is_empty());
    assert!(ctl.factory.created().is_empty());
}
