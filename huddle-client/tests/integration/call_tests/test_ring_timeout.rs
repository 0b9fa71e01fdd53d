use huddle_client::CallPhase;
use huddle_core::{CallKind, ClientSignal, RelaySignal};
use std::time::Duration;

use crate::integration::{caller, create_test_controller, init_tracing};
use crate::utils::SinkEvent;

#[tokio::test(start_paused = true)]
async fn test_unanswered_call_is_rejected_after_timeout() {
    init_tracing();

    let ctl = create_test_controller().await;
    let alice = caller("alice");

    ctl.relay(RelaySignal::IncomingCall {
        from: alice.clone(),
        kind: CallKind::Video,
    })
    .await;
    ctl.wait_until(1000, |s| s.phase == CallPhase::RingingIn)
        .await;
    assert!(
        ctl.sink
            .contains(&SinkEvent::IncomingCall(alice.clone(), CallKind::Video))
    );

    tokio::time::advance(Duration::from_secs(25)).await;
    assert_eq!(ctl.handle.snapshot().await.unwrap().phase, CallPhase::RingingIn);

    tokio::time::advance(Duration::from_secs(6)).await;
    let s = ctl.wait_until(1000, |s| s.phase == CallPhase::Idle).await;

    assert!(s.incoming.is_none());
    assert!(ctl.signaling.sent().contains(&ClientSignal::RejectCall {
        to: alice.participant_id.clone()
    }));
    // Media is only captured once the user accepts
    assert!(ctl.capture.requests().is_empty());
}

#[tokio::test]
async fn test_caller_hang_up_stops_ringing() {
    init_tracing();

    let ctl = create_test_controller().await;
    let alice = caller("alice");

    ctl.relay(RelaySignal::IncomingCall {
        from: alice.clone(),
        kind: CallKind::Audio,
    })
    .await;
    ctl.wait_until(1000, |s| s.phase == CallPhase::RingingIn)
        .await;

    ctl.relay(RelaySignal::CallEnded {
        from: alice.participant_id.clone(),
    })
    .await;
    let s = ctl.wait_until(1000, |s| s.phase == CallPhase::Idle).await;

    assert!(s.incoming.is_none());
    assert!(ctl.signaling.sent().is_empty());

    // Accepting afterwards does nothing
    ctl.handle.accept_call().await.unwrap();
    let s = ctl.handle.snapshot().await.unwrap();
    assert_eq!(s.phase, CallPhase::Idle);
    assert!(ctl.capture.requests().is_empty());
}
