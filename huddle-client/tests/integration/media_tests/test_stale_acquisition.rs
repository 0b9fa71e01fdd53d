use huddle_client::CallPhase;
use huddle_core::{CallKind, ClientSignal};
use std::time::Duration;

use crate::integration::{create_test_controller, init_tracing};

#[tokio::test]
async fn test_media_arriving_after_leave_is_released() {
    init_tracing();

    let ctl = create_test_controller().await;
    ctl.capture.hold();

    ctl.handle.join_voice("general").await.unwrap();
    ctl.wait_until(1000, |_| ctl.capture.requests().len() == 1)
        .await;
    ctl.handle.leave().await.unwrap();

    ctl.capture.release();
    ctl.wait_until(1000, |_| {
        let produced = ctl.capture.produced();
        produced.len() == 1 && !produced[0].is_live()
    })
    .await;

    let s = ctl.handle.snapshot().await.unwrap();
    assert_eq!(s.phase, CallPhase::Idle);
    assert!(s.call.is_none());
    assert!(s.media.microphone.is_none());
    assert!(
        !ctl.signaling
            .sent()
            .iter()
            .any(|s| matches!(s, ClientSignal::JoinVoice { .. }))
    );
}

#[tokio::test]
async fn test_call_can_start_after_cancelled_setup() {
    init_tracing();

    let ctl = create_test_controller().await;
    ctl.capture.hold();
    ctl.handle.join_voice("general").await.unwrap();
    ctl.wait_until(1000, |_| ctl.capture.requests().len() == 1)
        .await;
    ctl.handle.leave().await.unwrap();

    // The cancelled request no longer counts as busy
    ctl.handle
        .initiate_call("bob", CallKind::Audio)
        .await
        .unwrap();
    ctl.capture.release();

    ctl.signaling
        .wait_for(1000, |sent| {
            sent.iter()
                .any(|s| matches!(s, ClientSignal::InitiateCall { to, .. } if to == "bob"))
        })
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let s = ctl.handle.snapshot().await.unwrap();
    assert_eq!(s.phase, CallPhase::RingingOut);
    assert!(s.media.microphone.as_ref().is_some_and(|m| m.live));
    let produced = ctl.capture.produced();
    assert_eq!(produced.len(), 2);
    assert_eq!(produced.iter().filter(|t| t.is_live()).count(), 1);
}
