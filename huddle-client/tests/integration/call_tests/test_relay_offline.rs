use huddle_client::CallPhase;
use huddle_core::CallKind;

use crate::integration::{create_test_controller, init_tracing};

#[tokio::test]
async fn test_call_fails_while_relay_unreachable() {
    init_tracing();

    let ctl = create_test_controller().await;
    ctl.signaling.set_offline(true);

    ctl.handle
        .initiate_call("bob", CallKind::Audio)
        .await
        .unwrap();

    ctl.wait_until(2000, |_| !ctl.sink.notifications().is_empty())
        .await;
    let s = ctl
        .wait_until(1000, |s| s.phase == CallPhase::Idle)
        .await;

    assert_eq!(
        ctl.sink.notifications(),
        vec!["Signaling server is unreachable.".to_string()]
    );
    assert!(s.call.is_none());
    assert!(s.media.microphone.is_none());
    assert!(ctl.capture.produced().iter().all(|t| !t.is_live()));
}
