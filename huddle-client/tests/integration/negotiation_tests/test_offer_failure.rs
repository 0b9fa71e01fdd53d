use huddle_client::CallPhase;
use huddle_core::{CallKind, CallerInfo, ClientSignal, ParticipantId, RelaySignal};

use crate::integration::{create_test_controller, init_tracing};
use crate::utils::SinkEvent;

#[tokio::test]
async fn test_failed_offer_ends_direct_call() {
    init_tracing();

    let ctl = create_test_controller().await;
    let bob = ParticipantId::from("p-bob");
    ctl.factory.fail_offers(true);

    ctl.handle
        .initiate_call("bob", CallKind::Audio)
        .await
        .unwrap();
    ctl.signaling
        .wait_for(2000, |sent| {
            sent.iter()
                .any(|s| matches!(s, ClientSignal::InitiateCall { .. }))
        })
        .await;

    ctl.relay(RelaySignal::CallAccepted {
        from: CallerInfo {
            user: "bob".to_string(),
            participant_id: bob.clone(),
        },
    })
    .await;

    let s = ctl.wait_until(1000, |s| s.phase == CallPhase::Idle).await;
    assert!(s.sessions.is_empty());
    assert!(s.media.microphone.is_none());
    assert_eq!(
        ctl.sink.notifications(),
        vec!["Could not connect to p-bob.".to_string()]
    );
    assert!(ctl.sink.contains(&SinkEvent::ParticipantLeft(bob.clone())));
    assert!(ctl.factory.connection(&bob).unwrap().is_closed());
    assert!(
        !ctl.signaling
            .sent()
            .iter()
            .any(|s| matches!(s, ClientSignal::Offer { .. }))
    );
}
