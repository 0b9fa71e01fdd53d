use huddle_client::{CallPhase, MediaSource, NegotiationState};
use huddle_core::{CallKind, TrackKind};
use std::time::Duration;

use crate::integration::init_tracing;
use crate::utils::{LoopbackRelay, SinkEvent};

#[tokio::test]
async fn test_video_added_mid_call_renegotiates() {
    init_tracing();

    let relay = LoopbackRelay::new();
    let alice = relay.connect("alice").await;
    let bob = relay.connect("bob").await;

    alice
        .handle
        .initiate_call("bob", CallKind::Audio)
        .await
        .unwrap();
    bob.wait_until(2000, |s| s.phase == CallPhase::RingingIn).await;
    bob.handle.accept_call().await.unwrap();
    bob.wait_until(3000, |s| {
        s.session(&alice.id)
            .is_some_and(|x| x.state == NegotiationState::Stable)
    })
    .await;
    alice
        .wait_until(3000, |s| {
            s.session(&bob.id)
                .is_some_and(|x| x.state == NegotiationState::Stable)
        })
        .await;
    let connection = alice.factory.connection(&bob.id).unwrap();
    let offers_before = connection
        .ops()
        .iter()
        .filter(|op| op.starts_with("create-offer"))
        .count();

    alice.handle.toggle_video().await.unwrap();

    let b = bob
        .wait_until(3000, |s| {
            s.session(&alice.id).is_some_and(|x| {
                x.state == NegotiationState::Stable && x.remote_tracks.contains(&TrackKind::Video)
            })
        })
        .await;
    assert_eq!(b.sessions.len(), 1);
    assert!(bob.sink.contains(&SinkEvent::VideoToggled(alice.id.clone(), true)));
    assert!(bob.sink.remote_tracks(&alice.id).contains(&TrackKind::Video));

    let a = alice
        .wait_until(2000, |s| {
            s.session(&bob.id)
                .is_some_and(|x| x.state == NegotiationState::Stable)
        })
        .await;
    assert!(a.media.camera.as_ref().is_some_and(|t| t.live));
    assert_eq!(
        a.session(&bob.id).unwrap().local_tracks,
        vec![TrackKind::Audio, TrackKind::Video]
    );
    let offers = connection
        .ops()
        .iter()
        .filter(|op| op.starts_with("create-offer"))
        .count();
    assert_eq!(offers, offers_before + 1);

    // Turning it off only stops sending; no new offer
    alice.handle.toggle_video().await.unwrap();
    bob.wait_until(2000, |_| {
        bob.sink
            .contains(&SinkEvent::VideoToggled(alice.id.clone(), false))
    })
    .await;

    let a = alice.snapshot().await;
    assert!(a.media.camera.is_none());
    assert!(connection.ops().contains(&"detach video".to_string()));
    assert_eq!(connection.sending(), vec![TrackKind::Audio]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        connection
            .ops()
            .iter()
            .filter(|op| op.starts_with("create-offer"))
            .count(),
        offers
    );
    assert!(
        alice
            .capture
            .produced_from(MediaSource::Camera)
            .iter()
            .all(|t| !t.is_live())
    );

    // Back on: a fresh camera on the existing sender, again without an offer
    alice.handle.toggle_video().await.unwrap();
    bob.wait_until(2000, |_| {
        bob.sink
            .events()
            .iter()
            .filter(|e| **e == SinkEvent::VideoToggled(alice.id.clone(), true))
            .count()
            == 2
    })
    .await;
    assert!(connection.ops().contains(&"attach video Replaced".to_string()));
    assert_eq!(connection.sending(), vec![TrackKind::Audio, TrackKind::Video]);
}

#[tokio::test]
async fn test_camera_denied_keeps_call_running() {
    init_tracing();

    let relay = LoopbackRelay::new();
    let alice = relay.connect("alice").await;
    let bob = relay.connect("bob").await;

    alice
        .handle
        .initiate_call("bob", CallKind::Audio)
        .await
        .unwrap();
    bob.wait_until(2000, |s| s.phase == CallPhase::RingingIn).await;
    bob.handle.accept_call().await.unwrap();
    alice
        .wait_until(3000, |s| {
            s.session(&bob.id)
                .is_some_and(|x| x.state == NegotiationState::Stable)
        })
        .await;

    alice.capture.deny(true);
    alice.handle.toggle_video().await.unwrap();

    alice
        .wait_until(2000, |_| !alice.sink.notifications().is_empty())
        .await;
    assert_eq!(
        alice.sink.notifications(),
        vec!["Could not access camera/microphone. Please check permissions.".to_string()]
    );

    let a = alice.snapshot().await;
    assert_eq!(a.phase, CallPhase::Connected);
    assert_eq!(a.sessions.len(), 1);
    assert!(a.media.camera.is_none());
    assert!(a.media.microphone.is_some());
}
