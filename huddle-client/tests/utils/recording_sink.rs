use async_trait::async_trait;
use huddle_client::{CallPhase, RenderSink};
use huddle_core::{CallKind, CallerInfo, ParticipantId, TrackKind};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    RemoteTrack(ParticipantId, TrackKind, bool),
    ParticipantLeft(ParticipantId),
    VideoToggled(ParticipantId, bool),
    RemotePlayback(bool),
    IncomingCall(CallerInfo, CallKind),
    CallState(CallPhase),
    Notify(String),
}

/// Render sink that remembers everything it was told.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Notify(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn remote_tracks(&self, participant: &ParticipantId) -> Vec<TrackKind> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::RemoteTrack(p, kind, _) if &p == participant => Some(kind),
                _ => None,
            })
            .collect()
    }

    pub fn contains(&self, event: &SinkEvent) -> bool {
        self.events.lock().unwrap().contains(event)
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl RenderSink for RecordingSink {
    async fn on_remote_track(&self, participant: ParticipantId, kind: TrackKind, audible: bool) {
        self.push(SinkEvent::RemoteTrack(participant, kind, audible));
    }

    async fn on_participant_left(&self, participant: ParticipantId) {
        self.push(SinkEvent::ParticipantLeft(participant));
    }

    async fn on_video_toggled(&self, participant: ParticipantId, enabled: bool) {
        self.push(SinkEvent::VideoToggled(participant, enabled));
    }

    async fn on_remote_playback(&self, audible: bool) {
        self.push(SinkEvent::RemotePlayback(audible));
    }

    async fn on_incoming_call(&self, caller: CallerInfo, kind: CallKind) {
        self.push(SinkEvent::IncomingCall(caller, kind));
    }

    async fn on_call_state(&self, phase: CallPhase) {
        self.push(SinkEvent::CallState(phase));
    }

    async fn notify(&self, message: String) {
        self.push(SinkEvent::Notify(message));
    }
}
