use crate::call::call_session::CallPhase;
use async_trait::async_trait;
use huddle_core::{CallKind, CallerInfo, ParticipantId, TrackKind};

/// Everything the controller shows to the user goes through here.
#[async_trait]
pub trait RenderSink: Send + Sync + 'static {
    /// `audible` is false while the local user is deafened. The sink decodes
    /// and plays the track, so speaking indicators are computed on its side.
    async fn on_remote_track(&self, participant: ParticipantId, kind: TrackKind, audible: bool);

    async fn on_participant_left(&self, participant: ParticipantId);

    async fn on_video_toggled(&self, participant: ParticipantId, enabled: bool);

    /// Mutes or restores every remote audio stream.
    async fn on_remote_playback(&self, audible: bool);

    async fn on_incoming_call(&self, caller: CallerInfo, kind: CallKind);

    async fn on_call_state(&self, phase: CallPhase);

    /// One human-readable line per user-facing failure.
    async fn notify(&self, message: String);
}
