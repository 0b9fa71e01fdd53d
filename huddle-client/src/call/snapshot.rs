use crate::call::call_session::{CallPhase, CallSession};
use crate::media::LocalMedia;
use crate::peer::SessionSummary;
use huddle_core::{CallerInfo, TrackKind};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackSummary {
    pub id: String,
    pub kind: TrackKind,
    pub enabled: bool,
    pub live: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaSummary {
    pub microphone: Option<TrackSummary>,
    pub camera: Option<TrackSummary>,
    pub screen: Option<TrackSummary>,
    pub muted: bool,
    pub deafened: bool,
}

impl From<&LocalMedia> for MediaSummary {
    fn from(media: &LocalMedia) -> Self {
        let summary = |track: &Option<crate::media::LocalTrack>| {
            track.as_ref().map(|t| TrackSummary {
                id: t.id().to_string(),
                kind: t.kind(),
                enabled: t.is_enabled(),
                live: t.is_live(),
            })
        };

        Self {
            microphone: summary(&media.microphone),
            camera: summary(&media.camera),
            screen: summary(&media.screen),
            muted: media.muted,
            deafened: media.deafened,
        }
    }
}

/// Read-only view of the controller, taken between two events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSnapshot {
    pub phase: CallPhase,
    pub call: Option<CallSession>,
    pub incoming: Option<CallerInfo>,
    pub media: MediaSummary,
    pub sessions: Vec<SessionSummary>,
    pub relay_online: bool,
}

impl CallSnapshot {
    pub fn session(&self, participant: &huddle_core::ParticipantId) -> Option<&SessionSummary> {
        self.sessions.iter().find(|s| &s.participant == participant)
    }
}
