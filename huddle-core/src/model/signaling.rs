use crate::model::media::CallKind;
use crate::model::participant::ParticipantId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Trickle ICE candidate as it travels through the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerInfo {
    pub user: String,
    pub participant_id: ParticipantId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceUser {
    pub participant_id: ParticipantId,
    pub user: String,
}

/// Messages a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "kebab-case")]
pub enum ClientSignal {
    Offer {
        to: ParticipantId,
        sdp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Answer {
        to: ParticipantId,
        sdp: String,
    },
    IceCandidate {
        to: ParticipantId,
        candidate: IceCandidate,
    },
    JoinVoice {
        channel: String,
    },
    LeaveVoice {
        channel: String,
    },
    VideoToggle {
        to: ParticipantId,
        enabled: bool,
    },
    /// `to` is a user name; the relay resolves it to that user's connections.
    InitiateCall {
        to: String,
        kind: CallKind,
    },
    AcceptCall {
        to: ParticipantId,
    },
    RejectCall {
        to: ParticipantId,
    },
    EndCall {
        to: ParticipantId,
    },
}

impl ClientSignal {
    pub fn op(&self) -> &'static str {
        match self {
            ClientSignal::Offer { .. } => "offer",
            ClientSignal::Answer { .. } => "answer",
            ClientSignal::IceCandidate { .. } => "ice-candidate",
            ClientSignal::JoinVoice { .. } => "join-voice",
            ClientSignal::LeaveVoice { .. } => "leave-voice",
            ClientSignal::VideoToggle { .. } => "video-toggle",
            ClientSignal::InitiateCall { .. } => "initiate-call",
            ClientSignal::AcceptCall { .. } => "accept-call",
            ClientSignal::RejectCall { .. } => "reject-call",
            ClientSignal::EndCall { .. } => "end-call",
        }
    }
}

/// Messages the relay delivers to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "kebab-case")]
pub enum RelaySignal {
    Welcome {
        participant_id: ParticipantId,
        user: String,
    },
    Offer {
        from: ParticipantId,
        sdp: String,
    },
    Answer {
        from: ParticipantId,
        sdp: String,
    },
    IceCandidate {
        from: ParticipantId,
        candidate: IceCandidate,
    },
    UserJoinedVoice {
        user: VoiceUser,
    },
    ExistingVoiceUsers {
        users: Vec<VoiceUser>,
    },
    UserLeftVoice {
        participant_id: ParticipantId,
    },
    IncomingCall {
        from: CallerInfo,
        kind: CallKind,
    },
    CallAccepted {
        from: CallerInfo,
    },
    CallRejected {
        from: ParticipantId,
    },
    CallEnded {
        from: ParticipantId,
    },
    VideoToggle {
        from: ParticipantId,
        enabled: bool,
    },
    Error {
        message: String,
    },
}
