use crate::call::snapshot::CallSnapshot;
use crate::error::CallError;
use crate::media::TrackSet;
use huddle_core::{CallKind, RelaySignal};
use tokio::sync::oneshot;

/// Inputs to the controller from the user and from the relay.
#[derive(Debug)]
pub enum CallCommand {
    JoinVoice { channel: String },
    InitiateCall { user: String, kind: CallKind },
    AcceptCall,
    RejectCall,
    Leave,
    ToggleVideo,
    ToggleAudio,
    ToggleScreenShare,
    SetMuted(bool),
    SetDeafened(bool),

    /// A message delivered by the relay.
    Relay(RelaySignal),

    /// The relay connection dropped; a `welcome` follows on reconnect.
    RelayDisconnected,

    Snapshot(oneshot::Sender<CallSnapshot>),
}

/// Results of work the controller started but did not wait for.
#[derive(Debug)]
pub(crate) enum Deferred {
    MediaAcquired {
        token: u64,
        result: Result<TrackSet, CallError>,
    },
    RingTimeout {
        token: u64,
    },
    TrackEnded {
        track_id: String,
    },
}

/// What a pending acquisition was started for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Purpose {
    JoinVoice { channel: String },
    InitiateCall { user: String, kind: CallKind },
    AcceptCall,
    AddCamera,
    StartScreen,
}

impl Purpose {
    /// Purposes that set up a call, as opposed to changing a running one.
    pub(crate) fn starts_call(&self) -> bool {
        matches!(
            self,
            Purpose::JoinVoice { .. } | Purpose::InitiateCall { .. } | Purpose::AcceptCall
        )
    }
}
