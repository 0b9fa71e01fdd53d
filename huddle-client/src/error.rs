use huddle_core::ParticipantId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    /// Capture was denied or no device exists.
    #[error("media device unavailable: {0}")]
    Device(String),

    #[error("not supported on this platform: {0}")]
    Unsupported(String),

    #[error("negotiation with {participant} failed: {reason}")]
    Negotiation {
        participant: ParticipantId,
        reason: String,
    },

    #[error("connection to {0} failed and could not be restored")]
    IceFailure(ParticipantId),

    #[error("signaling relay unavailable: {0}")]
    Transport(String),

    #[error("call controller has stopped")]
    ControllerGone,
}

impl CallError {
    pub(crate) fn negotiation(participant: &ParticipantId, err: anyhow::Error) -> Self {
        Self::Negotiation {
            participant: participant.clone(),
            reason: format!("{:#}", err),
        }
    }

    /// Text shown to the user, one line per failure.
    pub fn user_message(&self) -> String {
        match self {
            CallError::Device(_) => {
                "Could not access camera/microphone. Please check permissions.".to_string()
            }
            CallError::Unsupported(what) => format!("{} is not available on this device.", what),
            CallError::Negotiation { participant, .. } => {
                format!("Could not connect to {}.", participant)
            }
            CallError::IceFailure(participant) => format!("Lost connection to {}.", participant),
            CallError::Transport(_) => "Signaling server is unreachable.".to_string(),
            CallError::ControllerGone => "Call ended unexpectedly.".to_string(),
        }
    }
}
