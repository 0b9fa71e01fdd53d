mod media;
mod participant;
mod signaling;

pub use media::{CallKind, TrackKind};
pub use participant::ParticipantId;
pub use signaling::{
    CallerInfo, ClientSignal, IceCandidate, IceServerConfig, RelaySignal, VoiceUser,
};
