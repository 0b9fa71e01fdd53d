use huddle_core::{IceCandidate, ParticipantId, TrackKind};
use std::fmt;

/// Identifies one connection instance. The epoch changes whenever the session
/// for a participant is recreated, so events from a replaced connection can be
/// told apart from live ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub participant: ParticipantId,
    pub epoch: u64,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.participant, self.epoch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceState {
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    CandidateGenerated(ConnectionKey, IceCandidate),
    IceStateChanged(ConnectionKey, IceState),
    RemoteTrack(ConnectionKey, TrackKind),
    Closed(ConnectionKey),
}

impl ConnectionEvent {
    pub fn key(&self) -> &ConnectionKey {
        match self {
            ConnectionEvent::CandidateGenerated(key, _)
            | ConnectionEvent::IceStateChanged(key, _)
            | ConnectionEvent::RemoteTrack(key, _)
            | ConnectionEvent::Closed(key) => key,
        }
    }
}
