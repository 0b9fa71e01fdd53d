use huddle_core::{CallKind, CallerInfo, ParticipantId};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallPhase {
    Idle,
    RingingOut,
    RingingIn,
    Connected,
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallPhase::Idle => "idle",
            CallPhase::RingingOut => "ringing-out",
            CallPhase::RingingIn => "ringing-in",
            CallPhase::Connected => "connected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CallContext {
    VoiceChannel { channel: String },
    Direct { user: String, kind: CallKind },
}

/// The single active call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSession {
    pub context: CallContext,
    pub initiator: bool,
    pub roster: BTreeSet<ParticipantId>,
}

impl CallSession {
    pub fn voice(channel: String) -> Self {
        Self {
            context: CallContext::VoiceChannel { channel },
            initiator: false,
            roster: BTreeSet::new(),
        }
    }

    pub fn direct(user: String, kind: CallKind, initiator: bool) -> Self {
        Self {
            context: CallContext::Direct { user, kind },
            initiator,
            roster: BTreeSet::new(),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.context, CallContext::Direct { .. })
    }

    pub fn channel(&self) -> Option<&str> {
        match &self.context {
            CallContext::VoiceChannel { channel } => Some(channel),
            CallContext::Direct { .. } => None,
        }
    }
}

/// A call ringing on this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCall {
    pub caller: CallerInfo,
    pub kind: CallKind,
    pub token: u64,
    pub answering: bool,
}
