use crate::error::CallError;
use async_trait::async_trait;
use huddle_core::{ClientSignal, IceCandidate, ParticipantId};

/// Outbound half of the relay, as seen by the controller and its sessions.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Fails with [`CallError::Transport`] while the relay is unreachable.
    async fn send(&self, signal: ClientSignal) -> Result<(), CallError>;

    async fn send_offer(
        &self,
        to: ParticipantId,
        sdp: String,
        reason: Option<String>,
    ) -> Result<(), CallError> {
        self.send(ClientSignal::Offer { to, sdp, reason }).await
    }

    async fn send_answer(&self, to: ParticipantId, sdp: String) -> Result<(), CallError> {
        self.send(ClientSignal::Answer { to, sdp }).await
    }

    async fn send_ice(&self, to: ParticipantId, candidate: IceCandidate) -> Result<(), CallError> {
        self.send(ClientSignal::IceCandidate { to, candidate }).await
    }
}
