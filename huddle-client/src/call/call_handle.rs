use crate::call::call_command::CallCommand;
use crate::call::snapshot::CallSnapshot;
use crate::error::CallError;
use huddle_core::{CallKind, RelaySignal};
use tokio::sync::{mpsc, oneshot};

/// Cloneable entry point to a running controller.
#[derive(Clone, Debug)]
pub struct CallHandle {
    tx: mpsc::Sender<CallCommand>,
}

impl CallHandle {
    pub(crate) fn new(tx: mpsc::Sender<CallCommand>) -> Self {
        Self { tx }
    }

    pub async fn send(&self, command: CallCommand) -> Result<(), CallError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| CallError::ControllerGone)
    }

    pub async fn join_voice(&self, channel: impl Into<String>) -> Result<(), CallError> {
        self.send(CallCommand::JoinVoice {
            channel: channel.into(),
        })
        .await
    }

    pub async fn initiate_call(
        &self,
        user: impl Into<String>,
        kind: CallKind,
    ) -> Result<(), CallError> {
        self.send(CallCommand::InitiateCall {
            user: user.into(),
            kind,
        })
        .await
    }

    pub async fn accept_call(&self) -> Result<(), CallError> {
        self.send(CallCommand::AcceptCall).await
    }

    pub async fn reject_call(&self) -> Result<(), CallError> {
        self.send(CallCommand::RejectCall).await
    }

    pub async fn leave(&self) -> Result<(), CallError> {
        self.send(CallCommand::Leave).await
    }

    pub async fn toggle_video(&self) -> Result<(), CallError> {
        self.send(CallCommand::ToggleVideo).await
    }

    pub async fn toggle_audio(&self) -> Result<(), CallError> {
        self.send(CallCommand::ToggleAudio).await
    }

    pub async fn toggle_screen_share(&self) -> Result<(), CallError> {
        self.send(CallCommand::ToggleScreenShare).await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<(), CallError> {
        self.send(CallCommand::SetMuted(muted)).await
    }

    pub async fn set_deafened(&self, deafened: bool) -> Result<(), CallError> {
        self.send(CallCommand::SetDeafened(deafened)).await
    }

    pub async fn relay_signal(&self, signal: RelaySignal) -> Result<(), CallError> {
        self.send(CallCommand::Relay(signal)).await
    }

    pub async fn relay_disconnected(&self) -> Result<(), CallError> {
        self.send(CallCommand::RelayDisconnected).await
    }

    pub async fn snapshot(&self) -> Result<CallSnapshot, CallError> {
        let (tx, rx) = oneshot::channel();
        self.send(CallCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| CallError::ControllerGone)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
