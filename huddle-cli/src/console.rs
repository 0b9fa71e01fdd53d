use async_trait::async_trait;
use colored::*;
use huddle_client::{CallPhase, RenderSink};
use huddle_core::{CallKind, CallerInfo, ParticipantId, TrackKind};
use tokio::sync::mpsc;

/// What the prompt loop has to react to.
#[derive(Debug)]
pub enum UiEvent {
    Phase(CallPhase),
    Incoming(CallerInfo, CallKind),
}

/// Prints call activity to the terminal. There is no audio or video output;
/// remote tracks are only announced.
pub struct ConsoleSink {
    ui_tx: mpsc::UnboundedSender<UiEvent>,
}

impl ConsoleSink {
    pub fn new(ui_tx: mpsc::UnboundedSender<UiEvent>) -> Self {
        Self { ui_tx }
    }
}

#[async_trait]
impl RenderSink for ConsoleSink {
    async fn on_remote_track(&self, participant: ParticipantId, kind: TrackKind, audible: bool) {
        let icon = match kind {
            TrackKind::Audio if audible => "🔊",
            TrackKind::Audio => "🔇",
            TrackKind::Video => "📹",
        };
        println!("{} {} from {}", icon, kind, participant.to_string().bold());
    }

    async fn on_participant_left(&self, participant: ParticipantId) {
        println!("👋 {} left", participant.to_string().bold());
    }

    async fn on_video_toggled(&self, participant: ParticipantId, enabled: bool) {
        let state = if enabled { "on".green() } else { "off".yellow() };
        println!("📹 {} turned video {}", participant.to_string().bold(), state);
    }

    async fn on_remote_playback(&self, audible: bool) {
        if audible {
            println!("{}", "🔊 Playback restored".cyan());
        } else {
            println!("{}", "🔇 Deafened".cyan());
        }
    }

    async fn on_incoming_call(&self, caller: CallerInfo, kind: CallKind) {
        let _ = self.ui_tx.send(UiEvent::Incoming(caller, kind));
    }

    async fn on_call_state(&self, phase: CallPhase) {
        let label = match phase {
            CallPhase::Idle => "idle".normal(),
            CallPhase::RingingOut => "ringing".yellow(),
            CallPhase::RingingIn => "incoming call".yellow(),
            CallPhase::Connected => "connected".green().bold(),
        };
        println!("📞 Call {}", label);
        let _ = self.ui_tx.send(UiEvent::Phase(phase));
    }

    async fn notify(&self, message: String) {
        println!("{} {}", "⚠".red().bold(), message.red());
    }
}
