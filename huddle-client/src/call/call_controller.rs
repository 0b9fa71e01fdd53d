use crate::call::call_command::{CallCommand, Deferred, Purpose};
use crate::call::call_handle::CallHandle;
use crate::call::call_session::{CallPhase, CallSession, IncomingCall};
use crate::call::render_sink::RenderSink;
use crate::call::snapshot::{CallSnapshot, MediaSummary};
use crate::config::ClientConfig;
use crate::error::CallError;
use crate::media::{
    AcquireKind, Acquisition, AddTrack, CaptureDevices, LocalTrack, MediaSourceManager, TrackSet,
};
use crate::peer::{IceVerdict, NegotiationState, PeerRole, SessionRegistry};
use crate::signaling::SignalingOutput;
use crate::transport::{ConnectionEvent, ConnectionFactory};
use huddle_core::{
    CallKind, CallerInfo, ClientSignal, IceCandidate, ParticipantId, RelaySignal, TrackKind,
    VoiceUser,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Owns the call state, the session registry and local media. Every input is
/// handled to completion before the next one is taken from the channels.
pub struct CallController {
    config: ClientConfig,
    phase: CallPhase,
    call: Option<CallSession>,
    incoming: Option<IncomingCall>,
    self_id: Option<ParticipantId>,
    relay_online: bool,
    media: MediaSourceManager,
    registry: SessionRegistry,
    signaling: Arc<dyn SignalingOutput>,
    sink: Arc<dyn RenderSink>,
    command_rx: mpsc::Receiver<CallCommand>,
    connection_rx: mpsc::Receiver<ConnectionEvent>,
    deferred_rx: mpsc::UnboundedReceiver<Deferred>,
    deferred_tx: mpsc::UnboundedSender<Deferred>,
    pending: HashMap<u64, Purpose>,
    next_token: u64,
}

impl CallController {
    pub fn new(
        config: ClientConfig,
        signaling: Arc<dyn SignalingOutput>,
        sink: Arc<dyn RenderSink>,
        devices: Arc<dyn CaptureDevices>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> (Self, CallHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.command_buffer);
        let (connection_tx, connection_rx) = mpsc::channel(config.event_buffer);
        let (deferred_tx, deferred_rx) = mpsc::unbounded_channel();

        let controller = Self {
            phase: CallPhase::Idle,
            call: None,
            incoming: None,
            self_id: None,
            relay_online: false,
            media: MediaSourceManager::new(devices, config.media.clone()),
            registry: SessionRegistry::new(factory, connection_tx, sink.clone()),
            signaling,
            sink,
            command_rx,
            connection_rx,
            deferred_rx,
            deferred_tx,
            pending: HashMap::new(),
            next_token: 0,
            config,
        };

        (controller, CallHandle::new(command_tx))
    }

    /// Starts the controller on the current runtime.
    pub fn spawn(
        config: ClientConfig,
        signaling: Arc<dyn SignalingOutput>,
        sink: Arc<dyn RenderSink>,
        devices: Arc<dyn CaptureDevices>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> CallHandle {
        let (controller, handle) = Self::new(config, signaling, sink, devices, factory);
        tokio::spawn(controller.run());
        handle
    }

    pub async fn run(mut self) {
        info!("Call controller started");

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(c) => self.handle_command(c).await,
                        None => {
                            info!("All call handles dropped. Shutting down controller.");
                            break;
                        }
                    }
                }

                evt = self.connection_rx.recv() => {
                    match evt {
                        Some(e) => self.handle_connection_event(e).await,
                        None => {
                            warn!("Connection event channel closed unexpectedly");
                            break;
                        }
                    }
                }

                Some(deferred) = self.deferred_rx.recv() => {
                    self.handle_deferred(deferred).await;
                }
            }
        }

        self.registry.remove_all().await;
        self.media.release_all();
        info!("Call controller finished");
    }

    async fn handle_command(&mut self, cmd: CallCommand) {
        match cmd {
            CallCommand::JoinVoice { channel } => self.join_voice(channel).await,
            CallCommand::InitiateCall { user, kind } => self.initiate_call(user, kind).await,
            CallCommand::AcceptCall => self.accept_call().await,
            CallCommand::RejectCall => {
                if self.phase != CallPhase::RingingIn {
                    warn!("No incoming call to reject");
                    return;
                }
                self.reject_incoming().await;
            }
            CallCommand::Leave => self.leave().await,
            CallCommand::ToggleVideo => self.toggle_video().await,
            CallCommand::ToggleAudio => {
                let muted = !self.media.state().muted;
                self.set_muted(muted).await;
            }
            CallCommand::ToggleScreenShare => self.toggle_screen_share().await,
            CallCommand::SetMuted(muted) => self.set_muted(muted).await,
            CallCommand::SetDeafened(deafened) => self.set_deafened(deafened).await,
            CallCommand::Relay(signal) => self.handle_relay(signal).await,
            CallCommand::RelayDisconnected => {
                self.relay_online = false;
                warn!(
                    "Relay connection lost; {} sessions stay up",
                    self.registry.len()
                );
            }
            CallCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    // --- user intents ---

    async fn join_voice(&mut self, channel: String) {
        if self.is_busy() {
            self.resurface().await;
            return;
        }

        match self.media.acquire(AcquireKind::Voice) {
            Ok(acquisition) => {
                info!("Joining voice channel {}", channel);
                self.start_acquisition(Purpose::JoinVoice { channel }, acquisition);
            }
            Err(e) => self.report(e).await,
        }
    }

    async fn initiate_call(&mut self, user: String, kind: CallKind) {
        if self.is_busy() {
            self.resurface().await;
            return;
        }

        match self.media.acquire(acquire_kind(kind)) {
            Ok(acquisition) => {
                self.start_acquisition(Purpose::InitiateCall { user, kind }, acquisition);
                self.set_phase(CallPhase::RingingOut).await;
            }
            Err(e) => self.report(e).await,
        }
    }

    async fn accept_call(&mut self) {
        let Some(incoming) = self.incoming.as_mut() else {
            warn!("No incoming call to accept");
            return;
        };
        if incoming.answering {
            debug!("Already answering call from {}", incoming.caller.user);
            return;
        }

        match self.media.acquire(acquire_kind(incoming.kind)) {
            Ok(acquisition) => {
                incoming.answering = true;
                self.start_acquisition(Purpose::AcceptCall, acquisition);
            }
            Err(e) => {
                self.report(e).await;
                self.reject_incoming().await;
            }
        }
    }

    async fn reject_incoming(&mut self) {
        let Some(incoming) = self.incoming.take() else {
            return;
        };
        self.pending.retain(|_, purpose| *purpose != Purpose::AcceptCall);

        info!("Rejecting call from {}", incoming.caller.user);
        self.emit(ClientSignal::RejectCall {
            to: incoming.caller.participant_id,
        })
        .await;
        self.set_phase(CallPhase::Idle).await;
    }

    async fn leave(&mut self) {
        match self.phase {
            CallPhase::Idle => {
                if self.pending.values().any(Purpose::starts_call) {
                    info!("Cancelling call setup");
                    self.pending.clear();
                } else {
                    debug!("Leave while idle, nothing to do");
                }
            }
            CallPhase::RingingIn => self.reject_incoming().await,
            CallPhase::RingingOut | CallPhase::Connected => {
                if let Some(call) = &self.call {
                    match call.channel() {
                        Some(channel) => {
                            self.emit(ClientSignal::LeaveVoice {
                                channel: channel.to_string(),
                            })
                            .await;
                        }
                        None => {
                            for participant in self.registry.participants() {
                                self.emit(ClientSignal::EndCall { to: participant }).await;
                            }
                        }
                    }
                }
                info!("Leaving call");
                self.teardown().await;
            }
        }
    }

    async fn toggle_video(&mut self) {
        if self.phase != CallPhase::Connected {
            debug!("Video toggle outside of a call");
            return;
        }

        if self.media.state().camera.is_some() {
            self.media.remove_track(TrackKind::Video);
            self.sync_outgoing(TrackKind::Video).await;
            self.broadcast_video(false).await;
            return;
        }

        if self.pending.values().any(|p| *p == Purpose::AddCamera) {
            debug!("Camera is already starting");
            return;
        }

        match self.media.add_track(TrackKind::Video) {
            Ok(AddTrack::Acquire(acquisition)) => {
                self.start_acquisition(Purpose::AddCamera, acquisition)
            }
            Ok(AddTrack::AlreadyPresent) => {}
            Err(e) => self.report(e).await,
        }
    }

    async fn toggle_screen_share(&mut self) {
        if self.phase != CallPhase::Connected {
            debug!("Screen share toggle outside of a call");
            return;
        }

        if self.media.state().is_sharing_screen() {
            self.stop_screen_share().await;
            return;
        }

        if self.pending.values().any(|p| *p == Purpose::StartScreen) {
            debug!("Screen capture is already starting");
            return;
        }

        match self.media.acquire(AcquireKind::Screen) {
            Ok(acquisition) => self.start_acquisition(Purpose::StartScreen, acquisition),
            Err(e) => self.report(e).await,
        }
    }

    async fn stop_screen_share(&mut self) {
        if self.media.stop_screen() {
            self.sync_outgoing(TrackKind::Video).await;
        }
    }

    async fn set_muted(&mut self, muted: bool) {
        info!("Microphone {}", if muted { "muted" } else { "unmuted" });
        if self.media.set_muted(muted) {
            info!("Unmuting lifted deafen");
            self.sink.on_remote_playback(true).await;
        }
    }

    async fn set_deafened(&mut self, deafened: bool) {
        info!("Deafen {}", if deafened { "on" } else { "off" });
        self.media.set_deafened(deafened);
        self.sink.on_remote_playback(!deafened).await;
    }

    // --- deferred results ---

    async fn handle_deferred(&mut self, deferred: Deferred) {
        match deferred {
            Deferred::MediaAcquired { token, result } => {
                self.on_media_acquired(token, result).await
            }
            Deferred::RingTimeout { token } => self.on_ring_timeout(token).await,
            Deferred::TrackEnded { track_id } => self.on_track_ended(track_id).await,
        }
    }

    async fn on_media_acquired(&mut self, token: u64, result: Result<TrackSet, CallError>) {
        let Some(purpose) = self.pending.remove(&token) else {
            info!("Discarding media acquired for a cancelled request");
            if let Ok(set) = result {
                set.stop_all();
            }
            return;
        };

        let set = match result {
            Ok(set) => set,
            Err(e) => {
                warn!("Media acquisition for {:?} failed", purpose);
                self.report(e).await;
                match purpose {
                    Purpose::InitiateCall { .. } => self.set_phase(CallPhase::Idle).await,
                    Purpose::AcceptCall => self.reject_incoming().await,
                    Purpose::JoinVoice { .. } | Purpose::AddCamera | Purpose::StartScreen => {}
                }
                return;
            }
        };

        match purpose {
            Purpose::JoinVoice { channel } => self.voice_joined(channel, set).await,
            Purpose::InitiateCall { user, kind } => self.call_started(user, kind, set).await,
            Purpose::AcceptCall => self.call_answered(set).await,
            Purpose::AddCamera => self.camera_started(set).await,
            Purpose::StartScreen => self.screen_started(set).await,
        }
    }

    async fn voice_joined(&mut self, channel: String, set: TrackSet) {
        if self.phase != CallPhase::Idle {
            warn!("Voice media arrived while {}, discarding", self.phase);
            set.stop_all();
            return;
        }

        self.media.install(set);
        self.call = Some(CallSession::voice(channel.clone()));
        self.emit(ClientSignal::JoinVoice {
            channel: channel.clone(),
        })
        .await;
        info!("Joined voice channel {}", channel);
        self.set_phase(CallPhase::Connected).await;
    }

    async fn call_started(&mut self, user: String, kind: CallKind, set: TrackSet) {
        if self.phase != CallPhase::RingingOut {
            warn!("Call media arrived while {}, discarding", self.phase);
            set.stop_all();
            return;
        }

        self.media.install(set);
        self.call = Some(CallSession::direct(user.clone(), kind, true));
        info!("Calling {}", user);

        let sent = self
            .emit(ClientSignal::InitiateCall { to: user, kind })
            .await;
        if !sent {
            self.sink
                .notify(CallError::Transport(String::new()).user_message())
                .await;
            self.teardown().await;
        }
    }

    async fn call_answered(&mut self, set: TrackSet) {
        let Some(incoming) = self.incoming.take() else {
            set.stop_all();
            return;
        };

        self.media.install(set);
        let caller = incoming.caller;
        let participant = caller.participant_id.clone();
        let mut call = CallSession::direct(caller.user.clone(), incoming.kind, false);
        call.roster.insert(participant.clone());
        self.call = Some(call);

        info!("Accepted call from {}", caller.user);
        self.emit(ClientSignal::AcceptCall {
            to: participant.clone(),
        })
        .await;
        self.set_phase(CallPhase::Connected).await;

        let result = self
            .registry
            .ensure(&participant, PeerRole::Responder, &self.media)
            .await
            .map(|_| ());
        self.handle_session_result(&participant, result).await;
    }

    async fn camera_started(&mut self, set: TrackSet) {
        if self.phase != CallPhase::Connected {
            set.stop_all();
            return;
        }
        let Some(camera) = self.media.finish_add_track(TrackKind::Video, set) else {
            warn!("Camera acquisition produced no video track");
            return;
        };

        info!("Camera {} on", camera.id());
        self.sync_outgoing(TrackKind::Video).await;
        self.broadcast_video(true).await;
    }

    async fn screen_started(&mut self, set: TrackSet) {
        if self.phase != CallPhase::Connected {
            set.stop_all();
            return;
        }
        let Some(screen) = self.media.start_screen(set) else {
            warn!("Display capture produced no video track");
            return;
        };

        info!("Sharing screen {}", screen.id());
        self.watch_track_end(&screen);
        self.sync_outgoing(TrackKind::Video).await;
    }

    async fn on_ring_timeout(&mut self, token: u64) {
        let Some(incoming) = &self.incoming else {
            return;
        };
        if incoming.token != token || incoming.answering {
            debug!("Ignoring stale ring timer");
            return;
        }

        info!("Call from {} not answered in time", incoming.caller.user);
        self.reject_incoming().await;
    }

    async fn on_track_ended(&mut self, track_id: String) {
        let current = self
            .media
            .state()
            .screen
            .as_ref()
            .is_some_and(|t| t.id() == track_id);
        if !current {
            debug!("Track {} ended after removal", track_id);
            return;
        }

        info!("Screen capture {} ended by the platform", track_id);
        self.stop_screen_share().await;
    }

    // --- relay ---

    async fn handle_relay(&mut self, signal: RelaySignal) {
        match signal {
            RelaySignal::Welcome {
                participant_id,
                user,
            } => self.on_welcome(participant_id, user).await,

            RelaySignal::Offer { from, sdp } => self.on_offer(from, sdp).await,

            RelaySignal::Answer { from, sdp } => {
                let Some(session) = self.registry.get_mut(&from) else {
                    warn!("Answer from {} without a session", from);
                    return;
                };
                let result = session.receive_answer(sdp, self.signaling.as_ref()).await;
                self.handle_session_result(&from, result).await;
            }

            RelaySignal::IceCandidate { from, candidate } => {
                self.on_remote_candidate(from, candidate).await
            }

            RelaySignal::UserJoinedVoice { user } => self.on_user_joined_voice(user).await,

            RelaySignal::ExistingVoiceUsers { users } => {
                self.on_existing_voice_users(users).await
            }

            RelaySignal::UserLeftVoice { participant_id } => {
                if let Some(call) = self.call.as_mut() {
                    call.roster.remove(&participant_id);
                }
                if self.registry.remove(&participant_id).await {
                    info!("{} left the voice channel", participant_id);
                }
            }

            RelaySignal::IncomingCall { from, kind } => self.on_incoming_call(from, kind).await,

            RelaySignal::CallAccepted { from } => self.on_call_accepted(from).await,

            RelaySignal::CallRejected { from } => {
                if self.phase != CallPhase::RingingOut {
                    debug!("call-rejected from {} while {}, ignoring", from, self.phase);
                    return;
                }
                info!("Call rejected by {}", from);
                self.sink.notify("Call was declined.".to_string()).await;
                self.teardown().await;
            }

            RelaySignal::CallEnded { from } => self.on_call_ended(from).await,

            RelaySignal::VideoToggle { from, enabled } => {
                self.sink.on_video_toggled(from, enabled).await;
            }

            RelaySignal::Error { message } => {
                // Outside ringing-out these are signals to peers that already left
                if self.phase != CallPhase::RingingOut {
                    warn!("Relay error while {}: {}", self.phase, message);
                    return;
                }
                warn!("Relay error: {}", message);
                self.sink.notify(message).await;
                self.teardown().await;
            }
        }
    }

    async fn on_welcome(&mut self, participant_id: ParticipantId, user: String) {
        let previous = self.self_id.replace(participant_id.clone());
        self.relay_online = true;
        info!("Connected to relay as {} ({})", user, participant_id);

        let channel = match (&self.phase, &self.call) {
            (CallPhase::Connected, Some(call)) => call.channel().map(str::to_string),
            _ => None,
        };
        let Some(channel) = channel else {
            if previous.is_some() && self.call.as_ref().is_some_and(CallSession::is_direct) {
                warn!("Direct call signaling cannot resume after reconnect");
            }
            return;
        };

        // Sessions were negotiated under the previous participant id.
        if !self.registry.is_empty() {
            info!(
                "Dropping {} sessions from before the reconnect",
                self.registry.len()
            );
            self.registry.remove_all().await;
        }
        if let Some(call) = self.call.as_mut() {
            call.roster.clear();
        }

        info!("Re-joining voice channel {}", channel);
        self.emit(ClientSignal::JoinVoice { channel }).await;
    }

    async fn on_offer(&mut self, from: ParticipantId, sdp: String) {
        if self.phase != CallPhase::Connected {
            warn!("Offer from {} outside of a call, ignoring", from);
            return;
        }
        if let Some(call) = self.call.as_mut() {
            call.roster.insert(from.clone());
        }

        let result = match self
            .registry
            .ensure(&from, PeerRole::Responder, &self.media)
            .await
        {
            Ok(session) => session.receive_offer(sdp, self.signaling.as_ref()).await,
            Err(e) => Err(e),
        };
        self.handle_session_result(&from, result).await;
    }

    async fn on_remote_candidate(&mut self, from: ParticipantId, candidate: IceCandidate) {
        if self.phase != CallPhase::Connected {
            debug!("Candidate from {} outside of a call, ignoring", from);
            return;
        }

        let result = match self
            .registry
            .ensure(&from, PeerRole::Responder, &self.media)
            .await
        {
            Ok(session) => {
                session.receive_candidate(candidate).await;
                Ok(())
            }
            Err(e) => Err(e),
        };
        self.handle_session_result(&from, result).await;
    }

    fn in_voice_channel(&self) -> bool {
        self.phase == CallPhase::Connected
            && self.call.as_ref().and_then(CallSession::channel).is_some()
    }

    async fn on_user_joined_voice(&mut self, user: VoiceUser) {
        if !self.in_voice_channel() {
            debug!("{} joined voice while we are not in a channel", user.user);
            return;
        }
        let participant = user.participant_id;
        if self.self_id.as_ref() == Some(&participant) {
            return;
        }

        info!("{} joined the voice channel", user.user);
        if let Some(call) = self.call.as_mut() {
            call.roster.insert(participant.clone());
        }

        let result = match self
            .registry
            .ensure(&participant, PeerRole::Initiator, &self.media)
            .await
        {
            Ok(session) if session.state() == NegotiationState::New => {
                session.create_offer(self.signaling.as_ref()).await
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        self.handle_session_result(&participant, result).await;
    }

    async fn on_existing_voice_users(&mut self, users: Vec<VoiceUser>) {
        if !self.in_voice_channel() {
            debug!("Voice roster received while not in a channel");
            return;
        }

        info!("{} users already in the voice channel", users.len());
        for user in users {
            let participant = user.participant_id;
            if self.self_id.as_ref() == Some(&participant) {
                continue;
            }
            if let Some(call) = self.call.as_mut() {
                call.roster.insert(participant.clone());
            }

            let result = self
                .registry
                .ensure(&participant, PeerRole::Responder, &self.media)
                .await
                .map(|_| ());
            self.handle_session_result(&participant, result).await;
        }
    }

    async fn on_incoming_call(&mut self, from: CallerInfo, kind: CallKind) {
        if self.is_busy() {
            info!("Busy, rejecting call from {}", from.user);
            self.emit(ClientSignal::RejectCall {
                to: from.participant_id,
            })
            .await;
            return;
        }

        let token = self.next_token();
        let tx = self.deferred_tx.clone();
        let timeout = self.config.ring_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(Deferred::RingTimeout { token });
        });

        info!("Incoming {:?} call from {}", kind, from.user);
        self.incoming = Some(IncomingCall {
            caller: from.clone(),
            kind,
            token,
            answering: false,
        });
        self.set_phase(CallPhase::RingingIn).await;
        self.sink.on_incoming_call(from, kind).await;
    }

    async fn on_call_accepted(&mut self, from: CallerInfo) {
        let calling = self.phase == CallPhase::RingingOut
            && self.call.as_ref().is_some_and(|call| call.initiator);

        if !calling {
            if self.phase == CallPhase::Idle {
                info!("{} accepted a call we gave up on, ending it", from.user);
                self.emit(ClientSignal::EndCall {
                    to: from.participant_id,
                })
                .await;
            } else {
                warn!(
                    "Unexpected call-accepted from {} while {}",
                    from.user, self.phase
                );
            }
            return;
        }

        let participant = from.participant_id;
        if let Some(call) = self.call.as_mut() {
            call.roster.insert(participant.clone());
        }
        info!("{} accepted the call", from.user);
        self.set_phase(CallPhase::Connected).await;

        let result = match self
            .registry
            .ensure(&participant, PeerRole::Initiator, &self.media)
            .await
        {
            Ok(session) if session.state() == NegotiationState::New => {
                session.create_offer(self.signaling.as_ref()).await
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        self.handle_session_result(&participant, result).await;
    }

    async fn on_call_ended(&mut self, from: ParticipantId) {
        match self.phase {
            CallPhase::RingingIn => {
                let from_caller = self
                    .incoming
                    .as_ref()
                    .is_some_and(|incoming| incoming.caller.participant_id == from);
                if !from_caller {
                    return;
                }
                info!("Caller {} hung up", from);
                self.incoming = None;
                self.pending.retain(|_, purpose| *purpose != Purpose::AcceptCall);
                self.set_phase(CallPhase::Idle).await;
            }
            CallPhase::Connected => {
                if let Some(call) = self.call.as_mut() {
                    call.roster.remove(&from);
                }
                if self.registry.remove(&from).await {
                    info!("{} ended the call", from);
                }
                self.end_direct_call_if_empty().await;
            }
            _ => debug!("call-ended from {} while {}, ignoring", from, self.phase),
        }
    }

    // --- connection events ---

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        let key = event.key().clone();
        let Some(session) = self.registry.get_live(&key) else {
            debug!("Dropping event for stale connection {}", key);
            return;
        };

        match event {
            ConnectionEvent::CandidateGenerated(_, candidate) => {
                let sent = self
                    .signaling
                    .send_ice(key.participant.clone(), candidate)
                    .await;
                if let Err(e) = sent {
                    warn!("Failed to send ICE candidate to {}: {}", key.participant, e);
                }
            }

            ConnectionEvent::IceStateChanged(_, state) => {
                match session.record_ice_state(state, self.config.max_ice_restarts) {
                    IceVerdict::Unchanged => {}
                    IceVerdict::Restart => {
                        warn!("ICE failed with {}, restarting", key.participant);
                        let result = session.restart_ice(self.signaling.as_ref()).await;
                        self.handle_session_result(&key.participant, result).await;
                    }
                    IceVerdict::Escalate => {
                        error!("ICE failed repeatedly with {}", key.participant);
                        let err = CallError::IceFailure(key.participant.clone());
                        self.drop_session(&key.participant, err).await;
                    }
                }
            }

            ConnectionEvent::RemoteTrack(_, kind) => {
                if session.record_remote_track(kind) {
                    let audible = !self.media.state().deafened;
                    self.sink
                        .on_remote_track(key.participant.clone(), kind, audible)
                        .await;
                }
            }

            ConnectionEvent::Closed(_) => {
                info!("Connection to {} closed", key.participant);
                if let Some(call) = self.call.as_mut() {
                    call.roster.remove(&key.participant);
                }
                self.registry.remove(&key.participant).await;
                self.end_direct_call_if_empty().await;
            }
        }
    }

    // --- helpers ---

    fn next_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    fn is_busy(&self) -> bool {
        self.phase != CallPhase::Idle || self.pending.values().any(Purpose::starts_call)
    }

    async fn resurface(&self) {
        info!("Call already {}, ignoring new request", self.phase);
        self.sink.on_call_state(self.phase).await;
    }

    async fn set_phase(&mut self, phase: CallPhase) {
        if self.phase == phase {
            return;
        }
        info!("Call phase {} -> {}", self.phase, phase);
        self.phase = phase;
        self.sink.on_call_state(phase).await;
    }

    async fn emit(&self, signal: ClientSignal) -> bool {
        let op = signal.op();
        match self.signaling.send(signal).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send {}: {}", op, e);
                false
            }
        }
    }

    async fn report(&self, err: CallError) {
        warn!("{}", err);
        self.sink.notify(err.user_message()).await;
    }

    fn start_acquisition(&mut self, purpose: Purpose, acquisition: Acquisition) {
        let token = self.next_token();
        debug!("Acquisition {} started for {:?}", token, purpose);
        self.pending.insert(token, purpose);

        let tx = self.deferred_tx.clone();
        tokio::spawn(async move {
            let result = acquisition.await;
            let _ = tx.send(Deferred::MediaAcquired { token, result });
        });
    }

    fn watch_track_end(&self, track: &LocalTrack) {
        let track = track.clone();
        let tx = self.deferred_tx.clone();
        tokio::spawn(async move {
            track.ended().await;
            let _ = tx.send(Deferred::TrackEnded {
                track_id: track.id().to_string(),
            });
        });
    }

    async fn sync_outgoing(&mut self, kind: TrackKind) {
        let track = self.media.outgoing(kind);
        let mut failed = Vec::new();

        for session in self.registry.sessions_mut() {
            let result = session
                .sync_local_track(kind, track.as_ref(), self.signaling.as_ref())
                .await;
            match result {
                Ok(()) => {}
                Err(CallError::Transport(reason)) => warn!(
                    "Renegotiation with {} not delivered: {}",
                    session.participant(),
                    reason
                ),
                Err(e) => failed.push((session.participant().clone(), e)),
            }
        }

        for (participant, err) in failed {
            self.drop_session(&participant, err).await;
        }
    }

    async fn broadcast_video(&self, enabled: bool) {
        for participant in self.registry.participants() {
            self.emit(ClientSignal::VideoToggle {
                to: participant,
                enabled,
            })
            .await;
        }
    }

    /// Transport failures leave the session alone; anything else closes it.
    async fn handle_session_result(
        &mut self,
        participant: &ParticipantId,
        result: Result<(), CallError>,
    ) {
        match result {
            Ok(()) => {}
            Err(CallError::Transport(reason)) => {
                warn!("Signaling to {} not delivered: {}", participant, reason)
            }
            Err(e) => self.drop_session(participant, e).await,
        }
    }

    async fn drop_session(&mut self, participant: &ParticipantId, err: CallError) {
        self.registry.remove(participant).await;
        if let Some(call) = self.call.as_mut() {
            call.roster.remove(participant);
        }
        self.report(err).await;
        self.end_direct_call_if_empty().await;
    }

    async fn end_direct_call_if_empty(&mut self) {
        let direct = self.call.as_ref().is_some_and(CallSession::is_direct);
        if direct && self.phase == CallPhase::Connected && self.registry.is_empty() {
            info!("No participants left, ending call");
            self.teardown().await;
        }
    }

    async fn teardown(&mut self) {
        self.pending.clear();
        self.registry.remove_all().await;
        self.media.release_all();
        self.call = None;
        self.incoming = None;
        self.set_phase(CallPhase::Idle).await;
    }

    fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            phase: self.phase,
            call: self.call.clone(),
            incoming: self.incoming.as_ref().map(|c| c.caller.clone()),
            media: MediaSummary::from(self.media.state()),
            sessions: self.registry.summaries(),
            relay_online: self.relay_online,
        }
    }
}

fn acquire_kind(kind: CallKind) -> AcquireKind {
    match kind {
        CallKind::Audio => AcquireKind::Voice,
        CallKind::Video => AcquireKind::VideoCall,
    }
}
