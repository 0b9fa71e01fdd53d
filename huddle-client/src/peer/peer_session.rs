use crate::error::CallError;
use crate::media::LocalTrack;
use crate::peer::negotiation::{IceVerdict, NegotiationState, PeerRole};
use crate::signaling::SignalingOutput;
use crate::transport::{ConnectionKey, IceState, MediaConnection};
use huddle_core::{IceCandidate, ParticipantId, TrackKind};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use tracing::{debug, info, warn};

const ICE_RESTART_REASON: &str = "ice-restart";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub participant: ParticipantId,
    pub role: PeerRole,
    pub state: NegotiationState,
    pub local_tracks: Vec<TrackKind>,
    pub remote_tracks: Vec<TrackKind>,
    pub pending_candidates: usize,
    pub applied_candidates: usize,
    pub ice_failures: u32,
}

/// One negotiated connection to one remote participant.
pub struct PeerSession {
    key: ConnectionKey,
    role: PeerRole,
    state: NegotiationState,
    connection: Box<dyn MediaConnection>,
    local_tracks: HashMap<TrackKind, String>,
    remote_tracks: BTreeSet<TrackKind>,
    pending_candidates: VecDeque<IceCandidate>,
    applied_candidates: usize,
    remote_description_set: bool,
    awaiting_answer: bool,
    offer_restarts_ice: bool,
    renegotiation_deferred: bool,
    ice_restart_deferred: bool,
    ice_failures: u32,
}

impl PeerSession {
    pub fn new(key: ConnectionKey, role: PeerRole, connection: Box<dyn MediaConnection>) -> Self {
        Self {
            key,
            role,
            state: NegotiationState::New,
            connection,
            local_tracks: HashMap::new(),
            remote_tracks: BTreeSet::new(),
            pending_candidates: VecDeque::new(),
            applied_candidates: 0,
            remote_description_set: false,
            awaiting_answer: false,
            offer_restarts_ice: false,
            renegotiation_deferred: false,
            ice_restart_deferred: false,
            ice_failures: 0,
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.key.participant
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == NegotiationState::Closed
    }

    pub fn has_local_offer(&self) -> bool {
        self.awaiting_answer
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn summary(&self) -> SessionSummary {
        let mut local_tracks: Vec<_> = self.local_tracks.keys().copied().collect();
        local_tracks.sort();

        SessionSummary {
            participant: self.participant().clone(),
            role: self.role,
            state: self.state,
            local_tracks,
            remote_tracks: self.remote_tracks.iter().copied().collect(),
            pending_candidates: self.pending_candidates.len(),
            applied_candidates: self.applied_candidates,
            ice_failures: self.ice_failures,
        }
    }

    fn negotiation_error(&self, err: anyhow::Error) -> CallError {
        CallError::negotiation(self.participant(), err)
    }

    /// Attaches the current local tracks to a connection that has not
    /// negotiated yet. The first offer or answer carries them.
    pub(crate) async fn attach_initial(&mut self, tracks: &[LocalTrack]) -> Result<(), CallError> {
        for track in tracks {
            self.connection
                .attach_track(track)
                .await
                .map_err(|e| self.negotiation_error(e))?;
            self.local_tracks.insert(track.kind(), track.id().to_string());
        }
        Ok(())
    }

    /// `new -> negotiating` on the initiator side.
    pub async fn create_offer(&mut self, signaling: &dyn SignalingOutput) -> Result<(), CallError> {
        self.send_offer(signaling, false).await
    }

    async fn send_offer(
        &mut self,
        signaling: &dyn SignalingOutput,
        ice_restart: bool,
    ) -> Result<(), CallError> {
        let next = match self.state {
            NegotiationState::New => NegotiationState::Negotiating,
            NegotiationState::Stable if !self.awaiting_answer => NegotiationState::Renegotiating,
            state => {
                debug!(
                    "Offer to {} postponed while {} (ice restart: {})",
                    self.participant(),
                    state,
                    ice_restart
                );
                if ice_restart {
                    self.ice_restart_deferred = true;
                } else {
                    self.renegotiation_deferred = true;
                }
                return Ok(());
            }
        };

        let sdp = self
            .connection
            .create_offer(ice_restart)
            .await
            .map_err(|e| self.negotiation_error(e))?;

        let previous = self.state;
        self.state = next;
        self.awaiting_answer = true;
        self.offer_restarts_ice = ice_restart;
        self.renegotiation_deferred = false;
        if ice_restart {
            self.ice_restart_deferred = false;
        }

        info!(
            "Sending offer to {} ({}{})",
            self.participant(),
            self.state,
            if ice_restart { ", ice restart" } else { "" }
        );
        let reason = ice_restart.then(|| ICE_RESTART_REASON.to_string());
        let sent = signaling
            .send_offer(self.participant().clone(), sdp, reason)
            .await;
        if let Err(CallError::Transport(reason)) = &sent {
            warn!(
                "Offer to {} not delivered ({}), keeping it for the next attempt",
                self.participant(),
                reason
            );
            self.withdraw_offer(previous, ice_restart).await;
        }
        sent
    }

    /// Undoes an offer that never left, so the next offer can carry it.
    async fn withdraw_offer(&mut self, previous: NegotiationState, ice_restart: bool) {
        if let Err(e) = self.connection.rollback().await {
            warn!(
                "Failed to roll back undelivered offer to {}: {:?}",
                self.participant(),
                e
            );
        }
        self.state = previous;
        self.awaiting_answer = false;
        self.offer_restarts_ice = false;
        if ice_restart {
            self.ice_restart_deferred = true;
        } else {
            self.renegotiation_deferred = true;
        }
    }

    pub async fn receive_offer(
        &mut self,
        sdp: String,
        signaling: &dyn SignalingOutput,
    ) -> Result<(), CallError> {
        if self.is_closed() {
            debug!("Offer from {} after close, ignoring", self.participant());
            return Ok(());
        }

        if self.awaiting_answer {
            match self.role {
                PeerRole::Initiator => {
                    warn!(
                        "Offer collision with {}: keeping our offer, ignoring theirs",
                        self.participant()
                    );
                    return Ok(());
                }
                PeerRole::Responder => {
                    warn!(
                        "Offer collision with {}: rolling back our offer",
                        self.participant()
                    );
                    self.connection
                        .rollback()
                        .await
                        .map_err(|e| self.negotiation_error(e))?;
                    self.awaiting_answer = false;
                    self.renegotiation_deferred = true;
                    if self.offer_restarts_ice {
                        self.offer_restarts_ice = false;
                        self.ice_restart_deferred = true;
                    }
                }
            }
        }

        self.state = match self.state {
            NegotiationState::New => NegotiationState::Negotiating,
            NegotiationState::Stable => NegotiationState::Renegotiating,
            state => state,
        };

        self.connection
            .set_remote_offer(sdp)
            .await
            .map_err(|e| self.negotiation_error(e))?;
        self.remote_description_set = true;
        self.flush_candidates().await;

        let answer = self
            .connection
            .create_answer()
            .await
            .map_err(|e| self.negotiation_error(e))?;
        self.state = NegotiationState::Stable;

        debug!("Answering offer from {}", self.participant());
        let sent = signaling
            .send_answer(self.participant().clone(), answer)
            .await;
        self.resume_deferred(signaling).await?;
        sent
    }

    pub async fn receive_answer(
        &mut self,
        sdp: String,
        signaling: &dyn SignalingOutput,
    ) -> Result<(), CallError> {
        if !self.awaiting_answer {
            warn!(
                "Unexpected answer from {} while {}, ignoring",
                self.participant(),
                self.state
            );
            return Ok(());
        }

        self.connection
            .set_remote_answer(sdp)
            .await
            .map_err(|e| self.negotiation_error(e))?;
        self.awaiting_answer = false;
        self.offer_restarts_ice = false;
        self.remote_description_set = true;
        self.state = NegotiationState::Stable;
        self.flush_candidates().await;

        debug!("Session with {} is stable", self.participant());
        self.resume_deferred(signaling).await
    }

    /// Candidates are held until a remote description exists, then applied
    /// in arrival order.
    pub async fn receive_candidate(&mut self, candidate: IceCandidate) {
        if self.is_closed() {
            debug!("Candidate from {} after close, ignoring", self.participant());
            return;
        }

        if !self.remote_description_set {
            self.pending_candidates.push_back(candidate);
            debug!(
                "Buffered candidate from {} ({} pending)",
                self.participant(),
                self.pending_candidates.len()
            );
            return;
        }

        self.flush_candidates().await;
        self.apply_candidate(candidate).await;
    }

    async fn flush_candidates(&mut self) {
        while let Some(candidate) = self.pending_candidates.pop_front() {
            self.apply_candidate(candidate).await;
        }
    }

    async fn apply_candidate(&mut self, candidate: IceCandidate) {
        match self.connection.add_ice_candidate(candidate).await {
            Ok(()) => self.applied_candidates += 1,
            Err(e) => warn!(
                "Failed to add ICE candidate for {}: {:?}",
                self.participant(),
                e
            ),
        }
    }

    /// Mirrors the outgoing track for `kind` into the connection. Only a new
    /// sender needs an offer; while not stable the offer waits.
    pub async fn sync_local_track(
        &mut self,
        kind: TrackKind,
        track: Option<&LocalTrack>,
        signaling: &dyn SignalingOutput,
    ) -> Result<(), CallError> {
        if self.is_closed() {
            return Ok(());
        }

        let Some(track) = track else {
            if self.local_tracks.remove(&kind).is_some() {
                self.connection
                    .detach_track(kind)
                    .await
                    .map_err(|e| self.negotiation_error(e))?;
                debug!("Detached local {} from {}", kind, self.participant());
            }
            return Ok(());
        };

        if self.local_tracks.get(&kind).map(String::as_str) == Some(track.id()) {
            return Ok(());
        }

        let attachment = self
            .connection
            .attach_track(track)
            .await
            .map_err(|e| self.negotiation_error(e))?;
        self.local_tracks.insert(kind, track.id().to_string());
        debug!(
            "Attached {} to {} ({:?})",
            track.id(),
            self.participant(),
            attachment
        );

        if !attachment.needs_negotiation() {
            return Ok(());
        }
        if self.state == NegotiationState::Stable && !self.awaiting_answer {
            self.send_offer(signaling, false).await
        } else {
            debug!(
                "Renegotiation with {} deferred while {}",
                self.participant(),
                self.state
            );
            self.renegotiation_deferred = true;
            Ok(())
        }
    }

    /// Only the initiator offers a restart; the responder waits for it.
    pub async fn restart_ice(&mut self, signaling: &dyn SignalingOutput) -> Result<(), CallError> {
        if self.is_closed() {
            return Ok(());
        }
        if self.role == PeerRole::Responder {
            debug!("Waiting for {} to restart ICE", self.participant());
            return Ok(());
        }
        self.send_offer(signaling, true).await
    }

    async fn resume_deferred(&mut self, signaling: &dyn SignalingOutput) -> Result<(), CallError> {
        if self.state != NegotiationState::Stable || self.awaiting_answer {
            return Ok(());
        }
        if self.ice_restart_deferred {
            info!("Running deferred ICE restart with {}", self.participant());
            return self.send_offer(signaling, true).await;
        }
        if self.renegotiation_deferred {
            info!("Running deferred renegotiation with {}", self.participant());
            return self.send_offer(signaling, false).await;
        }
        Ok(())
    }

    pub fn record_ice_state(&mut self, state: IceState, max_restarts: u32) -> IceVerdict {
        match state {
            IceState::Connected => {
                if self.ice_failures > 0 {
                    info!("Connection to {} recovered", self.participant());
                }
                self.ice_failures = 0;
                IceVerdict::Unchanged
            }
            IceState::Failed => {
                self.ice_failures += 1;
                if self.ice_failures > max_restarts {
                    IceVerdict::Escalate
                } else {
                    IceVerdict::Restart
                }
            }
            _ => IceVerdict::Unchanged,
        }
    }

    /// Returns true the first time a remote track of `kind` shows up.
    pub fn record_remote_track(&mut self, kind: TrackKind) -> bool {
        self.remote_tracks.insert(kind)
    }

    pub async fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = NegotiationState::Closed;
        self.pending_candidates.clear();

        if let Err(e) = self.connection.close().await {
            warn!("Error closing connection to {}: {:?}", self.participant(), e);
        }
        info!("Session with {} closed", self.participant());
    }
}
