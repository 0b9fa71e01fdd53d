use crate::call::RenderSink;
use crate::error::CallError;
use crate::media::MediaSourceManager;
use crate::peer::negotiation::PeerRole;
use crate::peer::peer_session::{PeerSession, SessionSummary};
use crate::transport::{ConnectionEvent, ConnectionFactory, ConnectionKey};
use huddle_core::{ParticipantId, TrackKind};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// At most one session per remote participant.
pub struct SessionRegistry {
    sessions: HashMap<ParticipantId, PeerSession>,
    factory: Arc<dyn ConnectionFactory>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    sink: Arc<dyn RenderSink>,
    next_epoch: u64,
}

impl SessionRegistry {
    pub fn new(
        factory: Arc<dyn ConnectionFactory>,
        events_tx: mpsc::Sender<ConnectionEvent>,
        sink: Arc<dyn RenderSink>,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            factory,
            events_tx,
            sink,
            next_epoch: 0,
        }
    }

    /// Returns the existing session or creates one with every current
    /// outgoing track attached. An existing session keeps its role.
    pub async fn ensure(
        &mut self,
        participant: &ParticipantId,
        role: PeerRole,
        media: &MediaSourceManager,
    ) -> Result<&mut PeerSession, CallError> {
        match self.sessions.entry(participant.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                self.next_epoch += 1;
                let key = ConnectionKey {
                    participant: participant.clone(),
                    epoch: self.next_epoch,
                };

                let connection = self
                    .factory
                    .create(key.clone(), self.events_tx.clone())
                    .await
                    .map_err(|e| CallError::negotiation(participant, e))?;

                let mut session = PeerSession::new(key, role, connection);
                let tracks: Vec<_> = [TrackKind::Audio, TrackKind::Video]
                    .into_iter()
                    .filter_map(|kind| media.outgoing(kind))
                    .collect();
                if let Err(e) = session.attach_initial(&tracks).await {
                    session.close().await;
                    return Err(e);
                }

                info!(
                    "Created session with {} as {:?} ({} local tracks)",
                    participant,
                    role,
                    tracks.len()
                );
                Ok(entry.insert(session))
            }
        }
    }

    pub fn get_mut(&mut self, participant: &ParticipantId) -> Option<&mut PeerSession> {
        self.sessions.get_mut(participant)
    }

    /// The session an event belongs to, unless it was replaced or closed.
    pub fn get_live(&mut self, key: &ConnectionKey) -> Option<&mut PeerSession> {
        self.sessions
            .get_mut(&key.participant)
            .filter(|session| session.key().epoch == key.epoch && !session.is_closed())
    }

    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.sessions.contains_key(participant)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn participants(&self) -> Vec<ParticipantId> {
        let mut participants: Vec<_> = self.sessions.keys().cloned().collect();
        participants.sort();
        participants
    }

    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut PeerSession> {
        self.sessions.values_mut()
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<_> = self.sessions.values().map(PeerSession::summary).collect();
        summaries.sort_by(|a, b| a.participant.cmp(&b.participant));
        summaries
    }

    /// Closes and evicts the session. Returns false if there was none.
    pub async fn remove(&mut self, participant: &ParticipantId) -> bool {
        let Some(mut session) = self.sessions.remove(participant) else {
            return false;
        };
        session.close().await;
        self.sink.on_participant_left(participant.clone()).await;
        true
    }

    pub async fn remove_all(&mut self) {
        for participant in self.participants() {
            self.remove(&participant).await;
        }
    }
}
