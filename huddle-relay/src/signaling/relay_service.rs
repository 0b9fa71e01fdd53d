use crate::routing::{Delivery, RelayRouter};
use axum::extract::ws::Message;
use dashmap::DashMap;
use huddle_core::{ClientSignal, ParticipantId, RelaySignal};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{error, warn};

struct RelayInner {
    peers: DashMap<ParticipantId, mpsc::UnboundedSender<Message>>,
    router: Mutex<RelayRouter>,
}

/// Connected sockets plus the routing table shared by every connection.
#[derive(Clone)]
pub struct RelayService {
    inner: Arc<RelayInner>,
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RelayInner {
                peers: DashMap::new(),
                router: Mutex::new(RelayRouter::new()),
            }),
        }
    }

    /// Registers a socket and greets it with its participant id.
    pub async fn connect(&self, user: String, tx: mpsc::UnboundedSender<Message>) -> ParticipantId {
        let participant = ParticipantId::new();
        self.inner.peers.insert(participant.clone(), tx);

        let deliveries = self
            .inner
            .router
            .lock()
            .await
            .register(participant.clone(), user);
        self.deliver(deliveries);
        participant
    }

    pub async fn disconnect(&self, participant: &ParticipantId) {
        self.inner.peers.remove(participant);
        let deliveries = self.inner.router.lock().await.disconnect(participant);
        self.deliver(deliveries);
    }

    pub async fn handle(&self, from: &ParticipantId, signal: ClientSignal) {
        let deliveries = self.inner.router.lock().await.route(from, signal);
        self.deliver(deliveries);
    }

    pub fn online(&self) -> usize {
        self.inner.peers.len()
    }

    fn deliver(&self, deliveries: Vec<Delivery>) {
        for (to, signal) in deliveries {
            self.send_signal(&to, &signal);
        }
    }

    pub fn send_signal(&self, participant: &ParticipantId, msg: &RelaySignal) {
        if let Some(peer) = self.inner.peers.get(participant) {
            match serde_json::to_string(msg) {
                Ok(json) => {
                    if let Err(e) = peer.send(Message::Text(json.into())) {
                        error!("Failed to send WS message to {}: {:?}", participant, e);
                    }
                }
                Err(e) => error!("Failed to serialize relay message: {}", e),
            }
        } else {
            warn!(
                "Attempted to send {:?} to disconnected participant {}",
                msg, participant
            );
        }
    }
}
