use crate::media::LocalTrack;
use crate::transport::transport_event::{ConnectionEvent, ConnectionKey};
use anyhow::Result;
use async_trait::async_trait;
use huddle_core::{IceCandidate, TrackKind};
use tokio::sync::mpsc;

/// What happened to the sender for a kind when a track was attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackAttachment {
    /// A new sender was created; the remote side only learns about it from a fresh offer.
    Added,
    /// An existing sender now carries the track; no SDP change.
    Replaced,
}

impl TrackAttachment {
    pub fn needs_negotiation(&self) -> bool {
        matches!(self, TrackAttachment::Added)
    }
}

/// One platform peer connection. Every description call also applies the
/// description it produces locally.
#[async_trait]
pub trait MediaConnection: Send + Sync {
    async fn create_offer(&self, ice_restart: bool) -> Result<String>;

    async fn create_answer(&self) -> Result<String>;

    async fn set_remote_offer(&self, sdp: String) -> Result<()>;

    async fn set_remote_answer(&self, sdp: String) -> Result<()>;

    /// Discards an outstanding local offer.
    async fn rollback(&self) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn attach_track(&self, track: &LocalTrack) -> Result<TrackAttachment>;

    /// Stops sending on the sender for `kind` without removing it.
    async fn detach_track(&self, kind: TrackKind) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    async fn create(
        &self,
        key: ConnectionKey,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Box<dyn MediaConnection>>;
}
