use anyhow::{Result, bail};
use async_trait::async_trait;
use huddle_client::{
    ConnectionEvent, ConnectionFactory, ConnectionKey, IceState, LocalTrack, MediaConnection,
    TrackAttachment,
};
use huddle_core::{IceCandidate, ParticipantId, TrackKind};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
}

#[derive(Debug)]
struct Inner {
    signaling: SignalingState,
    /// Sender per kind; `None` once the track was detached.
    senders: BTreeMap<TrackKind, Option<String>>,
    remote_description: bool,
    candidates: Vec<IceCandidate>,
    ops: Vec<String>,
    generated: u32,
    closed: bool,
}

/// Test side of one fake connection: inspect what the session did to it and
/// inject platform events.
#[derive(Clone)]
pub struct FakeConnectionHandle {
    pub key: ConnectionKey,
    events: mpsc::Sender<ConnectionEvent>,
    inner: Arc<Mutex<Inner>>,
}

impl FakeConnectionHandle {
    pub fn ops(&self) -> Vec<String> {
        self.inner.lock().unwrap().ops.clone()
    }

    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.inner.lock().unwrap().candidates.clone()
    }

    pub fn sending(&self) -> Vec<TrackKind> {
        self.inner
            .lock()
            .unwrap()
            .senders
            .iter()
            .filter(|(_, track)| track.is_some())
            .map(|(kind, _)| *kind)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    pub async fn emit(&self, event: ConnectionEvent) {
        self.events.send(event).await.expect("Controller is gone");
    }

    pub async fn fail_ice(&self) {
        self.emit(ConnectionEvent::IceStateChanged(
            self.key.clone(),
            IceState::Failed,
        ))
        .await;
    }
}

/// Offer/answer bookkeeping with the same ordering rules as a browser peer
/// connection. Descriptions are plain strings listing the sent track kinds.
pub struct FakeConnection {
    handle: FakeConnectionHandle,
    fail_offers: bool,
}

pub fn fake_sdp(kind: &str, tracks: &[TrackKind], ice_restart: bool) -> String {
    let tracks: Vec<_> = tracks.iter().map(|t| t.to_string()).collect();
    format!(
        "fake-sdp;type={};tracks={};restart={}",
        kind,
        tracks.join(","),
        ice_restart
    )
}

pub fn sdp_tracks(sdp: &str) -> Vec<TrackKind> {
    sdp.split(';')
        .find_map(|part| part.strip_prefix("tracks="))
        .map(|list| {
            list.split(',')
                .filter_map(|kind| match kind {
                    "audio" => Some(TrackKind::Audio),
                    "video" => Some(TrackKind::Video),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

impl FakeConnection {
    fn log(&self, op: String) {
        self.handle.inner.lock().unwrap().ops.push(op);
    }

    fn description(&self, kind: &str, ice_restart: bool) -> String {
        let tracks = self.handle.sending();
        fake_sdp(kind, &tracks, ice_restart)
    }

    /// One candidate per local description, like a single host interface.
    fn gather(&self) {
        let n = {
            let mut inner = self.handle.inner.lock().unwrap();
            inner.generated += 1;
            inner.generated
        };
        let candidate = IceCandidate {
            candidate: format!("candidate:{} 1 udp {} 10.0.0.1 5000 typ host", self.handle.key, n),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        };
        let _ = self.handle.events.try_send(ConnectionEvent::CandidateGenerated(
            self.handle.key.clone(),
            candidate,
        ));
    }

    fn remote_tracks(&self, sdp: &str) {
        for kind in sdp_tracks(sdp) {
            let _ = self
                .handle
                .events
                .try_send(ConnectionEvent::RemoteTrack(self.handle.key.clone(), kind));
        }
    }

    fn connected(&self) {
        let _ = self.handle.events.try_send(ConnectionEvent::IceStateChanged(
            self.handle.key.clone(),
            IceState::Connected,
        ));
    }

    fn transition(&self, from: &[SignalingState], to: SignalingState, op: &str) -> Result<()> {
        let mut inner = self.handle.inner.lock().unwrap();
        if inner.closed {
            bail!("{} on closed connection", op);
        }
        if !from.contains(&inner.signaling) {
            bail!("{} not allowed in {:?}", op, inner.signaling);
        }
        inner.signaling = to;
        Ok(())
    }
}

#[async_trait]
impl MediaConnection for FakeConnection {
    async fn create_offer(&self, ice_restart: bool) -> Result<String> {
        if self.fail_offers {
            bail!("offer creation failed");
        }
        self.transition(
            &[SignalingState::Stable, SignalingState::HaveLocalOffer],
            SignalingState::HaveLocalOffer,
            "create_offer",
        )?;
        let sdp = self.description("offer", ice_restart);
        self.log(format!("create-offer restart={}", ice_restart));
        self.gather();
        Ok(sdp)
    }

    async fn create_answer(&self) -> Result<String> {
        self.transition(
            &[SignalingState::HaveRemoteOffer],
            SignalingState::Stable,
            "create_answer",
        )?;
        let sdp = self.description("answer", false);
        self.log("create-answer".to_string());
        self.gather();
        self.connected();
        Ok(sdp)
    }

    async fn set_remote_offer(&self, sdp: String) -> Result<()> {
        self.transition(
            &[SignalingState::Stable],
            SignalingState::HaveRemoteOffer,
            "set_remote_offer",
        )?;
        self.handle.inner.lock().unwrap().remote_description = true;
        self.log("set-remote-offer".to_string());
        self.remote_tracks(&sdp);
        Ok(())
    }

    async fn set_remote_answer(&self, sdp: String) -> Result<()> {
        self.transition(
            &[SignalingState::HaveLocalOffer],
            SignalingState::Stable,
            "set_remote_answer",
        )?;
        self.handle.inner.lock().unwrap().remote_description = true;
        self.log("set-remote-answer".to_string());
        self.remote_tracks(&sdp);
        self.connected();
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.transition(
            &[SignalingState::HaveLocalOffer],
            SignalingState::Stable,
            "rollback",
        )?;
        self.log("rollback".to_string());
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut inner = self.handle.inner.lock().unwrap();
        if !inner.remote_description {
            bail!("no remote description");
        }
        inner.candidates.push(candidate);
        Ok(())
    }

    async fn attach_track(&self, track: &LocalTrack) -> Result<TrackAttachment> {
        let mut inner = self.handle.inner.lock().unwrap();
        let attachment = if inner.senders.contains_key(&track.kind()) {
            TrackAttachment::Replaced
        } else {
            TrackAttachment::Added
        };
        inner
            .senders
            .insert(track.kind(), Some(track.id().to_string()));
        inner
            .ops
            .push(format!("attach {} {:?}", track.kind(), attachment));
        Ok(attachment)
    }

    async fn detach_track(&self, kind: TrackKind) -> Result<()> {
        let mut inner = self.handle.inner.lock().unwrap();
        if let Some(track) = inner.senders.get_mut(&kind) {
            *track = None;
        }
        inner.ops.push(format!("detach {}", kind));
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.handle.inner.lock().unwrap();
        inner.closed = true;
        inner.ops.push("close".to_string());
        Ok(())
    }
}

/// Hands out [`FakeConnection`]s and keeps a handle to the latest one per
/// participant.
#[derive(Default)]
pub struct FakeFactory {
    connections: Mutex<HashMap<ParticipantId, FakeConnectionHandle>>,
    created: Mutex<Vec<ConnectionKey>>,
    fail_offers: Mutex<bool>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connection(&self, participant: &ParticipantId) -> Option<FakeConnectionHandle> {
        self.connections.lock().unwrap().get(participant).cloned()
    }

    pub fn created(&self) -> Vec<ConnectionKey> {
        self.created.lock().unwrap().clone()
    }

    /// Connections created from now on fail to produce offers.
    pub fn fail_offers(&self, fail: bool) {
        *self.fail_offers.lock().unwrap() = fail;
    }
}

#[async_trait]
impl ConnectionFactory for FakeFactory {
    async fn create(
        &self,
        key: ConnectionKey,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Box<dyn MediaConnection>> {
        let handle = FakeConnectionHandle {
            key: key.clone(),
            events,
            inner: Arc::new(Mutex::new(Inner {
                signaling: SignalingState::Stable,
                senders: BTreeMap::new(),
                remote_description: false,
                candidates: Vec::new(),
                ops: Vec::new(),
                generated: 0,
                closed: false,
            })),
        };

        self.connections
            .lock()
            .unwrap()
            .insert(key.participant.clone(), handle.clone());
        self.created.lock().unwrap().push(key);

        Ok(Box::new(FakeConnection {
            handle,
            fail_offers: *self.fail_offers.lock().unwrap(),
        }))
    }
}
