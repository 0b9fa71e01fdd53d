use crate::media::LocalTrack;
use crate::transport::connection::{ConnectionFactory, MediaConnection, TrackAttachment};
use crate::transport::transport_config::TransportConfig;
use crate::transport::transport_event::{ConnectionEvent, ConnectionKey, IceState};
use anyhow::{Context, Result};
use async_trait::async_trait;
use huddle_core::{IceCandidate, TrackKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;

/// Builds webrtc-rs peer connections from the shared ICE configuration.
#[derive(Clone, Default)]
pub struct WebRtcConnectionFactory {
    config: TransportConfig,
}

impl WebRtcConnectionFactory {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory for WebRtcConnectionFactory {
    async fn create(
        &self,
        key: ConnectionKey,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Box<dyn MediaConnection>> {
        let connection = WebRtcConnection::new(key, self.config.clone(), events).await?;
        Ok(Box::new(connection))
    }
}

pub struct WebRtcConnection {
    pub key: ConnectionKey,
    pub peer_connection: Arc<RTCPeerConnection>,
    senders: Mutex<HashMap<TrackKind, Arc<RTCRtpSender>>>,
}

impl WebRtcConnection {
    /// `event_tx` carries connection callbacks back to the controller loop.
    pub async fn new(
        key: ConnectionKey,
        config: TransportConfig,
        event_tx: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Self> {
        // 1. Codecs (Opus, VP8 and friends)
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        // 2. Interceptors (NACK, RTCP reports)
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .into_iter()
                .map(|server| RTCIceServer {
                    urls: server.urls,
                    username: server.username.unwrap_or_default(),
                    credential: server.credential.unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .context("Failed to create peer connection")?,
        );

        // Connection closed by the backend
        let state_tx = event_tx.clone();
        let key_state = key.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                let key = key_state.clone();

                Box::pin(async move {
                    debug!("Peer connection state for {}: {:?}", key, s);
                    if s == RTCPeerConnectionState::Closed {
                        let _ = tx.send(ConnectionEvent::Closed(key)).await;
                    }
                })
            },
        ));

        let ice_state_tx = event_tx.clone();
        let key_ice_state = key.clone();
        peer_connection.on_ice_connection_state_change(Box::new(
            move |s: RTCIceConnectionState| {
                let tx = ice_state_tx.clone();
                let key = key_ice_state.clone();

                Box::pin(async move {
                    info!("ICE state for {}: {:?}", key, s);
                    let state = match s {
                        RTCIceConnectionState::Checking => IceState::Checking,
                        RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
                            IceState::Connected
                        }
                        RTCIceConnectionState::Disconnected => IceState::Disconnected,
                        RTCIceConnectionState::Failed => IceState::Failed,
                        RTCIceConnectionState::Closed => IceState::Closed,
                        _ => return,
                    };
                    let _ = tx.send(ConnectionEvent::IceStateChanged(key, state)).await;
                })
            },
        ));

        // Trickle ICE
        let ice_tx = event_tx.clone();
        let key_ice = key.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            let key = key_ice.clone();

            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let candidate = IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                };
                let _ = tx
                    .send(ConnectionEvent::CandidateGenerated(key, candidate))
                    .await;
            })
        }));

        let track_tx = event_tx.clone();
        let key_track = key.clone();
        peer_connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = track_tx.clone();
            let key = key_track.clone();

            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    _ => return,
                };
                debug!("Remote {} track from {} (ssrc {})", kind, key, track.ssrc());

                // Playback belongs to the render sink; keep the receive buffer moving.
                tokio::spawn(async move { while track.read_rtp().await.is_ok() {} });

                let _ = tx.send(ConnectionEvent::RemoteTrack(key, kind)).await;
            })
        }));

        Ok(Self {
            key,
            peer_connection,
            senders: Mutex::new(HashMap::new()),
        })
    }

    async fn create_local_answer(&self) -> Result<String> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(answer.sdp)
    }
}

#[async_trait]
impl MediaConnection for WebRtcConnection {
    async fn create_offer(&self, ice_restart: bool) -> Result<String> {
        let options = ice_restart.then(|| RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        });
        let offer = self
            .peer_connection
            .create_offer(options)
            .await
            .context("Failed to create offer")?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await
            .context("Failed to apply local offer")?;
        Ok(offer.sdp)
    }

    async fn create_answer(&self) -> Result<String> {
        self.create_local_answer()
            .await
            .context("Failed to create answer")
    }

    async fn set_remote_offer(&self, sdp: String) -> Result<()> {
        let desc = RTCSessionDescription::offer(sdp)?;
        self.peer_connection
            .set_remote_description(desc)
            .await
            .context("Failed to apply remote offer")?;
        Ok(())
    }

    async fn set_remote_answer(&self, sdp: String) -> Result<()> {
        let desc = RTCSessionDescription::answer(sdp)?;
        self.peer_connection
            .set_remote_description(desc)
            .await
            .context("Failed to apply remote answer")?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut desc = RTCSessionDescription::default();
        desc.sdp_type = RTCSdpType::Rollback;
        self.peer_connection
            .set_local_description(desc)
            .await
            .context("Failed to roll back local offer")?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    async fn attach_track(&self, track: &LocalTrack) -> Result<TrackAttachment> {
        let rtc_track = track.rtc_track() as Arc<dyn TrackLocal + Send + Sync>;
        let mut senders = self.senders.lock().await;

        if let Some(sender) = senders.get(&track.kind()) {
            sender
                .replace_track(Some(rtc_track))
                .await
                .context("Failed to replace track")?;
            return Ok(TrackAttachment::Replaced);
        }

        let sender = self
            .peer_connection
            .add_track(rtc_track)
            .await
            .context("Failed to add track")?;

        // RTCP has to be read for the interceptors to run.
        let rtcp_sender = sender.clone();
        tokio::spawn(async move { while rtcp_sender.read_rtcp().await.is_ok() {} });

        senders.insert(track.kind(), sender);
        Ok(TrackAttachment::Added)
    }

    async fn detach_track(&self, kind: TrackKind) -> Result<()> {
        let senders = self.senders.lock().await;
        let Some(sender) = senders.get(&kind) else {
            return Ok(());
        };
        sender.replace_track(None).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}
