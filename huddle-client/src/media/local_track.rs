use huddle_core::TrackKind;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::watch;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

const STREAM_ID: &str = "huddle-local";

static NEXT_TRACK: AtomicU64 = AtomicU64::new(1);

/// Device a local track was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaSource {
    Microphone,
    Camera,
    Display,
    DisplayAudio,
}

impl MediaSource {
    pub fn kind(&self) -> TrackKind {
        match self {
            MediaSource::Microphone | MediaSource::DisplayAudio => TrackKind::Audio,
            MediaSource::Camera | MediaSource::Display => TrackKind::Video,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            MediaSource::Microphone => "microphone",
            MediaSource::Camera => "camera",
            MediaSource::Display => "display",
            MediaSource::DisplayAudio => "display-audio",
        }
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

struct TrackState {
    enabled: AtomicBool,
    live: watch::Sender<bool>,
}

/// A captured track. Clones share the same enabled flag and lifetime, so the
/// capture backend, the manager and every connection see one track.
#[derive(Clone)]
pub struct LocalTrack {
    id: String,
    source: MediaSource,
    rtc: Arc<TrackLocalStaticSample>,
    state: Arc<TrackState>,
}

impl LocalTrack {
    pub fn new(source: MediaSource) -> Self {
        let id = format!(
            "{}-{}",
            source.label(),
            NEXT_TRACK.fetch_add(1, Ordering::Relaxed)
        );
        let codec = match source.kind() {
            TrackKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48_000,
                channels: 2,
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
            },
            TrackKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90_000,
                channels: 0,
                sdp_fmtp_line: String::new(),
                rtcp_feedback: vec![],
            },
        };
        let rtc = Arc::new(TrackLocalStaticSample::new(
            codec,
            id.clone(),
            STREAM_ID.to_owned(),
        ));
        let (live, _) = watch::channel(true);

        Self {
            id,
            source,
            rtc,
            state: Arc::new(TrackState {
                enabled: AtomicBool::new(true),
                live,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> MediaSource {
        self.source
    }

    pub fn kind(&self) -> TrackKind {
        self.source.kind()
    }

    pub fn rtc_track(&self) -> Arc<TrackLocalStaticSample> {
        self.rtc.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::SeqCst)
    }

    /// A disabled track stays attached and sends silence or black frames.
    pub fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_live(&self) -> bool {
        *self.state.live.borrow()
    }

    /// Releases the device. Idempotent.
    pub fn stop(&self) {
        self.state.live.send_replace(false);
    }

    /// Resolves once the track has stopped, whether through `stop` or because
    /// the platform ended the capture.
    pub async fn ended(&self) {
        let mut rx = self.state.live.subscribe();
        let _ = rx.wait_for(|live| !*live).await;
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id)
            .field("source", &self.source)
            .field("enabled", &self.is_enabled())
            .field("live", &self.is_live())
            .finish()
    }
}

impl PartialEq for LocalTrack {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LocalTrack {}
