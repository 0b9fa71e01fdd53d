use crate::config::{AudioProcessing, MediaConfig, Resolution};
use crate::error::CallError;
use crate::media::local_track::{LocalTrack, MediaSource};
use async_trait::async_trait;

/// What a call or toggle asks the platform for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquireKind {
    /// Microphone only.
    Voice,
    /// Microphone and camera.
    VideoCall,
    /// Camera only, added to a running call.
    Camera,
    /// Display capture, with its audio when available.
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRequest {
    pub resolution: Resolution,
    pub cursor_always: bool,
    pub with_audio: bool,
}

/// Capture constraints handed to a [`CaptureDevices`] backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub microphone: Option<AudioProcessing>,
    pub camera: Option<Resolution>,
    pub display: Option<DisplayRequest>,
}

impl CaptureRequest {
    pub fn for_kind(kind: AcquireKind, config: &MediaConfig) -> Self {
        match kind {
            AcquireKind::Voice => Self {
                microphone: Some(config.audio),
                camera: None,
                display: None,
            },
            AcquireKind::VideoCall => Self {
                microphone: Some(config.audio),
                camera: Some(config.camera),
                display: None,
            },
            AcquireKind::Camera => Self {
                microphone: None,
                camera: Some(config.camera),
                display: None,
            },
            AcquireKind::Screen => Self {
                microphone: None,
                camera: None,
                display: Some(DisplayRequest {
                    resolution: config.screen,
                    cursor_always: true,
                    with_audio: config.screen_audio,
                }),
            },
        }
    }
}

/// Platform capture backend.
#[async_trait]
pub trait CaptureDevices: Send + Sync + 'static {
    fn supports_display_capture(&self) -> bool;

    /// Returns one live track per requested device. Fails with
    /// [`CallError::Device`] when permission is denied or a device is missing.
    async fn capture(&self, request: CaptureRequest) -> Result<Vec<LocalTrack>, CallError>;
}

/// Tracks produced by one acquisition.
#[derive(Debug, Default)]
pub struct TrackSet {
    tracks: Vec<LocalTrack>,
}

impl TrackSet {
    pub fn new(tracks: Vec<LocalTrack>) -> Self {
        Self { tracks }
    }

    pub fn take(&mut self, source: MediaSource) -> Option<LocalTrack> {
        let index = self.tracks.iter().position(|t| t.source() == source)?;
        Some(self.tracks.remove(index))
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Stops whatever is left in the set.
    pub fn stop_all(self) {
        for track in self.tracks {
            track.stop();
        }
    }
}
