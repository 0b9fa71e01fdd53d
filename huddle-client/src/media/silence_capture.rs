use crate::error::CallError;
use crate::media::capture::{CaptureDevices, CaptureRequest};
use crate::media::local_track::{LocalTrack, MediaSource};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, warn};
use webrtc::media::Sample;

/// One 20 ms Opus frame of silence.
const OPUS_SILENCE: &[u8] = &[0xf8, 0xff, 0xfe];
const FRAME: Duration = Duration::from_millis(20);

/// Headless capture backend: a microphone that produces silence and no
/// camera or display. Used by the CLI where no device layer is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilenceCapture;

impl SilenceCapture {
    fn spawn_pump(track: LocalTrack) {
        tokio::spawn(async move {
            let rtc = track.rtc_track();
            let mut ticker = tokio::time::interval(FRAME);

            loop {
                tokio::select! {
                    _ = track.ended() => break,
                    _ = ticker.tick() => {
                        if !track.is_enabled() {
                            continue;
                        }
                        let sample = Sample {
                            data: Bytes::from_static(OPUS_SILENCE),
                            duration: FRAME,
                            ..Default::default()
                        };
                        if let Err(e) = rtc.write_sample(&sample).await {
                            warn!("Failed to write sample for {}: {:?}", track.id(), e);
                            break;
                        }
                    }
                }
            }

            debug!("Sample pump for {} stopped", track.id());
        });
    }
}

#[async_trait]
impl CaptureDevices for SilenceCapture {
    fn supports_display_capture(&self) -> bool {
        false
    }

    async fn capture(&self, request: CaptureRequest) -> Result<Vec<LocalTrack>, CallError> {
        if request.display.is_some() {
            return Err(CallError::Unsupported("Screen sharing".to_string()));
        }
        if request.camera.is_some() {
            return Err(CallError::Device("no camera available".to_string()));
        }

        let mut tracks = Vec::new();
        if request.microphone.is_some() {
            let track = LocalTrack::new(MediaSource::Microphone);
            Self::spawn_pump(track.clone());
            tracks.push(track);
        }
        Ok(tracks)
    }
}
