use async_trait::async_trait;
use huddle_client::{CallError, CaptureDevices, CaptureRequest, LocalTrack, MediaSource};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Capture backend that hands out tracks without touching devices.
pub struct FakeCapture {
    display: bool,
    deny: AtomicBool,
    gate: watch::Sender<bool>,
    requests: Mutex<Vec<CaptureRequest>>,
    produced: Mutex<Vec<LocalTrack>>,
}

impl FakeCapture {
    pub fn new() -> Arc<Self> {
        Self::build(true)
    }

    pub fn without_display() -> Arc<Self> {
        Self::build(false)
    }

    fn build(display: bool) -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        Arc::new(Self {
            display,
            deny: AtomicBool::new(false),
            gate,
            requests: Mutex::new(Vec::new()),
            produced: Mutex::new(Vec::new()),
        })
    }

    /// Every capture fails as if permission was denied.
    pub fn deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    /// Captures block until [`FakeCapture::release`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn requests(&self) -> Vec<CaptureRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn produced(&self) -> Vec<LocalTrack> {
        self.produced.lock().unwrap().clone()
    }

    pub fn produced_from(&self, source: MediaSource) -> Vec<LocalTrack> {
        self.produced()
            .into_iter()
            .filter(|t| t.source() == source)
            .collect()
    }
}

#[async_trait]
impl CaptureDevices for FakeCapture {
    fn supports_display_capture(&self) -> bool {
        self.display
    }

    async fn capture(&self, request: CaptureRequest) -> Result<Vec<LocalTrack>, CallError> {
        self.requests.lock().unwrap().push(request.clone());

        let mut open = self.gate.subscribe();
        let _ = open.wait_for(|open| *open).await;

        if self.deny.load(Ordering::SeqCst) {
            return Err(CallError::Device("permission denied".to_string()));
        }

        let mut tracks = Vec::new();
        if request.microphone.is_some() {
            tracks.push(LocalTrack::new(MediaSource::Microphone));
        }
        if request.camera.is_some() {
            tracks.push(LocalTrack::new(MediaSource::Camera));
        }
        if let Some(display) = request.display {
            tracks.push(LocalTrack::new(MediaSource::Display));
            if display.with_audio {
                tracks.push(LocalTrack::new(MediaSource::DisplayAudio));
            }
        }

        self.produced.lock().unwrap().extend(tracks.iter().cloned());
        Ok(tracks)
    }
}
