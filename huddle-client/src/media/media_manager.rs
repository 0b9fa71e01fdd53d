use crate::config::MediaConfig;
use crate::error::CallError;
use crate::media::capture::{AcquireKind, CaptureDevices, CaptureRequest, TrackSet};
use crate::media::local_track::{LocalTrack, MediaSource};
use futures::FutureExt;
use futures::future::BoxFuture;
use huddle_core::TrackKind;
use std::sync::Arc;
use tracing::{debug, info};

/// Owned acquisition, awaited outside the controller loop.
pub type Acquisition = BoxFuture<'static, Result<TrackSet, CallError>>;

pub enum AddTrack {
    AlreadyPresent,
    Acquire(Acquisition),
}

#[derive(Debug, Default)]
pub struct LocalMedia {
    pub microphone: Option<LocalTrack>,
    pub camera: Option<LocalTrack>,
    pub screen: Option<LocalTrack>,
    pub screen_audio: Option<LocalTrack>,
    pub muted: bool,
    pub deafened: bool,
}

impl LocalMedia {
    pub fn is_sharing_screen(&self) -> bool {
        self.screen.is_some()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &LocalTrack> {
        [
            &self.microphone,
            &self.camera,
            &self.screen,
            &self.screen_audio,
        ]
        .into_iter()
        .flatten()
    }
}

/// Owns every local capture track and the mute/deafen flags.
pub struct MediaSourceManager {
    devices: Arc<dyn CaptureDevices>,
    config: MediaConfig,
    state: LocalMedia,
}

impl MediaSourceManager {
    pub fn new(devices: Arc<dyn CaptureDevices>, config: MediaConfig) -> Self {
        Self {
            devices,
            config,
            state: LocalMedia::default(),
        }
    }

    pub fn state(&self) -> &LocalMedia {
        &self.state
    }

    pub fn supports_display_capture(&self) -> bool {
        self.devices.supports_display_capture()
    }

    /// Starts an acquisition. Display capture on a platform without it fails
    /// here, before anything is requested from the devices.
    pub fn acquire(&self, kind: AcquireKind) -> Result<Acquisition, CallError> {
        if kind == AcquireKind::Screen && !self.supports_display_capture() {
            return Err(CallError::Unsupported("Screen sharing".to_string()));
        }

        let devices = self.devices.clone();
        let request = CaptureRequest::for_kind(kind, &self.config);
        debug!("Acquiring {:?} media: {:?}", kind, request);

        Ok(async move {
            let tracks = devices.capture(request).await?;
            Ok(TrackSet::new(tracks))
        }
        .boxed())
    }

    /// Installs the tracks of a call-level acquisition. Mute state carries
    /// over to the new microphone.
    pub fn install(&mut self, mut set: TrackSet) {
        if let Some(mic) = set.take(MediaSource::Microphone) {
            mic.set_enabled(!self.state.muted);
            replace_slot(&mut self.state.microphone, mic);
        }
        if let Some(camera) = set.take(MediaSource::Camera) {
            replace_slot(&mut self.state.camera, camera);
        }
        set.stop_all();
    }

    /// First half of `add_track`: re-enables what is already there or hands
    /// back the acquisition to await.
    pub fn add_track(&mut self, kind: TrackKind) -> Result<AddTrack, CallError> {
        match kind {
            TrackKind::Audio if self.state.microphone.is_some() => {
                self.set_muted(false);
                Ok(AddTrack::AlreadyPresent)
            }
            TrackKind::Audio => Ok(AddTrack::Acquire(self.acquire(AcquireKind::Voice)?)),
            TrackKind::Video if self.state.camera.is_some() => Ok(AddTrack::AlreadyPresent),
            TrackKind::Video => Ok(AddTrack::Acquire(self.acquire(AcquireKind::Camera)?)),
        }
    }

    /// Second half of `add_track`. Returns the installed track, or the one
    /// already present if another add won the race.
    pub fn finish_add_track(&mut self, kind: TrackKind, mut set: TrackSet) -> Option<LocalTrack> {
        let (source, slot) = match kind {
            TrackKind::Audio => (MediaSource::Microphone, &mut self.state.microphone),
            TrackKind::Video => (MediaSource::Camera, &mut self.state.camera),
        };

        let installed = if let Some(existing) = slot.clone() {
            debug!("{} already present, dropping duplicate", source);
            Some(existing)
        } else {
            let track = set.take(source);
            if let Some(track) = &track {
                info!("Added local {} track {}", source, track.id());
                *slot = Some(track.clone());
            }
            track
        };
        set.stop_all();

        if kind == TrackKind::Audio {
            let muted = self.state.muted;
            if let Some(mic) = &self.state.microphone {
                mic.set_enabled(!muted);
            }
        }
        installed
    }

    /// Video is stopped and dropped. Audio stays attached and is muted.
    pub fn remove_track(&mut self, kind: TrackKind) -> Option<LocalTrack> {
        match kind {
            TrackKind::Video => {
                let camera = self.state.camera.take()?;
                camera.stop();
                info!("Stopped camera track {}", camera.id());
                Some(camera)
            }
            TrackKind::Audio => {
                self.set_muted(true);
                None
            }
        }
    }

    pub fn start_screen(&mut self, mut set: TrackSet) -> Option<LocalTrack> {
        let screen = set.take(MediaSource::Display);
        if let Some(screen) = &screen {
            replace_slot(&mut self.state.screen, screen.clone());
        }
        if let Some(audio) = set.take(MediaSource::DisplayAudio) {
            replace_slot(&mut self.state.screen_audio, audio);
        }
        set.stop_all();
        screen
    }

    /// Stops the display track and its audio. Returns false if nothing was shared.
    pub fn stop_screen(&mut self) -> bool {
        if let Some(audio) = self.state.screen_audio.take() {
            audio.stop();
        }
        let Some(screen) = self.state.screen.take() else {
            return false;
        };
        screen.stop();
        info!("Stopped screen share {}", screen.id());
        true
    }

    /// Unmuting while deafened also lifts the deafen. Returns true when that
    /// happened.
    pub fn set_muted(&mut self, muted: bool) -> bool {
        self.state.muted = muted;
        if let Some(mic) = &self.state.microphone {
            mic.set_enabled(!muted);
        }

        if !muted && self.state.deafened {
            self.state.deafened = false;
            return true;
        }
        false
    }

    /// Deafening forces mute. Un-deafening leaves the microphone muted.
    pub fn set_deafened(&mut self, deafened: bool) {
        self.state.deafened = deafened;
        if deafened {
            self.set_muted(true);
        }
    }

    /// The track peers should receive for `kind`. A screen share takes the
    /// video slot over the camera.
    pub fn outgoing(&self, kind: TrackKind) -> Option<LocalTrack> {
        match kind {
            TrackKind::Audio => self.state.microphone.clone(),
            TrackKind::Video => self.state.screen.clone().or_else(|| self.state.camera.clone()),
        }
    }

    pub fn release_all(&mut self) {
        for slot in [
            &mut self.state.microphone,
            &mut self.state.camera,
            &mut self.state.screen,
            &mut self.state.screen_audio,
        ] {
            if let Some(track) = slot.take() {
                track.stop();
            }
        }
        debug!("Released all local media");
    }
}

fn replace_slot(slot: &mut Option<LocalTrack>, track: LocalTrack) {
    if let Some(old) = slot.replace(track) {
        old.stop();
    }
}
