use std::sync::Arc;
use tracing::{info, warn};

use crate::error::MediaError;
use crate::media::devices::MediaDevices;
use crate::media::stream::{LocalStream, TrackKind};

/// Owns the local camera/microphone stream.
pub struct MediaCaptureController {
    devices: Arc<dyn MediaDevices>,
    stream: Option<LocalStream>,
}

impl MediaCaptureController {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            stream: None,
        }
    }

    pub fn stream(&self) -> Option<&LocalStream> {
        self.stream.as_ref()
    }

    /// Captures audio and video as one stream. While a stream is held the
    /// same stream is returned again.
    pub async fn acquire(&mut self) -> Result<LocalStream, MediaError> {
        if let Some(stream) = &self.stream {
            return Ok(stream.clone());
        }

        let stream_id = uuid::Uuid::new_v4().to_string();
        let audio = self.devices.open(TrackKind::Audio, &stream_id).await?;
        let video = match self.devices.open(TrackKind::Video, &stream_id).await {
            Ok(video) => video,
            Err(e) => {
                audio.stop();
                warn!("Video capture failed, releasing microphone: {}", e);
                return Err(e);
            }
        };

        let stream = LocalStream::new(stream_id, vec![audio, video]);
        info!("Local stream {} acquired", stream.id());
        self.stream = Some(stream.clone());
        Ok(stream)
    }

    /// Stops every track and frees the devices. Returns `false` when there
    /// was nothing to release.
    pub fn release(&mut self) -> bool {
        let Some(stream) = self.stream.take() else {
            return false;
        };
        for track in stream.tracks() {
            track.stop();
        }
        info!("Local stream {} released", stream.id());
        true
    }

    pub fn set_audio_enabled(&self, enabled: bool) -> bool {
        self.set_enabled(TrackKind::Audio, enabled)
    }

    pub fn set_video_enabled(&self, enabled: bool) -> bool {
        self.set_enabled(TrackKind::Video, enabled)
    }

    /// Flips audio based on the first audio track. Returns the new state, or
    /// `None` without a stream.
    pub fn toggle_audio(&self) -> Option<bool> {
        self.toggle(TrackKind::Audio)
    }

    pub fn toggle_video(&self) -> Option<bool> {
        self.toggle(TrackKind::Video)
    }

    fn toggle(&self, kind: TrackKind) -> Option<bool> {
        let stream = self.stream.as_ref()?;
        let current = stream.tracks().iter().find(|t| t.kind() == kind)?;
        let next = !current.is_enabled();
        self.set_enabled(kind, next);
        Some(next)
    }

    fn set_enabled(&self, kind: TrackKind, enabled: bool) -> bool {
        let Some(stream) = &self.stream else {
            return false;
        };
        let mut touched = false;
        for track in stream.tracks().iter().filter(|t| t.kind() == kind) {
            track.set_enabled(enabled);
            touched = true;
        }
        touched
    }
}
