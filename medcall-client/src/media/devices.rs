use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::error::MediaError;
use crate::media::stream::{LocalTrack, TrackKind};

/// Source of local capture tracks (camera, microphone).
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Opens one device and returns a live track feeding samples into it.
    async fn open(&self, kind: TrackKind, stream_id: &str) -> Result<Arc<LocalTrack>, MediaError>;
}

/// Opus frame carrying 20ms of silence.
const OPUS_SILENCE: &[u8] = &[0xf8, 0xff, 0xfe];
/// Opaque VP8 key frame header used as a placeholder picture.
const VP8_PLACEHOLDER: &[u8] = &[
    0x50, 0x42, 0x00, 0x9d, 0x01, 0x2a, 0x40, 0x01, 0xf0, 0x00, 0x00, 0x47, 0x08, 0x85, 0x85,
    0x88, 0x85, 0x84, 0x88, 0x02, 0x02,
];

const AUDIO_FRAME: Duration = Duration::from_millis(20);
const VIDEO_FRAME: Duration = Duration::from_millis(33);

/// Device backend without hardware: an Opus-silence microphone and a VP8
/// placeholder camera. Can be told to refuse access.
pub struct SyntheticDevices {
    refusal: Option<MediaError>,
    opened: AtomicUsize,
}

impl SyntheticDevices {
    pub fn new() -> Self {
        Self {
            refusal: None,
            opened: AtomicUsize::new(0),
        }
    }

    pub fn denying(err: MediaError) -> Self {
        Self {
            refusal: Some(err),
            opened: AtomicUsize::new(0),
        }
    }

    /// Number of device opens that succeeded.
    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn open(&self, kind: TrackKind, stream_id: &str) -> Result<Arc<LocalTrack>, MediaError> {
        if let Some(err) = &self.refusal {
            return Err(err.clone());
        }

        let (capability, track_id) = match kind {
            TrackKind::Audio => (
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48000,
                    channels: 2,
                    ..Default::default()
                },
                "audio",
            ),
            TrackKind::Video => (
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    clock_rate: 90000,
                    ..Default::default()
                },
                "video",
            ),
        };

        let rtp_track = Arc::new(TrackLocalStaticSample::new(
            capability,
            format!("{stream_id}-{track_id}"),
            stream_id.to_owned(),
        ));
        let track = Arc::new(LocalTrack::new(kind, rtp_track));
        track.set_feeder(spawn_feeder(Arc::downgrade(&track)));

        self.opened.fetch_add(1, Ordering::Relaxed);
        info!("Opened synthetic {:?} device for stream {}", kind, stream_id);
        Ok(track)
    }
}

/// Writes one frame per tick while the track is enabled. Exits once the
/// track is stopped or dropped.
fn spawn_feeder(track: Weak<LocalTrack>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let Some(kind) = track.upgrade().map(|t| t.kind()) else {
            return;
        };
        let (frame, period) = match kind {
            TrackKind::Audio => (OPUS_SILENCE, AUDIO_FRAME),
            TrackKind::Video => (VP8_PLACEHOLDER, VIDEO_FRAME),
        };
        let mut ticker = tokio::time::interval(period);

        loop {
            ticker.tick().await;
            let Some(track) = track.upgrade() else { break };
            if track.is_stopped() {
                break;
            }
            if !track.is_enabled() {
                continue;
            }
            let sample = Sample {
                data: Bytes::from_static(frame),
                duration: period,
                ..Default::default()
            };
            if let Err(e) = track.rtp_track().write_sample(&sample).await {
                debug!("Dropping {:?} sample: {}", kind, e);
            }
        }
    })
}
