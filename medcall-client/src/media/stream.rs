use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn from_codec_type(kind: RTPCodecType) -> Option<Self> {
        match kind {
            RTPCodecType::Audio => Some(TrackKind::Audio),
            RTPCodecType::Video => Some(TrackKind::Video),
            _ => None,
        }
    }
}

/// A captured track. Identity is the `Arc` itself; toggling `enabled` never
/// swaps the underlying RTP track.
pub struct LocalTrack {
    kind: TrackKind,
    enabled: AtomicBool,
    stopped: AtomicBool,
    rtp_track: Arc<TrackLocalStaticSample>,
    feeder: Mutex<Option<JoinHandle<()>>>,
}

impl LocalTrack {
    pub fn new(kind: TrackKind, rtp_track: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            kind,
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            rtp_track,
            feeder: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        self.rtp_track.id()
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn rtp_track(&self) -> Arc<TrackLocalStaticSample> {
        self.rtp_track.clone()
    }

    /// Attaches the task that produces samples for this track.
    pub fn set_feeder(&self, handle: JoinHandle<()>) {
        if let Ok(mut slot) = self.feeder.lock() {
            if let Some(old) = slot.replace(handle) {
                old.abort();
            }
        }
    }

    /// Stops the track and its feeder. Returns `false` if it was already
    /// stopped.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Ok(mut slot) = self.feeder.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        true
    }
}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id())
            .field("kind", &self.kind)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// The local camera/microphone stream, owned by the capture controller.
#[derive(Debug, Clone)]
pub struct LocalStream {
    id: String,
    tracks: Vec<Arc<LocalTrack>>,
}

impl LocalStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<LocalTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<LocalTrack>] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &Arc<LocalTrack>> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &Arc<LocalTrack>> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }
}

/// A track received from the other participant. `packets` counts RTP
/// packets read so far.
#[derive(Clone)]
pub struct RemoteTrack {
    track: Arc<TrackRemote>,
    packets: Arc<AtomicU64>,
}

impl RemoteTrack {
    pub fn new(track: Arc<TrackRemote>, packets: Arc<AtomicU64>) -> Self {
        Self { track, packets }
    }

    pub fn id(&self) -> String {
        self.track.id()
    }

    pub fn stream_id(&self) -> String {
        self.track.stream_id()
    }

    pub fn kind(&self) -> Option<TrackKind> {
        TrackKind::from_codec_type(self.track.kind())
    }

    pub fn packets_received(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("packets", &self.packets_received())
            .finish()
    }
}

/// Media published by the remote participant, owned by the negotiation
/// engine.
#[derive(Debug, Clone, Default)]
pub struct RemoteStream {
    tracks: Vec<RemoteTrack>,
}

impl RemoteStream {
    pub fn tracks(&self) -> &[RemoteTrack] {
        &self.tracks
    }

    pub fn push(&mut self, track: RemoteTrack) {
        self.tracks.push(track);
    }

    pub fn has_kind(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind() == Some(kind))
    }

    pub fn packets_received(&self) -> u64 {
        self.tracks.iter().map(RemoteTrack::packets_received).sum()
    }
}
