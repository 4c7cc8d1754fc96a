use medcall_core::{IceCandidate, IceServerConfig, SdpKind, SessionDescription};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::CallConfig;
use crate::error::{CallError, Result};
use crate::media::{LocalStream, RemoteTrack};
use crate::negotiation::engine_event::{EngineEvent, SessionGeneration};

/// One `RTCPeerConnection` plus the callbacks that feed the session loop.
pub struct PeerSession {
    generation: SessionGeneration,
    peer_connection: Arc<RTCPeerConnection>,
}

impl PeerSession {
    /// Builds the peer connection. Callbacks push into `event_tx`, tagged
    /// with `generation`.
    pub async fn new(
        generation: SessionGeneration,
        config: &CallConfig,
        event_tx: mpsc::Sender<EngineEvent>,
    ) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let mut settings = SettingEngine::default();
        settings.set_include_loopback_candidate(config.include_loopback_candidates);

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .with_setting_engine(settings)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config.ice_servers.iter().map(rtc_ice_server).collect(),
            ..Default::default()
        };

        let peer_connection = Arc::new(api.new_peer_connection(rtc_config).await?);

        let state_tx = event_tx.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let tx = state_tx.clone();
                Box::pin(async move {
                    info!("Peer connection {} state changed: {}", generation, s);
                    let _ = tx.send(EngineEvent::StateChanged(generation, s)).await;
                })
            },
        ));

        let ice_tx = event_tx.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let tx = ice_tx.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let Ok(candidate) = serde_json::to_value(init).and_then(serde_json::from_value)
                else {
                    return;
                };
                let _ = tx
                    .send(EngineEvent::CandidateGenerated(generation, candidate))
                    .await;
            })
        }));

        let track_tx = event_tx;
        peer_connection.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let tx = track_tx.clone();
            Box::pin(async move {
                info!(
                    "Remote {} track {} arrived on session {}",
                    track.kind(),
                    track.id(),
                    generation
                );

                let packets = Arc::new(AtomicU64::new(0));
                let remote = RemoteTrack::new(track.clone(), packets.clone());

                // Drain so the receiver keeps flowing; nothing renders here.
                tokio::spawn(async move {
                    while track.read_rtp().await.is_ok() {
                        packets.fetch_add(1, Ordering::Relaxed);
                    }
                    debug!("Remote track reader finished");
                });

                let _ = tx.send(EngineEvent::RemoteTrack(generation, remote)).await;
            })
        }));

        Ok(Self {
            generation,
            peer_connection,
        })
    }

    pub fn generation(&self) -> SessionGeneration {
        self.generation
    }

    /// Adds every local track as a sender.
    pub async fn add_local_stream(&self, stream: &LocalStream) -> Result<()> {
        for track in stream.tracks() {
            let rtp_track = track.rtp_track() as Arc<dyn TrackLocal + Send + Sync>;
            let sender = self.peer_connection.add_track(rtp_track).await?;

            // RTCP must be read for interceptors to run.
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while sender.read(&mut buf).await.is_ok() {}
            });
        }
        Ok(())
    }

    /// Creates an offer and sets it as local description.
    pub async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.peer_connection.create_offer(None).await?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    /// Creates an answer and sets it as local description.
    pub async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self.peer_connection.create_answer(None).await?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    pub async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = match desc.kind {
            SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
        };
        self.peer_connection.set_remote_description(desc).await?;
        Ok(())
    }

    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init: RTCIceCandidateInit = serde_json::to_value(&candidate)
            .and_then(serde_json::from_value)
            .map_err(|e| CallError::Negotiation(format!("invalid ICE candidate: {e}")))?;
        self.peer_connection.add_ice_candidate(init).await?;
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        self.peer_connection.close().await?;
        Ok(())
    }
}

fn rtc_ice_server(server: &IceServerConfig) -> RTCIceServer {
    RTCIceServer {
        urls: server.urls.clone(),
        username: server.username.clone().unwrap_or_default(),
        credential: server.credential.clone().unwrap_or_default(),
        ..Default::default()
    }
}
