use medcall_core::IceCandidate;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use crate::media::RemoteTrack;

/// Identifies one peer session created by the engine.
pub type SessionGeneration = u64;

/// Events a peer session raises for the session loop. Each carries the
/// generation of the session that produced it.
pub enum EngineEvent {
    /// A local ICE candidate was gathered and must be sent to the peer.
    CandidateGenerated(SessionGeneration, IceCandidate),

    /// Peer connection state changed.
    StateChanged(SessionGeneration, RTCPeerConnectionState),

    /// The peer started sending a track.
    RemoteTrack(SessionGeneration, RemoteTrack),
}

impl EngineEvent {
    pub fn generation(&self) -> SessionGeneration {
        match self {
            EngineEvent::CandidateGenerated(g, _)
            | EngineEvent::StateChanged(g, _)
            | EngineEvent::RemoteTrack(g, _) => *g,
        }
    }
}
