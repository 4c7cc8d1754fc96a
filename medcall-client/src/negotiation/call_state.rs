use std::fmt;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// Lifecycle of the media session between the two participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CallState {
    #[default]
    New,
    Negotiating,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallState::Failed | CallState::Closed)
    }

    /// States that the stall watchdog times.
    pub fn can_stall(self) -> bool {
        matches!(self, CallState::Negotiating | CallState::Disconnected)
    }
}

impl From<RTCPeerConnectionState> for CallState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => CallState::Negotiating,
            RTCPeerConnectionState::Connected => CallState::Connected,
            RTCPeerConnectionState::Disconnected => CallState::Disconnected,
            RTCPeerConnectionState::Failed => CallState::Failed,
            RTCPeerConnectionState::Closed => CallState::Closed,
            _ => CallState::New,
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::New => "new",
            CallState::Negotiating => "negotiating",
            CallState::Connected => "connected",
            CallState::Disconnected => "disconnected",
            CallState::Failed => "failed",
            CallState::Closed => "closed",
        };
        f.write_str(name)
    }
}
