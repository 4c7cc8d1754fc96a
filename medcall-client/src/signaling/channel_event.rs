use medcall_core::{PeerNotice, SignalingMessage};

/// Identifies one open transport of a [`SignalingChannel`](super::SignalingChannel).
pub type ConnectionId = u64;

/// Events a signaling channel produces for the session loop, in transport
/// arrival order.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// Transport is open and the join announcement was queued.
    Connected(ConnectionId),

    /// The other participant announced itself.
    PeerJoined(ConnectionId, PeerNotice),

    /// The other participant left the room.
    PeerLeft(ConnectionId, PeerNotice),

    /// Offer, answer, ICE candidate or relay error.
    Message(ConnectionId, SignalingMessage),

    /// Frame that was not JSON. Kept for logging only.
    Diagnostic(ConnectionId, String),

    /// Relay closed the connection normally.
    Disconnected(ConnectionId),

    /// Abnormal closure or read failure.
    TransportError(ConnectionId, String),
}

impl ChannelEvent {
    pub fn connection(&self) -> ConnectionId {
        match self {
            ChannelEvent::Connected(id)
            | ChannelEvent::PeerJoined(id, _)
            | ChannelEvent::PeerLeft(id, _)
            | ChannelEvent::Message(id, _)
            | ChannelEvent::Diagnostic(id, _)
            | ChannelEvent::Disconnected(id)
            | ChannelEvent::TransportError(id, _) => *id,
        }
    }
}
