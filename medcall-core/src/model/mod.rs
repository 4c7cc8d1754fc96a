mod ice;
mod participant;
mod room;
mod signaling;

pub use ice::IceServerConfig;
pub use participant::{Participant, Role};
pub use room::RoomId;
pub use signaling::{
    IceCandidate, PeerNotice, ProtocolError, RelayEnvelope, SdpKind, SessionDescription,
    SignalKind, SignalingMessage,
};
