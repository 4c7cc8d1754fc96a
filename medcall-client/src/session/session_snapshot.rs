use crate::error::CallError;
use crate::media::{LocalStream, RemoteStream};
use crate::negotiation::CallState;

/// Observable state of a call session.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// Signaling channel is open.
    pub is_connected: bool,
    /// Media is flowing between the two participants.
    pub is_call_active: bool,
    pub connection_state: CallState,
    pub last_error: Option<CallError>,
    pub local_stream: Option<LocalStream>,
    pub remote_stream: Option<RemoteStream>,
}
