use medcall_core::ProtocolError;
use thiserror::Error;

/// Why local capture could not start. Always shown to the user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("camera/microphone permission was denied")]
    PermissionDenied,

    #[error("no camera or microphone is available: {0}")]
    DeviceUnavailable(String),
}

/// The single error slot surfaced by the session facade.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("signaling transport error: {0}")]
    Transport(String),

    #[error("signaling channel is not open")]
    NotConnected,

    #[error("failed to access camera/microphone: {0}")]
    Media(#[from] MediaError),

    #[error("negotiation failed: {0}")]
    Negotiation(String),

    #[error("session is not authenticated")]
    Unauthenticated,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CallError {
    pub fn negotiation(err: impl std::fmt::Display) -> Self {
        CallError::Negotiation(err.to_string())
    }

    pub fn transport(err: impl std::fmt::Display) -> Self {
        CallError::Transport(err.to_string())
    }

    pub fn is_media(&self) -> bool {
        matches!(self, CallError::Media(_))
    }
}

impl From<ProtocolError> for CallError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MalformedPayload { .. } => CallError::negotiation(err),
            other => CallError::transport(other),
        }
    }
}

impl From<webrtc::Error> for CallError {
    fn from(err: webrtc::Error) -> Self {
        CallError::negotiation(err)
    }
}

pub type Result<T> = std::result::Result<T, CallError>;
