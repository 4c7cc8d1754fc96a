use crate::model::participant::{Participant, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session description in the browser `RTCSessionDescriptionInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate in the browser `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

/// Frames exchanged with the room relay, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEnvelope {
    JoinRoom {
        user_id: String,
        is_doctor: bool,
    },
    LeaveRoom {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    RtcSignal {
        signal_type: SignalKind,
        payload: Value,
    },
    UserJoined {
        #[serde(default)]
        user_id: Option<Value>,
        #[serde(default)]
        message: Option<String>,
    },
    UserLeft {
        #[serde(default)]
        user_id: Option<Value>,
        #[serde(default)]
        message: Option<String>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
    },
}

/// Presence details carried by join/leave notices. The relay only fills in
/// what it knows, so every field is optional on the inbound side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerNotice {
    pub user_id: Option<String>,
    pub role: Option<Role>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMessage {
    Join(PeerNotice),
    Leave(PeerNotice),
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
    Error { reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame is not JSON: {0}")]
    NotJson(String),

    #[error("unrecognised relay envelope: {0}")]
    UnknownEnvelope(String),

    #[error("malformed {kind:?} payload: {reason}")]
    MalformedPayload { kind: SignalKind, reason: String },

    #[error("join announcement requires user id and role")]
    IncompleteJoin,

    #[error("failed to encode frame: {0}")]
    Encode(String),
}

impl SignalingMessage {
    pub fn join(participant: &Participant) -> Self {
        SignalingMessage::Join(PeerNotice {
            user_id: Some(participant.user_id.clone()),
            role: Some(participant.role),
            message: None,
        })
    }

    pub fn leave(participant: &Participant) -> Self {
        SignalingMessage::Leave(PeerNotice {
            user_id: Some(participant.user_id.clone()),
            role: Some(participant.role),
            message: None,
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            SignalingMessage::Join(_) => "join",
            SignalingMessage::Leave(_) => "leave",
            SignalingMessage::Offer(_) => "offer",
            SignalingMessage::Answer(_) => "answer",
            SignalingMessage::IceCandidate(_) => "ice-candidate",
            SignalingMessage::Error { .. } => "error",
        }
    }

    pub fn into_envelope(self) -> Result<RelayEnvelope, ProtocolError> {
        let envelope = match self {
            SignalingMessage::Join(notice) => match (notice.user_id, notice.role) {
                (Some(user_id), Some(role)) => RelayEnvelope::JoinRoom {
                    user_id,
                    is_doctor: role.is_doctor(),
                },
                _ => return Err(ProtocolError::IncompleteJoin),
            },
            SignalingMessage::Leave(notice) => RelayEnvelope::LeaveRoom {
                user_id: notice.user_id,
            },
            SignalingMessage::Offer(desc) => signal_envelope(SignalKind::Offer, &desc)?,
            SignalingMessage::Answer(desc) => signal_envelope(SignalKind::Answer, &desc)?,
            SignalingMessage::IceCandidate(candidate) => {
                signal_envelope(SignalKind::IceCandidate, &candidate)?
            }
            SignalingMessage::Error { reason } => RelayEnvelope::Error {
                message: Some(reason),
            },
        };
        Ok(envelope)
    }

    pub fn encode(self) -> Result<String, ProtocolError> {
        let envelope = self.into_envelope()?;
        serde_json::to_string(&envelope).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Parses one relay text frame. Non-JSON input yields
    /// [`ProtocolError::NotJson`] so the caller can treat it as a diagnostic.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::NotJson(e.to_string()))?;
        let envelope: RelayEnvelope = serde_json::from_value(value)
            .map_err(|e| ProtocolError::UnknownEnvelope(e.to_string()))?;
        Self::try_from(envelope)
    }
}

impl TryFrom<RelayEnvelope> for SignalingMessage {
    type Error = ProtocolError;

    fn try_from(envelope: RelayEnvelope) -> Result<Self, ProtocolError> {
        let msg = match envelope {
            RelayEnvelope::JoinRoom { user_id, is_doctor } => SignalingMessage::Join(PeerNotice {
                user_id: Some(user_id),
                role: Some(Role::from_is_doctor(is_doctor)),
                message: None,
            }),
            RelayEnvelope::UserJoined { user_id, message } => SignalingMessage::Join(PeerNotice {
                user_id: user_id.and_then(user_id_text),
                role: None,
                message,
            }),
            RelayEnvelope::LeaveRoom { user_id } => SignalingMessage::Leave(PeerNotice {
                user_id,
                ..Default::default()
            }),
            RelayEnvelope::UserLeft { user_id, message } => SignalingMessage::Leave(PeerNotice {
                user_id: user_id.and_then(user_id_text),
                role: None,
                message,
            }),
            RelayEnvelope::RtcSignal {
                signal_type,
                payload,
            } => decode_signal(signal_type, payload)?,
            RelayEnvelope::Error { message } => SignalingMessage::Error {
                reason: message.unwrap_or_else(|| "relay reported an error".to_owned()),
            },
        };
        Ok(msg)
    }
}

fn signal_envelope<T: Serialize>(
    kind: SignalKind,
    payload: &T,
) -> Result<RelayEnvelope, ProtocolError> {
    let payload = serde_json::to_value(payload).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(RelayEnvelope::RtcSignal {
        signal_type: kind,
        payload,
    })
}

fn decode_signal(kind: SignalKind, payload: Value) -> Result<SignalingMessage, ProtocolError> {
    let malformed = |reason: String| ProtocolError::MalformedPayload { kind, reason };

    match kind {
        SignalKind::Offer | SignalKind::Answer => {
            let desc: SessionDescription =
                serde_json::from_value(payload).map_err(|e| malformed(e.to_string()))?;
            match (kind, desc.kind) {
                (SignalKind::Offer, SdpKind::Offer) => Ok(SignalingMessage::Offer(desc)),
                (SignalKind::Answer, SdpKind::Answer) => Ok(SignalingMessage::Answer(desc)),
                (_, other) => Err(malformed(format!("description type is {other:?}"))),
            }
        }
        SignalKind::IceCandidate => serde_json::from_value(payload)
            .map(SignalingMessage::IceCandidate)
            .map_err(|e| malformed(e.to_string())),
    }
}

fn user_id_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
