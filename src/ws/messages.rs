use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::models::{ObjectId, RoomId, ToolAction, User, UserId};

/// Every event name that may appear on the wire, in either direction.
/// Wire names come from [`EventKind::as_str`] only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // Client -> Server
    JoinRoom,
    LeaveRoom,
    UpdatePosition,
    SendMessage,
    UseTool,
    // Both directions: client request, relayed/broadcast by the server
    RtcJoin,
    RtcLeave,
    RtcOffer,
    RtcAnswer,
    RtcIceCandidate,
    // Server -> Client
    UserJoined,
    UserLeft,
    PositionUpdated,
    MessageReceived,
    ToolUsed,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 16] = [
        EventKind::JoinRoom,
        EventKind::LeaveRoom,
        EventKind::UpdatePosition,
        EventKind::SendMessage,
        EventKind::UseTool,
        EventKind::RtcJoin,
        EventKind::RtcLeave,
        EventKind::RtcOffer,
        EventKind::RtcAnswer,
        EventKind::RtcIceCandidate,
        EventKind::UserJoined,
        EventKind::UserLeft,
        EventKind::PositionUpdated,
        EventKind::MessageReceived,
        EventKind::ToolUsed,
        EventKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::JoinRoom => "join_room",
            EventKind::LeaveRoom => "leave_room",
            EventKind::UpdatePosition => "update_position",
            EventKind::SendMessage => "send_message",
            EventKind::UseTool => "use_tool",
            EventKind::RtcJoin => "rtc_join",
            EventKind::RtcLeave => "rtc_leave",
            EventKind::RtcOffer => "rtc_offer",
            EventKind::RtcAnswer => "rtc_answer",
            EventKind::RtcIceCandidate => "rtc_ice_candidate",
            EventKind::UserJoined => "user_joined",
            EventKind::UserLeft => "user_left",
            EventKind::PositionUpdated => "position_updated",
            EventKind::MessageReceived => "message_received",
            EventKind::ToolUsed => "tool_used",
            EventKind::Error => "error",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Whether a client is allowed to send this event
    pub fn is_client_event(&self) -> bool {
        matches!(
            self,
            EventKind::JoinRoom
                | EventKind::LeaveRoom
                | EventKind::UpdatePosition
                | EventKind::SendMessage
                | EventKind::UseTool
                | EventKind::RtcJoin
                | EventKind::RtcLeave
                | EventKind::RtcOffer
                | EventKind::RtcAnswer
                | EventKind::RtcIceCandidate
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        EventKind::parse(&name).ok_or_else(|| de::Error::custom(format!("unknown event `{}`", name)))
    }
}

/// Sent in place of an envelope that could not be encoded
const ENCODE_FAILURE_FRAME: &str = r#"{"event":"error","data":{"error":"Internal error"}}"#;

/// Outbound wire unit: `{event, data, timestamp}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event: EventKind,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new<T: Serialize>(event: EventKind, data: &T) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(event = %event, error = %e, "Failed to encode event payload");
                serde_json::Value::Null
            }
        };

        Self {
            event,
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn error(error: &str, details: Option<String>) -> Self {
        Self::new(
            EventKind::Error,
            &ErrorPayload {
                error: error.to_string(),
                details,
            },
        )
    }

    pub fn to_json(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(event = %self.event, error = %e, "Failed to encode envelope");
                ENCODE_FAILURE_FRAME.to_string()
            }
        }
    }
}

/// Inbound outer frame, before the event name has been checked
#[derive(Debug, Deserialize)]
pub struct InboundFrame {
    pub event: String,
    #[serde(default = "empty_object")]
    pub data: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<serde_json::Value>,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

// ==================== Client -> Server Payloads ====================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinRoomData {
    pub room_id: RoomId,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

/// Payload of every event that only names a room
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomRef {
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpdatePositionData {
    pub room_id: RoomId,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SendMessageData {
    pub room_id: RoomId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UseToolData {
    pub room_id: RoomId,
    pub target_object_id: ObjectId,
    pub action: ToolAction,
}

/// rtc_offer / rtc_answer
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RtcSessionDescriptionData {
    pub room_id: RoomId,
    pub to_user_id: UserId,
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RtcIceCandidateData {
    pub room_id: RoomId,
    pub to_user_id: UserId,
    pub candidate: serde_json::Map<String, serde_json::Value>,
}

/// A decoded, shape-checked client event
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    JoinRoom(JoinRoomData),
    LeaveRoom(RoomRef),
    UpdatePosition(UpdatePositionData),
    SendMessage(SendMessageData),
    UseTool(UseToolData),
    RtcJoin(RoomRef),
    RtcLeave(RoomRef),
    RtcOffer(RtcSessionDescriptionData),
    RtcAnswer(RtcSessionDescriptionData),
    RtcIceCandidate(RtcIceCandidateData),
}

/// Why a client frame could not be turned into a [`ClientEvent`]
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid message format: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Unknown event type: {0}")]
    UnknownEvent(String),

    #[error("Unsupported event: {0}")]
    ServerOnly(EventKind),

    #[error("Invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientEvent {
    /// Decode the payload of an already-recognised client event kind
    pub fn from_parts(kind: EventKind, data: serde_json::Value) -> Result<Self, DecodeError> {
        let invalid = |source| DecodeError::InvalidPayload { kind, source };

        let event = match kind {
            EventKind::JoinRoom => ClientEvent::JoinRoom(serde_json::from_value(data).map_err(invalid)?),
            EventKind::LeaveRoom => ClientEvent::LeaveRoom(serde_json::from_value(data).map_err(invalid)?),
            EventKind::UpdatePosition => {
                ClientEvent::UpdatePosition(serde_json::from_value(data).map_err(invalid)?)
            }
            EventKind::SendMessage => ClientEvent::SendMessage(serde_json::from_value(data).map_err(invalid)?),
            EventKind::UseTool => ClientEvent::UseTool(serde_json::from_value(data).map_err(invalid)?),
            EventKind::RtcJoin => ClientEvent::RtcJoin(serde_json::from_value(data).map_err(invalid)?),
            EventKind::RtcLeave => ClientEvent::RtcLeave(serde_json::from_value(data).map_err(invalid)?),
            EventKind::RtcOffer => ClientEvent::RtcOffer(serde_json::from_value(data).map_err(invalid)?),
            EventKind::RtcAnswer => ClientEvent::RtcAnswer(serde_json::from_value(data).map_err(invalid)?),
            EventKind::RtcIceCandidate => {
                ClientEvent::RtcIceCandidate(serde_json::from_value(data).map_err(invalid)?)
            }
            EventKind::UserJoined
            | EventKind::UserLeft
            | EventKind::PositionUpdated
            | EventKind::MessageReceived
            | EventKind::ToolUsed
            | EventKind::Error => return Err(DecodeError::ServerOnly(kind)),
        };

        Ok(event)
    }

    /// Decode a raw text frame: outer shape, event name, then payload
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let frame: InboundFrame = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
        let kind =
            EventKind::parse(&frame.event).ok_or_else(|| DecodeError::UnknownEvent(frame.event.clone()))?;
        Self::from_parts(kind, frame.data)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::JoinRoom(_) => EventKind::JoinRoom,
            ClientEvent::LeaveRoom(_) => EventKind::LeaveRoom,
            ClientEvent::UpdatePosition(_) => EventKind::UpdatePosition,
            ClientEvent::SendMessage(_) => EventKind::SendMessage,
            ClientEvent::UseTool(_) => EventKind::UseTool,
            ClientEvent::RtcJoin(_) => EventKind::RtcJoin,
            ClientEvent::RtcLeave(_) => EventKind::RtcLeave,
            ClientEvent::RtcOffer(_) => EventKind::RtcOffer,
            ClientEvent::RtcAnswer(_) => EventKind::RtcAnswer,
            ClientEvent::RtcIceCandidate(_) => EventKind::RtcIceCandidate,
        }
    }
}

// ==================== Server -> Client Payloads ====================

/// user_joined / user_left / position_updated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPositionPayload {
    pub user_id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
    pub x: i32,
    pub y: i32,
}

impl UserPositionPayload {
    pub fn new(user: &User, x: i32, y: i32) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            avatar_url: user.avatar_url.clone(),
            x,
            y,
        }
    }
}

/// message_received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    pub user_id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// tool_used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUsedPayload {
    pub user_id: UserId,
    pub username: String,
    pub target_object_id: ObjectId,
    pub action: ToolAction,
    pub timestamp: DateTime<Utc>,
}

/// rtc_join / rtc_leave broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtcPeerPayload {
    pub user_id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
}

impl RtcPeerPayload {
    pub fn new(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            avatar_url: user.avatar_url.clone(),
        }
    }
}

/// rtc_offer / rtc_answer relayed to one peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtcSessionDescriptionPayload {
    pub from_user_id: UserId,
    pub sdp: String,
}

/// rtc_ice_candidate relayed to one peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtcIceCandidatePayload {
    pub from_user_id: UserId,
    pub candidate: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_event_names_come_from_as_str() {
        for kind in EventKind::ALL {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
            let back: EventKind = serde_json::from_value(json!(kind.as_str())).unwrap();
            assert_eq!(back, kind);
        }
        assert_eq!(EventKind::parse("dance"), None);
        assert!(serde_json::from_value::<EventKind>(json!("dance")).is_err());
        assert!(serde_json::from_value::<EventKind>(json!("JoinRoom")).is_err());
    }

    #[test]
    fn test_envelope_round_trips_through_wire_names() {
        let text = Envelope::new(EventKind::RtcIceCandidate, &json!({ "x": 1 })).to_json();
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back.event, EventKind::RtcIceCandidate);
        assert!(text.contains(r#""event":"rtc_ice_candidate""#));
    }

    #[test]
    fn test_unencodable_payload_is_not_silently_empty() {
        // Maps with non-string keys cannot become JSON objects
        let payload = std::collections::HashMap::from([((1, 2), "pair")]);
        let envelope = Envelope::new(EventKind::ToolUsed, &payload);

        assert_eq!(envelope.data, serde_json::Value::Null);
        let value: serde_json::Value = serde_json::from_str(&envelope.to_json()).unwrap();
        assert_eq!(value["event"], json!("tool_used"));
    }

    #[test]
    fn test_encode_failure_frame_is_an_error_event() {
        let value: serde_json::Value = serde_json::from_str(ENCODE_FAILURE_FRAME).unwrap();
        assert_eq!(value["event"], json!("error"));
        assert_eq!(value["data"]["error"], json!("Internal error"));
    }

    #[test]
    fn test_decode_join_room_defaults_position() {
        let event = ClientEvent::decode(r#"{"event":"join_room","data":{"room_id":5}}"#).unwrap();
        assert_eq!(event, ClientEvent::JoinRoom(JoinRoomData { room_id: 5, x: 0, y: 0 }));
    }

    #[test]
    fn test_decode_ignores_client_timestamp() {
        let text = r#"{"event":"update_position","data":{"room_id":5,"x":3,"y":4},"timestamp":"2024-01-01T00:00:00Z"}"#;
        assert_eq!(
            ClientEvent::decode(text).unwrap(),
            ClientEvent::UpdatePosition(UpdatePositionData { room_id: 5, x: 3, y: 4 })
        );
    }

    #[test]
    fn test_decode_failures_are_distinguished() {
        assert!(matches!(ClientEvent::decode("not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(ClientEvent::decode(r#"{"data":{}}"#), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            ClientEvent::decode(r#"{"event":"teleport","data":{}}"#),
            Err(DecodeError::UnknownEvent(name)) if name == "teleport"
        ));
        assert!(matches!(
            ClientEvent::decode(r#"{"event":"user_joined","data":{}}"#),
            Err(DecodeError::ServerOnly(EventKind::UserJoined))
        ));
        assert!(matches!(
            ClientEvent::decode(r#"{"event":"use_tool","data":{"room_id":1,"target_object_id":2,"action":"paint"}}"#),
            Err(DecodeError::InvalidPayload { kind: EventKind::UseTool, .. })
        ));
    }

    #[test]
    fn test_ice_candidate_must_be_object() {
        let ok = r#"{"event":"rtc_ice_candidate","data":{"room_id":1,"to_user_id":2,"candidate":{"candidate":"a=1","sdpMid":"0"}}}"#;
        assert!(ClientEvent::decode(ok).is_ok());

        let bad = r#"{"event":"rtc_ice_candidate","data":{"room_id":1,"to_user_id":2,"candidate":"a=1"}}"#;
        assert!(matches!(ClientEvent::decode(bad), Err(DecodeError::InvalidPayload { .. })));
    }

    #[test]
    fn test_error_envelope_shape() {
        let value = serde_json::to_value(Envelope::error("Unknown event type", None)).unwrap();
        assert_eq!(value["event"], json!("error"));
        assert_eq!(value["data"], json!({ "error": "Unknown event type" }));
        assert!(value["timestamp"].is_string());
    }
}
