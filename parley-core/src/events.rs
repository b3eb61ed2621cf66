//! Wire events
//!
//! Inbound frames arrive as `{"event": name, "data": {...}, "ack": id?}` and
//! are decoded in two steps: the envelope first, then the payload keyed by
//! the event name. Outbound events serialize adjacently tagged as
//! `{"event": name, "data": ...}`.

use crate::core_invite::{Invitation, InviteFeedback, PendingInvite};
use crate::core_presence::PresenceEntry;
use crate::core_relay::{Ack, RelayRequest};
use crate::core_store::{MessageBody, StoredMessage};
use crate::types::{MessageId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Frame decoding errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),
}

// ============================================================================
// Inbound
// ============================================================================

/// Raw inbound envelope
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    /// Present when the client wants an acknowledgement
    #[serde(default)]
    pub ack: Option<u64>,
}

impl ClientFrame {
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data, ack: None }
    }

    pub fn with_ack(mut self, id: u64) -> Self {
        self.ack = Some(id);
        self
    }
}

/// `invite_response` payload; `to` is the original inviter
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InviteAnswer {
    pub to: UserId,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextPayload {
    pub sender: UserId,
    pub receiver: UserId,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "replyTo", default)]
    pub reply_to: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VoicePayload {
    pub sender: UserId,
    pub receiver: UserId,
    pub audio: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "replyTo", default)]
    pub reply_to: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilePayload {
    pub sender: UserId,
    pub receiver: UserId,
    pub file: String,
    #[serde(rename = "fileType")]
    pub file_type: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(rename = "replyTo", default)]
    pub reply_to: Option<Value>,
}

/// Typed inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    SendInvite(Invitation),
    ConfirmResendInvite(Invitation),
    InviteResponse(InviteAnswer),
    SendMessage(TextPayload),
    VoiceMessage(VoicePayload),
    FileMessage(FilePayload),
}

impl ClientEvent {
    pub fn from_frame(frame: &ClientFrame) -> Result<Self, CodecError> {
        let data = frame.data.clone();
        let event = match frame.event.as_str() {
            "send_invite" => ClientEvent::SendInvite(serde_json::from_value(data)?),
            "confirm_resend_invite" => ClientEvent::ConfirmResendInvite(serde_json::from_value(data)?),
            "invite_response" => ClientEvent::InviteResponse(serde_json::from_value(data)?),
            "send_message" => ClientEvent::SendMessage(serde_json::from_value(data)?),
            "voice_message" => ClientEvent::VoiceMessage(serde_json::from_value(data)?),
            "file_message" => ClientEvent::FileMessage(serde_json::from_value(data)?),
            other => return Err(CodecError::UnknownEvent(other.to_string())),
        };
        Ok(event)
    }

    /// The user this event claims to come from, when it names one
    pub fn claimed_sender(&self) -> Option<&UserId> {
        match self {
            ClientEvent::SendInvite(r) | ClientEvent::ConfirmResendInvite(r) => Some(&r.from),
            ClientEvent::InviteResponse(_) => None,
            ClientEvent::SendMessage(p) => Some(&p.sender),
            ClientEvent::VoiceMessage(p) => Some(&p.sender),
            ClientEvent::FileMessage(p) => Some(&p.sender),
        }
    }

    /// Convert a message event into a relay request
    pub fn into_relay_request(self) -> Option<RelayRequest> {
        let request = match self {
            ClientEvent::SendMessage(p) => RelayRequest {
                sender: p.sender,
                receiver: p.receiver,
                timestamp: p.timestamp,
                reply_to: p.reply_to,
                body: MessageBody::Text { message: p.message },
            },
            ClientEvent::VoiceMessage(p) => RelayRequest {
                sender: p.sender,
                receiver: p.receiver,
                timestamp: p.timestamp,
                reply_to: p.reply_to,
                body: MessageBody::Voice { audio: p.audio, duration: p.duration },
            },
            ClientEvent::FileMessage(p) => RelayRequest {
                sender: p.sender,
                receiver: p.receiver,
                timestamp: p.timestamp,
                reply_to: p.reply_to,
                body: MessageBody::File {
                    url: p.file,
                    mime_type: p.file_type,
                    file_name: p.file_name,
                    size: p.size,
                },
            },
            _ => return None,
        };
        Some(request)
    }
}

// ============================================================================
// Outbound
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfflineNotice {
    #[serde(rename = "userID")]
    pub user_id: UserId,
}

/// Outcome of an invite, sent to the inviter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InviteOutcome {
    pub from: UserId,
    #[serde(rename = "fromName")]
    pub from_name: String,
    pub accepted: bool,
}

/// Live `receive_message` forward
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextForward {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub sender: UserId,
    pub message: String,
    pub timestamp: Timestamp,
    #[serde(rename = "replyTo")]
    pub reply_to: Option<Value>,
}

/// Live `voice_message` forward
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceForward {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub from: UserId,
    pub audio: String,
    pub timestamp: Timestamp,
    pub duration: f64,
    #[serde(rename = "replyTo")]
    pub reply_to: Option<Value>,
}

/// Live `receive_file_message` forward
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileForward {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub sender: UserId,
    pub receiver: UserId,
    pub file: String,
    #[serde(rename = "fileType")]
    pub file_type: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub timestamp: Timestamp,
    #[serde(rename = "replyTo")]
    pub reply_to: Option<Value>,
    pub from: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Error,
}

/// Direct acknowledgement of one inbound frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AckFrame {
    pub id: u64,
    pub status: AckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<StoredMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AckFrame {
    pub fn new(id: u64, ack: Ack) -> Self {
        match ack {
            Ack::Ok(message) => {
                Self { id, status: AckStatus::Ok, data: Some(message), error: None }
            }
            Ack::Error(reason) => {
                Self { id, status: AckStatus::Error, data: None, error: Some(reason) }
            }
        }
    }

    /// Bare acknowledgement for events whose reply travels separately
    pub fn ok(id: u64) -> Self {
        Self { id, status: AckStatus::Ok, data: None, error: None }
    }

    pub fn error(id: u64, reason: impl Into<String>) -> Self {
        Self { id, status: AckStatus::Error, data: None, error: Some(reason.into()) }
    }

    pub fn is_ok(&self) -> bool {
        self.status == AckStatus::Ok
    }
}

/// Event pushed to a connected client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename = "user-online")]
    UserOnline(PresenceEntry),
    #[serde(rename = "user-offline")]
    UserOffline(OfflineNotice),
    #[serde(rename = "online-users")]
    OnlineUsers(Vec<PresenceEntry>),
    ReceiveInvite(PendingInvite),
    InviteFeedback(InviteFeedback),
    InviteResult(InviteOutcome),
    ReceiveMessage(TextForward),
    VoiceMessage(VoiceForward),
    ReceiveFileMessage(FileForward),
    Ack(AckFrame),
}

impl ServerEvent {
    /// Build the kind-specific live forward for a persisted message
    pub fn forward(message: &StoredMessage) -> Self {
        let id = message.id.clone();
        let reply_to = message.reply_to.clone();
        match &message.body {
            MessageBody::Text { message: text } => ServerEvent::ReceiveMessage(TextForward {
                id,
                sender: message.sender.clone(),
                message: text.clone(),
                timestamp: message.timestamp,
                reply_to,
            }),
            MessageBody::Voice { audio, duration } => ServerEvent::VoiceMessage(VoiceForward {
                id,
                from: message.sender.clone(),
                audio: audio.clone(),
                timestamp: message.timestamp,
                duration: *duration,
                reply_to,
            }),
            MessageBody::File { url, mime_type, file_name, size } => {
                ServerEvent::ReceiveFileMessage(FileForward {
                    id,
                    sender: message.sender.clone(),
                    receiver: message.receiver.clone(),
                    file: url.clone(),
                    file_type: mime_type.clone(),
                    file_name: file_name.clone(),
                    size: *size,
                    timestamp: message.timestamp,
                    reply_to,
                    from: message.sender.clone(),
                })
            }
        }
    }

    /// Wire name of this event
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::UserOnline(_) => "user-online",
            ServerEvent::UserOffline(_) => "user-offline",
            ServerEvent::OnlineUsers(_) => "online-users",
            ServerEvent::ReceiveInvite(_) => "receive_invite",
            ServerEvent::InviteFeedback(_) => "invite_feedback",
            ServerEvent::InviteResult(_) => "invite_result",
            ServerEvent::ReceiveMessage(_) => "receive_message",
            ServerEvent::VoiceMessage(_) => "voice_message",
            ServerEvent::ReceiveFileMessage(_) => "receive_file_message",
            ServerEvent::Ack(_) => "ack",
        }
    }

    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_send_invite() {
        let frame = ClientFrame::decode(
            r#"{"event":"send_invite","data":{"from":"a","to":"b","fromName":"Alice","picture":"p.png"}}"#,
        )
        .unwrap();
        assert_eq!(frame.ack, None);

        let event = ClientEvent::from_frame(&frame).unwrap();
        match event {
            ClientEvent::SendInvite(r) => {
                assert_eq!(r.to, UserId::new("b"));
                assert_eq!(r.from_name, "Alice");
                assert_eq!(r.picture.as_deref(), Some("p.png"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_rejected() {
        let frame = ClientFrame::new("shout", json!({}));
        assert!(matches!(ClientEvent::from_frame(&frame), Err(CodecError::UnknownEvent(_))));
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let frame = ClientFrame::new("send_message", json!({"sender": "a", "message": "hi"}));
        assert!(matches!(ClientEvent::from_frame(&frame), Err(CodecError::Json(_))));
    }

    #[test]
    fn test_file_message_to_relay_request() {
        let frame = ClientFrame::new(
            "file_message",
            json!({
                "sender": "a", "receiver": "b", "file": "/uploads/x.png",
                "fileType": "image/png", "fileName": "x.png",
                "timestamp": "2024-01-02T03:04:05.006Z", "replyTo": {"_id": "m1"}
            }),
        )
        .with_ack(7);
        assert_eq!(frame.ack, Some(7));

        let request = ClientEvent::from_frame(&frame).unwrap().into_relay_request().unwrap();
        assert_eq!(request.timestamp, Some(Timestamp::from_millis(1_704_164_645_006)));
        assert_eq!(request.body.kind().as_str(), "file");
        assert_eq!(request.reply_to, Some(json!({"_id": "m1"})));
    }

    #[test]
    fn test_forward_shapes() {
        let stored = StoredMessage {
            id: MessageId("m1".to_string()),
            sender: UserId::new("a"),
            receiver: UserId::new("b"),
            timestamp: Timestamp::from_millis(5),
            body: MessageBody::Voice { audio: "AAA".to_string(), duration: 1.5 },
            reply_to: None,
        };
        let value = serde_json::to_value(ServerEvent::forward(&stored)).unwrap();
        assert_eq!(
            value,
            json!({"event": "voice_message", "data": {
                "_id": "m1", "from": "a", "audio": "AAA", "timestamp": 5,
                "duration": 1.5, "replyTo": null
            }})
        );
    }

    #[test]
    fn test_presence_event_names() {
        let online = ServerEvent::UserOnline(PresenceEntry {
            user_id: UserId::new("a"),
            name: "Alice".to_string(),
        });
        let value = serde_json::to_value(&online).unwrap();
        assert_eq!(value, json!({"event": "user-online", "data": {"userID": "a", "name": "Alice"}}));
        assert_eq!(online.name(), "user-online");

        let offline = ServerEvent::UserOffline(OfflineNotice { user_id: UserId::new("a") });
        assert_eq!(offline.to_json().unwrap(), r#"{"event":"user-offline","data":{"userID":"a"}}"#);
    }

    #[test]
    fn test_error_ack_shape() {
        let ack = ServerEvent::Ack(AckFrame::new(3, Ack::Error("store unavailable".to_string())));
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(
            value,
            json!({"event": "ack", "data": {"id": 3, "status": "error", "error": "store unavailable"}})
        );
    }
}
