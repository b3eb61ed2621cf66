//! Persisted record shapes
//!
//! Field names on the wire follow the stored document layout
//! (`userID`, `sentRequests[{receiver_id,status}]`, `myRequests[{sender_id,status}]`,
//! `_id`, `replyTo`, `fileType`, `fileName`).

use crate::types::{MessageId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Status shared by both halves of a mirrored friend request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Request,
    Accept,
    Decline,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Request => "request",
            RequestStatus::Accept => "accept",
            RequestStatus::Decline => "decline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "request" => Some(RequestStatus::Request),
            "accept" => Some(RequestStatus::Accept),
            "decline" => Some(RequestStatus::Decline),
            _ => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound half of a friend request, kept on the sender's record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentRequest {
    #[serde(rename = "receiver_id")]
    pub to: UserId,
    pub status: RequestStatus,
}

/// Inbound half of a friend request, kept on the receiver's record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedRequest {
    #[serde(rename = "sender_id")]
    pub from: UserId,
    pub status: RequestStatus,
}

/// A user as the relay sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    pub name: String,
    pub picture: Option<String>,
    /// Symmetric: if A lists B, B lists A
    pub friends: BTreeSet<UserId>,
    pub sent_requests: Vec<SentRequest>,
    pub my_requests: Vec<ReceivedRequest>,
}

impl UserRecord {
    pub fn new(user_id: UserId, name: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
            picture: None,
            friends: BTreeSet::new(),
            sent_requests: Vec::new(),
            my_requests: Vec::new(),
        }
    }

    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = Some(picture.into());
        self
    }

    pub fn is_friend(&self, other: &UserId) -> bool {
        self.friends.contains(other)
    }

    /// The outbound request addressed to `to`, if any
    pub fn sent_to(&self, to: &UserId) -> Option<&SentRequest> {
        self.sent_requests.iter().find(|r| &r.to == to)
    }

    /// The inbound request sent by `from`, if any
    pub fn received_from(&self, from: &UserId) -> Option<&ReceivedRequest> {
        self.my_requests.iter().find(|r| &r.from == from)
    }
}

/// Message payload variant, flattened into the stored message
///
/// Variant order matters for untagged deserialization: the file and voice
/// shapes carry more required fields than plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBody {
    File {
        #[serde(rename = "file")]
        url: String,
        #[serde(rename = "fileType")]
        mime_type: String,
        #[serde(rename = "fileName")]
        file_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<u64>,
    },
    Voice {
        audio: String,
        /// Seconds
        duration: f64,
    },
    Text {
        message: String,
    },
}

impl MessageBody {
    pub fn text(body: impl Into<String>) -> Self {
        MessageBody::Text { message: body.into() }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text { .. } => MessageKind::Text,
            MessageBody::Voice { .. } => MessageKind::Voice,
            MessageBody::File { .. } => MessageKind::File,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Voice,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Voice => "voice",
            MessageKind::File => "file",
        }
    }
}

/// A message before the store has assigned its id
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender: UserId,
    pub receiver: UserId,
    pub timestamp: Timestamp,
    pub body: MessageBody,
    /// Opaque reference to an earlier message
    pub reply_to: Option<serde_json::Value>,
}

impl NewMessage {
    pub fn into_stored(self, id: MessageId) -> StoredMessage {
        StoredMessage {
            id,
            sender: self.sender,
            receiver: self.receiver,
            timestamp: self.timestamp,
            body: self.body,
            reply_to: self.reply_to,
        }
    }
}

/// An immutable persisted message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub sender: UserId,
    pub receiver: UserId,
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub body: MessageBody,
    #[serde(default)]
    pub reply_to: Option<serde_json::Value>,
}

/// Message lookup filter
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    /// Both directions between the two users
    pub conversation: Option<(UserId, UserId)>,
    /// Keep only the most recent `limit` messages
    pub limit: Option<usize>,
}

impl MessageFilter {
    pub fn between(a: UserId, b: UserId) -> Self {
        Self { conversation: Some((a, b)), limit: None }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, message: &StoredMessage) -> bool {
        match &self.conversation {
            Some((a, b)) => {
                (&message.sender == a && &message.receiver == b)
                    || (&message.sender == b && &message.receiver == a)
            }
            None => true,
        }
    }
}

/// Compare-and-set over one mirrored request pair
///
/// Both the sender's `sentRequests` entry and the receiver's `myRequests`
/// entry must currently hold `expected` (`None` means both absent). Only
/// then are both set to `next`, and with `befriend` each user is added to
/// the other's friend set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTransition {
    pub sender: UserId,
    pub receiver: UserId,
    pub expected: Option<RequestStatus>,
    pub next: RequestStatus,
    pub befriend: bool,
}

impl RequestTransition {
    /// Create a fresh request pair
    pub fn open(sender: UserId, receiver: UserId) -> Self {
        Self { sender, receiver, expected: None, next: RequestStatus::Request, befriend: false }
    }

    /// Overwrite a declined pair back to a live request
    pub fn reopen(sender: UserId, receiver: UserId) -> Self {
        Self {
            sender,
            receiver,
            expected: Some(RequestStatus::Decline),
            next: RequestStatus::Request,
            befriend: false,
        }
    }

    /// Accept or decline a live request
    pub fn resolve(sender: UserId, receiver: UserId, accepted: bool) -> Self {
        Self {
            sender,
            receiver,
            expected: Some(RequestStatus::Request),
            next: if accepted { RequestStatus::Accept } else { RequestStatus::Decline },
            befriend: accepted,
        }
    }
}
