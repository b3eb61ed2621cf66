//! Message relay
//!
//! Persist first, then forward. A message that failed to persist is never
//! forwarded; a message whose receiver is offline is still acknowledged and
//! stays reachable through history.

use crate::core_presence::ConnectionRegistry;
use crate::core_store::{MessageBody, MessageStore, NewMessage, StoredMessage};
use crate::events::ServerEvent;
use crate::types::{Timestamp, UserId};
use metrics::counter;
use serde_json::Value;
use std::sync::Arc;

/// A message as submitted by its sender
#[derive(Debug, Clone, PartialEq)]
pub struct RelayRequest {
    pub sender: UserId,
    pub receiver: UserId,
    /// Client supplied; server time when absent
    pub timestamp: Option<Timestamp>,
    pub reply_to: Option<Value>,
    pub body: MessageBody,
}

/// Acknowledgement returned to the sender
#[derive(Debug, Clone, PartialEq)]
pub enum Ack {
    Ok(StoredMessage),
    Error(String),
}

impl Ack {
    pub fn is_ok(&self) -> bool {
        matches!(self, Ack::Ok(_))
    }

    pub fn message(&self) -> Option<&StoredMessage> {
        match self {
            Ack::Ok(message) => Some(message),
            Ack::Error(_) => None,
        }
    }
}

#[derive(Clone)]
pub struct MessageRelay {
    messages: Arc<dyn MessageStore>,
    registry: ConnectionRegistry,
}

impl MessageRelay {
    pub fn new(messages: Arc<dyn MessageStore>, registry: ConnectionRegistry) -> Self {
        Self { messages, registry }
    }

    pub async fn relay(&self, request: RelayRequest) -> Ack {
        let kind = request.body.kind().as_str();

        if request.sender.is_empty() || request.receiver.is_empty() {
            counter!("relay.messages.failed", "kind" => kind).increment(1);
            return Ack::Error("sender and receiver are required".to_string());
        }

        let message = NewMessage {
            sender: request.sender,
            receiver: request.receiver,
            timestamp: request.timestamp.unwrap_or_else(Timestamp::now),
            body: request.body,
            reply_to: request.reply_to,
        };

        let stored = match self.messages.insert_message(message).await {
            Ok(stored) => stored,
            Err(e) => {
                counter!("relay.messages.failed", "kind" => kind).increment(1);
                tracing::error!(kind, error = %e, "failed to persist message");
                return Ack::Error(e.to_string());
            }
        };
        counter!("relay.messages.persisted", "kind" => kind).increment(1);

        match self.registry.lookup(&stored.receiver).await {
            Some(entry) if entry.handle.send(ServerEvent::forward(&stored)) => {
                counter!("relay.messages.forwarded", "kind" => kind).increment(1);
                tracing::debug!(id = %stored.id, kind, receiver = %stored.receiver, "message forwarded");
            }
            _ => {
                tracing::debug!(id = %stored.id, kind, receiver = %stored.receiver, "receiver offline, stored only");
            }
        }

        Ack::Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_presence::{ConnectionEntry, ConnectionHandle};
    use crate::core_store::{MemoryStore, MessageFilter};

    fn text(sender: &str, receiver: &str, body: &str) -> RelayRequest {
        RelayRequest {
            sender: UserId::new(sender),
            receiver: UserId::new(receiver),
            timestamp: None,
            reply_to: None,
            body: MessageBody::text(body),
        }
    }

    #[tokio::test]
    async fn test_offline_receiver_is_stored_and_acked() {
        let store = Arc::new(MemoryStore::new());
        let relay = MessageRelay::new(store.clone(), ConnectionRegistry::new());

        let ack = relay.relay(text("a", "b", "hello")).await;
        let stored = ack.message().unwrap();
        assert_eq!(stored.body, MessageBody::text("hello"));
        assert!(stored.timestamp.as_millis() > 0);

        let history = store
            .find_messages(&MessageFilter::between(UserId::new("a"), UserId::new("b")))
            .await
            .unwrap();
        assert_eq!(history[0].id, stored.id);
    }

    #[tokio::test]
    async fn test_online_receiver_gets_forward_with_id() {
        let registry = ConnectionRegistry::new();
        let (handle, mut rx) = ConnectionHandle::new();
        registry
            .register(ConnectionEntry { user_id: UserId::new("b"), name: "Bob".to_string(), handle })
            .await;
        let relay = MessageRelay::new(Arc::new(MemoryStore::new()), registry);

        let mut request = text("a", "b", "hi");
        request.timestamp = Some(Timestamp::from_millis(99));
        let ack = relay.relay(request).await;

        match rx.try_recv().unwrap() {
            ServerEvent::ReceiveMessage(forward) => {
                assert_eq!(&forward.id, &ack.message().unwrap().id);
                assert_eq!(forward.timestamp, Timestamp::from_millis(99));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_persist_failure_aborts_forward() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);
        let registry = ConnectionRegistry::new();
        let (handle, mut rx) = ConnectionHandle::new();
        registry
            .register(ConnectionEntry { user_id: UserId::new("b"), name: "Bob".to_string(), handle })
            .await;
        let relay = MessageRelay::new(store, registry);

        let ack = relay.relay(text("a", "b", "lost")).await;
        assert!(matches!(ack, Ack::Error(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_blank_receiver_rejected() {
        let store = Arc::new(MemoryStore::new());
        let relay = MessageRelay::new(store.clone(), ConnectionRegistry::new());
        assert!(!relay.relay(text("a", " ", "nobody")).await.is_ok());
        assert_eq!(store.message_count().await, 0);
    }
}
