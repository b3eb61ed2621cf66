//! Relay hub
//!
//! Owns the registry, queue and services for one process and turns transport
//! level happenings (handshake, inbound frame, disconnect) into calls on
//! them. Nothing here is global: tests build as many isolated hubs as they
//! like.

use crate::core_invite::{InviteError, InviteFeedback, InviteService, PendingInviteQueue};
use crate::core_presence::{ConnectionEntry, ConnectionHandle, ConnectionRegistry, PresenceBroadcaster};
use crate::core_relay::MessageRelay;
use crate::core_store::{MessageStore, UserStore};
use crate::events::{AckFrame, ClientEvent, ClientFrame, ServerEvent};
use crate::types::{ConnectionId, UserId};
use serde::Deserialize;
use std::sync::Arc;

/// Identity presented when a connection opens
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Handshake {
    #[serde(rename = "userID", default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Handshake {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { user_id: Some(user_id.into()), name: Some(name.into()) }
    }

    /// Both fields present and non-blank
    pub fn identity(&self) -> Option<(UserId, String)> {
        let user_id = self.user_id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let name = self.name.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some((UserId::new(user_id), name.to_string()))
    }
}

/// A registered connection
#[derive(Debug, Clone)]
pub struct Session {
    user_id: UserId,
    name: String,
    handle: ConnectionHandle,
}

impl Session {
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.handle.id()
    }

    fn reply(&self, event: ServerEvent) {
        if !self.handle.send(event) {
            tracing::debug!(user_id = %self.user_id, "connection closed before reply");
        }
    }
}

#[derive(Clone)]
pub struct RelayHub {
    users: Arc<dyn UserStore>,
    messages: Arc<dyn MessageStore>,
    presence: PresenceBroadcaster,
    invites: InviteService,
    relay: MessageRelay,
}

impl RelayHub {
    pub fn new(users: Arc<dyn UserStore>, messages: Arc<dyn MessageStore>) -> Self {
        let registry = ConnectionRegistry::new();
        let presence = PresenceBroadcaster::new(registry.clone(), PendingInviteQueue::new());
        let invites = InviteService::new(users.clone(), presence.clone());
        let relay = MessageRelay::new(messages.clone(), registry);
        Self { users, messages, presence, invites, relay }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        self.presence.registry()
    }

    pub fn queue(&self) -> &PendingInviteQueue {
        self.presence.queue()
    }

    pub fn presence(&self) -> &PresenceBroadcaster {
        &self.presence
    }

    pub fn invites(&self) -> &InviteService {
        &self.invites
    }

    pub fn relay(&self) -> &MessageRelay {
        &self.relay
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    pub fn messages(&self) -> &Arc<dyn MessageStore> {
        &self.messages
    }

    /// Register a connection
    ///
    /// Returns `None` when the handshake lacks `userID` or `name`; such a
    /// connection never enters the registry and its events are ignored.
    pub async fn connect(&self, handshake: Handshake, handle: ConnectionHandle) -> Option<Session> {
        let Some((user_id, name)) = handshake.identity() else {
            tracing::debug!(connection = %handle.id(), "anonymous connection, not registered");
            return None;
        };

        if let Err(e) = self.users.ensure_user(&user_id, &name).await {
            // presence still works without a record; invites will report the failure
            tracing::error!(user_id = %user_id, error = %e, "failed to ensure user record");
        }

        self.presence
            .connect(ConnectionEntry { user_id: user_id.clone(), name: name.clone(), handle: handle.clone() })
            .await;

        Some(Session { user_id, name, handle })
    }

    /// Dispatch one inbound frame, returning the acknowledgement to send
    /// back when the frame asked for one
    pub async fn handle(&self, session: &Session, frame: ClientFrame) -> Option<AckFrame> {
        let ack_id = frame.ack;

        let event = match ClientEvent::from_frame(&frame) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(user_id = %session.user_id, event = %frame.event, error = %e, "dropping malformed event");
                return ack_id.map(|id| AckFrame::error(id, e.to_string()));
            }
        };

        if let Some(claimed) = event.claimed_sender() {
            if claimed != &session.user_id {
                tracing::warn!(
                    user_id = %session.user_id,
                    claimed = %claimed,
                    event = %frame.event,
                    "sender does not match connection, dropped"
                );
                return ack_id.map(|id| AckFrame::error(id, "sender does not match connection"));
            }
        }

        match event {
            ClientEvent::SendInvite(invite) => {
                let feedback = self.invites.send_invite(&invite).await;
                session.reply(ServerEvent::InviteFeedback(feedback));
                ack_id.map(AckFrame::ok)
            }
            ClientEvent::ConfirmResendInvite(invite) => {
                let feedback = self.invites.confirm_resend_invite(&invite).await;
                session.reply(ServerEvent::InviteFeedback(feedback));
                ack_id.map(AckFrame::ok)
            }
            ClientEvent::InviteResponse(answer) => {
                let result = self
                    .invites
                    .respond_to_invite(&session.user_id, &session.name, &answer.to, answer.accepted)
                    .await;
                match result {
                    Ok(()) => ack_id.map(AckFrame::ok),
                    Err(InviteError::Store(e)) => {
                        tracing::error!(user_id = %session.user_id, inviter = %answer.to, error = %e, "invite response failed");
                        session.reply(ServerEvent::InviteFeedback(InviteFeedback::error(
                            &answer.to,
                            "Could not record response",
                        )));
                        ack_id.map(|id| AckFrame::error(id, e.to_string()))
                    }
                    Err(e) => {
                        tracing::warn!(user_id = %session.user_id, inviter = %answer.to, error = %e, "invite response ignored");
                        ack_id.map(|id| AckFrame::error(id, e.to_string()))
                    }
                }
            }
            message => {
                let request = message.into_relay_request()?;
                let ack = self.relay.relay(request).await;
                ack_id.map(|id| AckFrame::new(id, ack))
            }
        }
    }

    /// Drop a connection; only removes the registry entry it still owns
    pub async fn disconnect(&self, session: Session) -> bool {
        self.presence.disconnect(&session.user_id, session.handle.id()).await
    }
}
