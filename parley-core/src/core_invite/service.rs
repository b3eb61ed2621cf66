//! Invite state machine
//!
//! Every operation takes the pair lock for `{from, to}`, re-reads both user
//! records, classifies the relationship and only then writes, so two
//! operations on the same pair can never interleave between decision and
//! write. The write itself is a single compare-and-set over both mirrored
//! request entries.

use super::errors::{InviteError, InviteResult};
use super::feedback::InviteFeedback;
use super::pair_lock::PairLocks;
use super::queue::PendingInvite;
use super::state::RelationshipState;
use crate::core_presence::{Delivery, PresenceBroadcaster};
use crate::core_store::{RequestStatus, RequestTransition, StoreError, UserRecord, UserStore};
use crate::events::{InviteOutcome, ServerEvent};
use crate::types::UserId;
use metrics::counter;
use serde::Deserialize;
use std::sync::Arc;

/// `send_invite` / `confirm_resend_invite` payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Invitation {
    pub from: UserId,
    pub to: UserId,
    #[serde(rename = "fromName", default)]
    pub from_name: String,
    #[serde(default)]
    pub picture: Option<String>,
}

impl Invitation {
    pub fn new(from: impl Into<UserId>, to: impl Into<UserId>, from_name: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into(), from_name: from_name.into(), picture: None }
    }

    /// Notification for the target, falling back to the stored sender profile
    fn notice(&self, sender: &UserRecord) -> PendingInvite {
        let from_name = if self.from_name.trim().is_empty() {
            sender.name.clone()
        } else {
            self.from_name.clone()
        };
        PendingInvite {
            from: self.from.clone(),
            from_name,
            picture: self.picture.clone().or_else(|| sender.picture.clone()),
        }
    }
}

#[derive(Clone)]
pub struct InviteService {
    users: Arc<dyn UserStore>,
    presence: PresenceBroadcaster,
    locks: PairLocks,
}

impl InviteService {
    pub fn new(users: Arc<dyn UserStore>, presence: PresenceBroadcaster) -> Self {
        Self { users, presence, locks: PairLocks::new() }
    }

    /// Classify and, for a fresh pair, create the mirrored request
    pub async fn send_invite(&self, invite: &Invitation) -> InviteFeedback {
        self.try_send(invite, false).await.unwrap_or_else(|e| Self::failed(invite, e))
    }

    /// Second phase after a `declined` feedback: overwrite the declined pair
    /// back to `request` and deliver again
    pub async fn confirm_resend_invite(&self, invite: &Invitation) -> InviteFeedback {
        self.try_send(invite, true).await.unwrap_or_else(|e| Self::failed(invite, e))
    }

    /// Accept or decline the live request `inviter` sent to `responder`
    ///
    /// On accept both users become friends. The inviter, if connected, is
    /// told the outcome.
    pub async fn respond_to_invite(
        &self,
        responder: &UserId,
        responder_name: &str,
        inviter: &UserId,
        accepted: bool,
    ) -> InviteResult<()> {
        if responder == inviter {
            return Err(InviteError::SelfInvite);
        }

        let _pair = self.locks.lock(responder, inviter).await;

        let record = self.load(responder).await?;
        match record.received_from(inviter) {
            Some(request) if request.status == RequestStatus::Request => {}
            _ => {
                return Err(InviteError::NoPendingRequest {
                    inviter: inviter.clone(),
                    responder: responder.clone(),
                })
            }
        }

        self.users
            .transition_request(RequestTransition::resolve(
                inviter.clone(),
                responder.clone(),
                accepted,
            ))
            .await?;

        counter!("invites.responses.total", "accepted" => accepted.to_string()).increment(1);
        if accepted {
            tracing::info!(inviter = %inviter, responder = %responder, "friendship stored");
        } else {
            tracing::info!(inviter = %inviter, responder = %responder, "invite declined");
        }

        let outcome = ServerEvent::InviteResult(InviteOutcome {
            from: responder.clone(),
            from_name: responder_name.to_string(),
            accepted,
        });
        if !self.presence.notify(inviter, outcome).await {
            tracing::debug!(inviter = %inviter, "inviter offline, result not delivered");
        }

        Ok(())
    }

    async fn try_send(&self, invite: &Invitation, resend: bool) -> InviteResult<InviteFeedback> {
        if invite.from == invite.to {
            return Err(InviteError::SelfInvite);
        }

        let _pair = self.locks.lock(&invite.from, &invite.to).await;

        let sender = self.load(&invite.from).await?;
        let target = self.load(&invite.to).await?;

        let state = RelationshipState::classify(&sender, &invite.to);
        let transition = match state {
            RelationshipState::Friends
            | RelationshipState::SentAccepted
            | RelationshipState::ReceivedAccepted => {
                if state != RelationshipState::Friends {
                    tracing::warn!(
                        from = %invite.from,
                        to = %invite.to,
                        ?state,
                        "accepted request without friend link"
                    );
                }
                return Ok(InviteFeedback::friend(&invite.to));
            }
            RelationshipState::SentPending => return Ok(InviteFeedback::pending(&invite.to)),
            RelationshipState::SentDeclined if resend => {
                RequestTransition::reopen(invite.from.clone(), invite.to.clone())
            }
            RelationshipState::SentDeclined => return Ok(InviteFeedback::declined(&invite.to)),
            RelationshipState::ReceivedPending => return Ok(InviteFeedback::incoming(&target)),
            // resend is the second phase of a decline, never a first invite
            RelationshipState::None if resend => {
                return Err(InviteError::NoDeclinedRequest {
                    from: invite.from.clone(),
                    to: invite.to.clone(),
                })
            }
            RelationshipState::None => RequestTransition::open(invite.from.clone(), invite.to.clone()),
        };

        self.users.transition_request(transition).await?;
        counter!("invites.sent.total", "resend" => resend.to_string()).increment(1);

        let delivery = self.presence.deliver_or_enqueue(&invite.to, invite.notice(&sender)).await;
        let live = delivery == Delivery::Live;
        tracing::info!(
            from = %invite.from,
            to = %invite.to,
            live,
            resend,
            "invite sent"
        );

        Ok(InviteFeedback::success(&invite.to))
    }

    async fn load(&self, user_id: &UserId) -> InviteResult<UserRecord> {
        self.users
            .find_user(user_id)
            .await?
            .ok_or_else(|| InviteError::UnknownUser(user_id.clone()))
    }

    fn failed(invite: &Invitation, error: InviteError) -> InviteFeedback {
        match &error {
            InviteError::Store(StoreError::Conflict(reason)) => {
                tracing::warn!(from = %invite.from, to = %invite.to, %reason, "invite write conflicted");
                InviteFeedback::error(&invite.to, "Invite state changed, try again")
            }
            InviteError::Store(e) => {
                tracing::error!(from = %invite.from, to = %invite.to, error = %e, "invite failed");
                InviteFeedback::error(&invite.to, "Could not send invite")
            }
            other => {
                tracing::warn!(from = %invite.from, to = %invite.to, error = %other, "invite rejected");
                InviteFeedback::error(&invite.to, other.to_string())
            }
        }
    }
}
