//! Invite error types

use crate::core_store::StoreError;
use crate::types::UserId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("Cannot invite yourself")]
    SelfInvite,

    #[error("Unknown user: {0}")]
    UnknownUser(UserId),

    #[error("No pending request from {inviter} to {responder}")]
    NoPendingRequest { inviter: UserId, responder: UserId },

    #[error("No declined request from {from} to {to} to resend")]
    NoDeclinedRequest { from: UserId, to: UserId },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type InviteResult<T> = Result<T, InviteError>;
