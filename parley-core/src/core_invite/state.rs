//! Relationship classification
//!
//! Decides, from the sender's record alone, what an invite from `from` to
//! `to` would mean. Cases are checked in a fixed order and the first match
//! wins:
//!
//! friends → sent pending → sent accepted → sent declined → received pending
//! → received accepted → none

use crate::core_store::{RequestStatus, UserRecord};
use crate::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipState {
    /// No request in either direction
    None,
    Friends,
    /// `from` already has a live request out to `to`
    SentPending,
    /// Accepted request but no friend link (inconsistent data)
    SentAccepted,
    SentDeclined,
    /// `to` already asked `from`
    ReceivedPending,
    ReceivedAccepted,
}

impl RelationshipState {
    pub fn classify(from: &UserRecord, to: &UserId) -> Self {
        if from.is_friend(to) {
            return RelationshipState::Friends;
        }

        let sent = |status: RequestStatus| {
            from.sent_requests.iter().any(|r| &r.to == to && r.status == status)
        };
        let received = |status: RequestStatus| {
            from.my_requests.iter().any(|r| &r.from == to && r.status == status)
        };

        if sent(RequestStatus::Request) {
            RelationshipState::SentPending
        } else if sent(RequestStatus::Accept) {
            RelationshipState::SentAccepted
        } else if sent(RequestStatus::Decline) {
            RelationshipState::SentDeclined
        } else if received(RequestStatus::Request) {
            RelationshipState::ReceivedPending
        } else if received(RequestStatus::Accept) {
            RelationshipState::ReceivedAccepted
        } else {
            // a received decline does not block a fresh request the other way
            RelationshipState::None
        }
    }
}
