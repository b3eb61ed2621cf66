//! `invite_feedback` payloads sent back to the inviter

use crate::core_store::UserRecord;
use crate::types::UserId;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    Success,
    Pending,
    Friend,
    Declined,
    Incoming,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteFeedback {
    pub status: FeedbackStatus,
    pub message: String,
    /// The invite target this feedback is about
    pub to: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_resend: Option<bool>,
    /// Counterpart display info for `incoming`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl InviteFeedback {
    fn new(status: FeedbackStatus, to: &UserId, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            to: to.clone(),
            confirm_resend: None,
            from: None,
            from_name: None,
            picture: None,
        }
    }

    pub fn success(to: &UserId) -> Self {
        Self::new(FeedbackStatus::Success, to, "Invite sent")
    }

    pub fn pending(to: &UserId) -> Self {
        Self::new(FeedbackStatus::Pending, to, "Invite already pending")
    }

    pub fn friend(to: &UserId) -> Self {
        Self::new(FeedbackStatus::Friend, to, "Already friends")
    }

    pub fn declined(to: &UserId) -> Self {
        let mut feedback =
            Self::new(FeedbackStatus::Declined, to, "Invite was declined, send again?");
        feedback.confirm_resend = Some(true);
        feedback
    }

    /// The target already sent us a request; suggest accepting it instead
    pub fn incoming(counterpart: &UserRecord) -> Self {
        let mut feedback = Self::new(
            FeedbackStatus::Incoming,
            &counterpart.user_id,
            format!("{} already sent you an invite", counterpart.name),
        );
        feedback.from = Some(counterpart.user_id.clone());
        feedback.from_name = Some(counterpart.name.clone());
        feedback.picture = counterpart.picture.clone();
        feedback
    }

    pub fn error(to: &UserId, message: impl Into<String>) -> Self {
        Self::new(FeedbackStatus::Error, to, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_declined_carries_confirm_resend() {
        let value = serde_json::to_value(InviteFeedback::declined(&UserId::new("b"))).unwrap();
        assert_eq!(value["status"], "declined");
        assert_eq!(value["confirmResend"], true);
        assert!(value.get("fromName").is_none());
    }

    #[test]
    fn test_incoming_carries_counterpart() {
        let bob = UserRecord::new(UserId::new("b"), "Bob").with_picture("b.png");
        let value = serde_json::to_value(InviteFeedback::incoming(&bob)).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "incoming",
                "message": "Bob already sent you an invite",
                "to": "b",
                "from": "b",
                "fromName": "Bob",
                "picture": "b.png"
            })
        );
    }
}
