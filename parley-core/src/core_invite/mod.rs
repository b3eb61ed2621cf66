/*
    core_invite - Friend request workflow

    Handles:
    - Relationship classification for an (inviter, target) pair
    - Mirrored request creation, resend after decline, accept/decline
    - Pending invite queue for offline targets
    - Per-pair serialization of invite operations
*/

pub mod errors;
pub mod feedback;
pub mod pair_lock;
pub mod queue;
pub mod service;
pub mod state;

pub use errors::{InviteError, InviteResult};
pub use feedback::{FeedbackStatus, InviteFeedback};
pub use pair_lock::{PairGuard, PairLocks};
pub use queue::{PendingInvite, PendingInviteQueue};
pub use service::{Invitation, InviteService};
pub use state::RelationshipState;
