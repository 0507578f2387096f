//! Typed webhook payloads.
//!
//! The transport layer verifies the delivery and hands over one of these. The
//! variant set is closed: adding an event kind means extending this enum and
//! the classifier's dispatch together.

use serde::{Deserialize, Serialize};

use crate::types::{ClientId, EventKind, MergeRequestSnapshot, ReviewerState, WebhookId};

/// A parsed SpaceCode webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WebhookEvent {
    /// One or more branch heads of a repository moved.
    BranchHeadsChanged {
        project_key: String,
        repository: String,
        /// The refs that moved. Older payloads omit them.
        #[serde(default)]
        refs: Vec<String>,
    },

    /// A review was opened.
    ReviewCreated { review: MergeRequestSnapshot },

    /// A review's title was edited.
    ///
    /// Both titles travel in the payload, so title transitions can be judged
    /// from this event alone.
    ReviewTitleChanged {
        review: MergeRequestSnapshot,
        old_title: String,
        new_title: String,
    },

    /// A participant joined, left, or changed their vote.
    ReviewParticipantChanged {
        review: MergeRequestSnapshot,
        /// Present when the change was a reviewer vote.
        #[serde(default)]
        reviewer_state: Option<ReviewerState>,
    },

    /// New commits were pushed to a review's source branch.
    ReviewCommitsChanged { review: MergeRequestSnapshot },
}

impl WebhookEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WebhookEvent::BranchHeadsChanged { .. } => EventKind::BranchHeadsChanged,
            WebhookEvent::ReviewCreated { .. } => EventKind::ReviewCreated,
            WebhookEvent::ReviewTitleChanged { .. } => EventKind::ReviewTitleChanged,
            WebhookEvent::ReviewParticipantChanged { .. } => EventKind::ReviewParticipantChanged,
            WebhookEvent::ReviewCommitsChanged { .. } => EventKind::ReviewCommitsChanged,
        }
    }

    /// The review the event is about, for review events.
    pub fn review(&self) -> Option<&MergeRequestSnapshot> {
        match self {
            WebhookEvent::BranchHeadsChanged { .. } => None,
            WebhookEvent::ReviewCreated { review }
            | WebhookEvent::ReviewTitleChanged { review, .. }
            | WebhookEvent::ReviewParticipantChanged { review, .. }
            | WebhookEvent::ReviewCommitsChanged { review } => Some(review),
        }
    }
}

/// One inbound webhook call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub webhook_id: WebhookId,
    pub client_id: ClientId,
    pub payload: WebhookEvent,
}
