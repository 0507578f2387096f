//! Merge request snapshots carried by review webhook events.

use serde::{Deserialize, Serialize};

/// Remote review flavour. Only merge requests can trigger builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    MergeRequest,
    /// A review over an arbitrary set of commits, with no branches.
    CommitSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Author,
    Reviewer,
    Watcher,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerState {
    Accepted,
    Rejected,
    Resumed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub role: ParticipantRole,
    /// `None` until the participant has voted.
    #[serde(default)]
    pub state: Option<ReviewerState>,
}

/// One repository/branch pairing of a merge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPair {
    pub repository: String,
    pub source_branch: String,
    pub source_ref: String,
    pub target_branch: String,
    pub target_ref: String,
}

/// The state of a review at the time an event was emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequestSnapshot {
    pub id: String,
    pub number: u64,
    pub project_key: String,
    pub title: String,
    #[serde(default = "default_kind")]
    pub kind: ReviewKind,
    #[serde(default)]
    pub branch_pairs: Vec<BranchPair>,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

fn default_kind() -> ReviewKind {
    ReviewKind::MergeRequest
}

impl MergeRequestSnapshot {
    pub fn is_merge_request(&self) -> bool {
        self.kind == ReviewKind::MergeRequest
    }

    /// The branch pair builds are started from.
    pub fn primary_branch_pair(&self) -> Option<&BranchPair> {
        self.branch_pairs.first()
    }

    /// Returns true if there is at least one reviewer and all of them accepted.
    pub fn all_reviewers_accepted(&self) -> bool {
        let mut reviewers = self
            .participants
            .iter()
            .filter(|p| p.role == ParticipantRole::Reviewer)
            .peekable();

        reviewers.peek().is_some()
            && reviewers.all(|p| p.state == Some(ReviewerState::Accepted))
    }

    /// Web URL of the review.
    pub fn url(&self, space_url: &str, repository: &str) -> String {
        format!(
            "{}/p/{}/repositories/{}/reviews/{}/timeline",
            space_url.trim_end_matches('/'),
            self.project_key,
            repository,
            self.number
        )
    }
}
