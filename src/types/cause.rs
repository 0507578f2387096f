//! Build causes: the metadata attached to every execution this crate starts.
//!
//! A cause is created once, when the dispatcher schedules a build, and is
//! owned by the queue entry (and later the execution) it annotates. It carries
//! everything needed to inject environment variables into the build and to
//! report status back when the build finishes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::ConnectionId;
use super::trigger::TriggerType;

/// The remote event that produced a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    BranchHeadsChanged,
    ReviewCreated,
    ReviewTitleChanged,
    ReviewParticipantChanged,
    ReviewCommitsChanged,
    SafeMerge,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BranchHeadsChanged => "branch_heads_changed",
            EventKind::ReviewCreated => "review_created",
            EventKind::ReviewTitleChanged => "review_title_changed",
            EventKind::ReviewParticipantChanged => "review_participant_changed",
            EventKind::ReviewCommitsChanged => "review_commits_changed",
            EventKind::SafeMerge => "safe_merge",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequestInfo {
    pub id: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub source_branch: String,
    pub source_ref: String,
    pub target_branch: String,
    pub target_ref: String,
}

/// Present only on builds started by a safe-merge command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeMergeInfo {
    /// Temporary branch holding the speculative merge.
    pub branch: String,
    pub commit: String,
    pub is_dry_run: bool,
    pub started_by_user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildCause {
    pub connection_id: ConnectionId,
    pub space_url: String,
    pub project_key: String,
    pub repository_name: String,
    pub trigger_type: TriggerType,
    pub event_kind: EventKind,
    pub merge_request: Option<MergeRequestInfo>,
    pub safe_merge: Option<SafeMergeInfo>,
}

impl BuildCause {
    pub fn is_safe_merge(&self) -> bool {
        self.safe_merge.is_some()
    }

    /// One-line description shown as the build's cause.
    pub fn short_description(&self) -> String {
        match (&self.safe_merge, &self.merge_request) {
            (Some(sm), Some(mr)) if sm.is_dry_run => format!(
                "Safe merge dry run of merge request #{} \"{}\"",
                mr.number, mr.title
            ),
            (Some(_), Some(mr)) => {
                format!("Safe merge of merge request #{} \"{}\"", mr.number, mr.title)
            }
            (Some(sm), None) => format!("Safe merge of {}", sm.branch),
            (None, Some(mr)) => format!(
                "Triggered by SpaceCode merge request #{} \"{}\" ({})",
                mr.number,
                mr.title,
                self.event_kind.as_str()
            ),
            (None, None) => format!(
                "Triggered by push to SpaceCode repository {}/{}",
                self.project_key, self.repository_name
            ),
        }
    }

    /// Environment variables injected into the build.
    pub fn environment(&self) -> BTreeMap<&'static str, String> {
        let mut env = BTreeMap::new();
        env.insert("SPACE_URL", self.space_url.clone());
        env.insert("SPACE_PROJECT", self.project_key.clone());
        env.insert("SPACE_REPOSITORY", self.repository_name.clone());
        env.insert("SPACE_TRIGGER_TYPE", self.trigger_type.as_str().to_string());
        env.insert("SPACE_EVENT", self.event_kind.as_str().to_string());

        if let Some(mr) = &self.merge_request {
            env.insert("SPACE_MERGE_REQUEST_ID", mr.id.clone());
            env.insert("SPACE_MERGE_REQUEST_NUMBER", mr.number.to_string());
            env.insert("SPACE_MERGE_REQUEST_TITLE", mr.title.clone());
            env.insert("SPACE_MERGE_REQUEST_URL", mr.url.clone());
            env.insert("SPACE_MERGE_REQUEST_SOURCE_BRANCH", mr.source_branch.clone());
            env.insert("SPACE_MERGE_REQUEST_SOURCE_REF", mr.source_ref.clone());
            env.insert("SPACE_MERGE_REQUEST_TARGET_BRANCH", mr.target_branch.clone());
            env.insert("SPACE_MERGE_REQUEST_TARGET_REF", mr.target_ref.clone());
        }

        if let Some(sm) = &self.safe_merge {
            env.insert("SPACE_SAFE_MERGE_BRANCH", sm.branch.clone());
            env.insert("SPACE_SAFE_MERGE_COMMIT", sm.commit.clone());
            env.insert("SPACE_SAFE_MERGE_DRY_RUN", sm.is_dry_run.to_string());
            if let Some(user) = &sm.started_by_user_id {
                env.insert("SPACE_SAFE_MERGE_STARTED_BY", user.clone());
            }
        }

        env
    }
}
