//! Trigger definitions and the job/connection records they hang off.
//!
//! A trigger is created and edited by job configuration; this crate only reads
//! it, except for `registered_webhook_ids`, which the webhook synchronizer
//! republishes through the trigger registry.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{ClientId, ConnectionId, JobName, TriggerId, WebhookId};
use crate::branch_spec::cached_regex;

/// Which remote events a trigger reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Pushes to branches of a repository.
    BranchPush,
    /// Merge request lifecycle events.
    MergeRequest,
    /// No webhook at all; builds only start through safe-merge commands.
    SafeMergeOnly,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::BranchPush => "branch_push",
            TriggerType::MergeRequest => "merge_request",
            TriggerType::SafeMergeOnly => "safe_merge_only",
        }
    }
}

/// Filters applied to merge request events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeRequestFilter {
    /// Full-string regex the merge request title must match.
    pub title_regex: Option<String>,
    /// Branch spec the source branch must match.
    pub source_branch_spec: Option<String>,
    /// Branch spec the target branch must match.
    pub target_branch_spec: Option<String>,
    /// Only build once every reviewer has accepted.
    pub require_all_approvals: bool,
}

impl MergeRequestFilter {
    /// Title regex, if one is configured and not blank.
    pub fn title_regex(&self) -> Option<&str> {
        non_blank(self.title_regex.as_deref())
    }

    fn is_empty(&self) -> bool {
        self == &MergeRequestFilter::default()
    }
}

/// A configured automation rule attached to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    pub id: TriggerId,
    pub connection_id: ConnectionId,
    pub project_key: String,
    /// Restricts the trigger to one repository of the project.
    ///
    /// `None` accepts events from every repository in the project.
    #[serde(default)]
    pub repository_name: Option<String>,
    pub trigger_type: TriggerType,
    /// Branch spec for `BranchPush` triggers.
    #[serde(default)]
    pub branch_spec: String,
    #[serde(default)]
    pub branch_spec_is_regex: bool,
    #[serde(default)]
    pub merge_request: MergeRequestFilter,
    /// Whether safe-merge commands may start builds of this job.
    ///
    /// Always implied for `SafeMergeOnly`.
    #[serde(default)]
    pub allow_safe_merge: bool,
    /// Remote webhooks currently believed to back this trigger.
    #[serde(default)]
    pub registered_webhook_ids: BTreeSet<WebhookId>,
}

/// A trigger configuration that cannot start a build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerConfigError {
    #[error("trigger parameter `{0}` is required")]
    MissingParameter(&'static str),

    #[error("trigger parameter `{parameter}` is not a valid regex: {message}")]
    InvalidRegex {
        parameter: &'static str,
        message: String,
    },

    #[error("conflicting trigger parameters: {0}")]
    Conflict(String),
}

impl TriggerDefinition {
    /// Repository restriction, if one is configured and not blank.
    pub fn repository(&self) -> Option<&str> {
        non_blank(self.repository_name.as_deref())
    }

    pub fn allows_safe_merge(&self) -> bool {
        self.trigger_type == TriggerType::SafeMergeOnly || self.allow_safe_merge
    }

    /// Returns true if an event from `project_key`/`repository` is in scope.
    pub fn covers(&self, project_key: &str, repository: &str) -> bool {
        self.project_key == project_key
            && self.repository().is_none_or(|repo| repo == repository)
    }

    /// Checks that the definition carries everything needed to start a build.
    ///
    /// # Errors
    ///
    /// Names the first missing or conflicting parameter.
    pub fn validate(&self) -> Result<(), TriggerConfigError> {
        if self.connection_id.as_str().trim().is_empty() {
            return Err(TriggerConfigError::MissingParameter("connection_id"));
        }
        if self.project_key.trim().is_empty() {
            return Err(TriggerConfigError::MissingParameter("project_key"));
        }
        if self.id.as_str().contains('|') {
            return Err(TriggerConfigError::Conflict(format!(
                "trigger id `{}` must not contain `|`",
                self.id
            )));
        }

        match self.trigger_type {
            TriggerType::BranchPush if self.branch_spec.trim().is_empty() => {
                return Err(TriggerConfigError::MissingParameter("branch_spec"));
            }
            TriggerType::BranchPush | TriggerType::SafeMergeOnly
                if !self.merge_request.is_empty() =>
            {
                return Err(TriggerConfigError::Conflict(format!(
                    "merge request filters are set on a {} trigger",
                    self.trigger_type.as_str()
                )));
            }
            _ => {}
        }

        if let Some(title_regex) = self.merge_request.title_regex() {
            cached_regex(title_regex).map_err(|e| TriggerConfigError::InvalidRegex {
                parameter: "title_regex",
                message: e.to_string(),
            })?;
        }

        Ok(())
    }
}

/// A connection to one SpaceCode organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    /// Base URL of the organization, e.g. `https://acme.spacecode.example`.
    pub base_url: String,
    /// Client id the organization authenticates as when calling us.
    pub client_id: ClientId,
}

/// The SpaceCode project a job is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectBinding {
    pub connection_id: ConnectionId,
    pub project_key: String,
}

/// A CI job as seen by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: JobName,
    #[serde(default)]
    pub project: Option<ProjectBinding>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub triggers: Vec<TriggerDefinition>,
}

impl Job {
    /// Returns true if any trigger lets safe-merge commands start builds.
    pub fn safe_merge_enabled(&self) -> bool {
        self.triggers.iter().any(TriggerDefinition::allows_safe_merge)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
