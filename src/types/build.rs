//! Snapshots of queue entries and executions owned by the job queue.
//!
//! The queue hands these out by value; they reflect the state at the moment of
//! lookup and are never mutated by this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cause::BuildCause;
use super::ids::{BuildNumber, JobName, QueueId};

/// Terminal result of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildResult {
    Success,
    Unstable,
    Failure,
    NotBuilt,
    Aborted,
    /// A result kind this crate does not know about.
    #[serde(other)]
    Unknown,
}

impl BuildResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildResult::Success => "SUCCESS",
            BuildResult::Unstable => "UNSTABLE",
            BuildResult::Failure => "FAILURE",
            BuildResult::NotBuilt => "NOT_BUILT",
            BuildResult::Aborted => "ABORTED",
            BuildResult::Unknown => "UNKNOWN",
        }
    }
}

/// Revision an execution checked out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRevision {
    pub branch: String,
    pub commit: String,
}

/// A scheduled but possibly not yet started unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueId,
    pub job: JobName,
    pub url: String,
    pub causes: Vec<BuildCause>,
    pub cancelled: bool,
    pub stuck: bool,
    /// Why the item is still waiting, if it is.
    pub why: Option<String>,
    /// Set once the item has left the queue and started running.
    pub executable: Option<BuildNumber>,
}

impl QueueItem {
    pub fn safe_merge_cause(&self) -> Option<&BuildCause> {
        self.causes.iter().find(|c| c.is_safe_merge())
    }
}

/// A running or finished execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub job: JobName,
    pub number: BuildNumber,
    pub queue_id: QueueId,
    pub url: String,
    pub full_display_name: String,
    pub in_progress: bool,
    pub duration_ms: u64,
    pub result: Option<BuildResult>,
    pub started_at: DateTime<Utc>,
    pub causes: Vec<BuildCause>,
    pub revision: Option<GitRevision>,
}

impl Build {
    pub fn safe_merge_cause(&self) -> Option<&BuildCause> {
        self.causes.iter().find(|c| c.is_safe_merge())
    }

    /// The cause status reports are derived from: a safe-merge cause wins
    /// over a webhook cause.
    pub fn primary_cause(&self) -> Option<&BuildCause> {
        self.safe_merge_cause().or_else(|| self.causes.first())
    }
}
