//! Posts external check statuses for executions started by this crate.
//!
//! Each execution keeps a ledger of the `(connection, project, repository)`
//! targets it has already reported a final status to. An explicit post from a
//! build step lands in the ledger and suppresses the automatic end-of-build
//! post for the same target. Posting never fails the build: errors are logged
//! against the build and swallowed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::derive::derive_status;
use crate::config::BridgeConfig;
use crate::jobs::JobDirectory;
use crate::space::{self, CheckStatusReport, ExternalStatus, SpaceEffect, SpaceInterpreter};
use crate::types::{Build, BuildNumber, ConnectionId, JobName};

/// Where a status is posted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReportTarget {
    pub connection_id: ConnectionId,
    pub project_key: String,
    pub repository: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Posted(ExternalStatus),
    /// An earlier post for the same target suppressed this one.
    AlreadyReported,
    /// Nothing to report against: no SpaceCode cause or no known revision.
    Skipped,
    Failed,
}

type Ledger = HashMap<(JobName, BuildNumber), HashSet<ReportTarget>>;

pub struct StatusReporter<I, D> {
    interpreter: Arc<I>,
    directory: Arc<D>,
    config: Arc<BridgeConfig>,
    reported: Mutex<Ledger>,
}

impl<I: SpaceInterpreter, D: JobDirectory> StatusReporter<I, D> {
    pub fn new(interpreter: Arc<I>, directory: Arc<D>, config: Arc<BridgeConfig>) -> Self {
        StatusReporter {
            interpreter,
            directory,
            config,
            reported: Mutex::new(HashMap::new()),
        }
    }

    /// Posts `RUNNING` when an execution starts. Never suppressed and never
    /// recorded.
    pub async fn report_started(&self, build: &Build) -> ReportOutcome {
        let Some(target) = default_target(build) else {
            return ReportOutcome::Skipped;
        };
        self.post(build, &target, ExternalStatus::Running).await
    }

    /// Automatic end-of-build report.
    ///
    /// Skipped for a target an explicit post already covered.
    pub async fn report(&self, build: &Build, override_status: Option<ExternalStatus>) -> ReportOutcome {
        let Some(target) = default_target(build) else {
            debug!(job = %build.job, build = %build.number, "No SpaceCode cause; skipping status report");
            return ReportOutcome::Skipped;
        };
        if self.already_reported(build, &target) {
            debug!(job = %build.job, build = %build.number, repository = %target.repository, "Status already reported");
            return ReportOutcome::AlreadyReported;
        }

        let status = override_status.unwrap_or_else(|| derive_status(build));
        let outcome = self.post(build, &target, status).await;
        if matches!(outcome, ReportOutcome::Posted(_)) {
            self.record(build, target);
        }
        outcome
    }

    /// Explicit post from a build step.
    ///
    /// `target` defaults to the build's own SpaceCode cause. The target is
    /// recorded even if the post fails, so the automatic report does not
    /// overwrite what the step intended.
    pub async fn post_status(
        &self,
        build: &Build,
        target: Option<ReportTarget>,
        status: ExternalStatus,
    ) -> ReportOutcome {
        let Some(target) = target.or_else(|| default_target(build)) else {
            warn!(job = %build.job, build = %build.number, "Status step has no SpaceCode target");
            return ReportOutcome::Skipped;
        };
        let outcome = self.post(build, &target, status).await;
        self.record(build, target);
        outcome
    }

    /// Drops the ledger of a build that will not be reported again.
    pub fn forget(&self, job: &JobName, number: BuildNumber) {
        self.reported.lock().remove(&(job.clone(), number));
    }

    fn already_reported(&self, build: &Build, target: &ReportTarget) -> bool {
        self.reported
            .lock()
            .get(&(build.job.clone(), build.number))
            .is_some_and(|targets| targets.contains(target))
    }

    fn record(&self, build: &Build, target: ReportTarget) {
        self.reported
            .lock()
            .entry((build.job.clone(), build.number))
            .or_default()
            .insert(target);
    }

    async fn post(&self, build: &Build, target: &ReportTarget, status: ExternalStatus) -> ReportOutcome {
        let Some((revision, branch)) = revision_of(build) else {
            warn!(job = %build.job, build = %build.number, "Build has no known revision; cannot report status");
            return ReportOutcome::Skipped;
        };
        let Some(connection) = self.directory.connection_by_id(&target.connection_id) else {
            warn!(job = %build.job, build = %build.number, connection_id = %target.connection_id, "Unknown connection; cannot report status");
            return ReportOutcome::Failed;
        };

        let report = CheckStatusReport {
            project_key: target.project_key.clone(),
            repository: target.repository.clone(),
            revision,
            branch,
            status,
            url: self.config.absolute_url(&build.url),
            service_name: self.config.service_name.clone(),
            task_name: build.job.to_string(),
            task_id: build.job.to_string(),
            task_build_id: build.number.0.to_string(),
            timestamp: build.started_at,
            description: format!("{} {}", build.full_display_name, status_text(status)),
        };

        let effect = SpaceEffect::ReportExternalCheckStatus(report);
        match space::execute(self.interpreter.as_ref(), &connection, self.config.retry_config(), effect).await {
            Ok(_) => {
                info!(job = %build.job, build = %build.number, status = status.as_str(), repository = %target.repository, "Reported status");
                ReportOutcome::Posted(status)
            }
            Err(e) => {
                warn!(job = %build.job, build = %build.number, error = %e, "Failed to report status");
                ReportOutcome::Failed
            }
        }
    }
}

fn default_target(build: &Build) -> Option<ReportTarget> {
    build.primary_cause().map(|cause| ReportTarget {
        connection_id: cause.connection_id.clone(),
        project_key: cause.project_key.clone(),
        repository: cause.repository_name.clone(),
    })
}

/// Revision and branch the status applies to.
///
/// The checked-out revision wins; a safe merge that has not checked out yet
/// reports against its speculative merge commit.
fn revision_of(build: &Build) -> Option<(String, String)> {
    if let Some(revision) = &build.revision {
        return Some((revision.commit.clone(), revision.branch.clone()));
    }
    build
        .safe_merge_cause()
        .and_then(|cause| cause.safe_merge.as_ref())
        .map(|sm| (sm.commit.clone(), sm.branch.clone()))
}

fn status_text(status: ExternalStatus) -> &'static str {
    match status {
        ExternalStatus::Running => "is running",
        ExternalStatus::Succeeded => "succeeded",
        ExternalStatus::Terminated => "was aborted",
        ExternalStatus::Failed => "failed",
    }
}
