//! Safe-merge commands: start, stop and poll builds on behalf of SpaceCode.
//!
//! # Identifier resolution
//!
//! Stop and fetch-status name a build by `BuildRef`. The number alone is never
//! trusted: the entry must belong to the commanded job, carry a safe-merge
//! cause, and have been started through a connection whose client id is the
//! caller's. A queue entry that has already started running resolves to the
//! running build, so a stale queued state is never reported.
//!
//! | Failure | Status |
//! |---------|--------|
//! | malformed id or request | 400 |
//! | caller not allowed to start builds of the job | 401 |
//! | unknown job/entry, or an entry the caller does not own | 404 |
//! | dispatcher refused the build | 409 |
//! | SpaceCode call failed | 502 |

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::build_ref::{BuildRef, BuildRefError};
use super::representation::BuildRepresentation;
use crate::config::BridgeConfig;
use crate::jobs::{BuildDispatcher, DispatchError, DispatchResult, JobDirectory, JobQueue};
use crate::space::{self, SpaceApiError, SpaceEffect, SpaceInterpreter};
use crate::types::{
    Build, BuildCause, ClientId, Connection, EventKind, Job, JobName, QueueItem, SafeMergeInfo,
    TriggerType,
};
use crate::webhooks::merge_request_info;

#[derive(Debug, Error)]
pub enum SafeMergeError {
    #[error(transparent)]
    MalformedId(#[from] BuildRefError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Refused(#[from] DispatchError),

    #[error(transparent)]
    Remote(#[from] SpaceApiError),
}

impl SafeMergeError {
    pub fn status_code(&self) -> u16 {
        match self {
            SafeMergeError::MalformedId(_) | SafeMergeError::InvalidRequest(_) => 400,
            SafeMergeError::Unauthorized(_) => 401,
            SafeMergeError::NotFound(_) => 404,
            SafeMergeError::Refused(_) => 409,
            SafeMergeError::Remote(_) => 502,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCommand {
    pub client_id: ClientId,
    /// Full name of the job to build.
    pub project: JobName,
    /// SpaceCode project the merge request lives in.
    pub space_project_id: String,
    pub merge_request_id: String,
    /// Branch holding the speculative merge.
    pub branch: String,
    pub commit: String,
    pub is_dry_run: bool,
    #[serde(default)]
    pub started_by_user_id: Option<String>,
}

/// Shared shape of stop and fetch-status commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildCommand {
    pub client_id: ClientId,
    pub project: JobName,
    /// Kept as text so a malformed id becomes a 400, not a decode failure.
    pub build_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SafeMergeCommand {
    Start(StartCommand),
    Stop(BuildCommand),
    FetchStatus(BuildCommand),
}

/// Latest known state of a safe-merge build.
enum Resolved {
    Queued(QueueItem),
    Running(Build),
}

pub struct SafeMergeController<I, D, Q> {
    interpreter: Arc<I>,
    directory: Arc<D>,
    dispatcher: Arc<BuildDispatcher<Q>>,
    config: Arc<BridgeConfig>,
}

impl<I, D, Q> SafeMergeController<I, D, Q>
where
    I: SpaceInterpreter,
    D: JobDirectory,
    Q: JobQueue,
{
    pub fn new(
        interpreter: Arc<I>,
        directory: Arc<D>,
        dispatcher: Arc<BuildDispatcher<Q>>,
        config: Arc<BridgeConfig>,
    ) -> Self {
        SafeMergeController {
            interpreter,
            directory,
            dispatcher,
            config,
        }
    }

    pub async fn handle(&self, command: SafeMergeCommand) -> Result<BuildRepresentation, SafeMergeError> {
        match command {
            SafeMergeCommand::Start(cmd) => self.start(cmd).await,
            SafeMergeCommand::Stop(cmd) => self.stop(&cmd),
            SafeMergeCommand::FetchStatus(cmd) => self.fetch_status(&cmd),
        }
    }

    /// Schedules a safe-merge build. Returns without waiting for it to start.
    pub async fn start(&self, cmd: StartCommand) -> Result<BuildRepresentation, SafeMergeError> {
        let job = self.find_job(&cmd.project)?;
        let connection = self.job_connection(&job)?;
        if connection.client_id != cmd.client_id {
            warn!(job = %job.name, client_id = %cmd.client_id, "Safe merge requested by a foreign client");
            return Err(SafeMergeError::Unauthorized(format!(
                "client {} may not start builds of {}",
                cmd.client_id, job.name
            )));
        }
        let Some(trigger) = job.triggers.iter().find(|t| t.allows_safe_merge()) else {
            return Err(SafeMergeError::Unauthorized(format!(
                "safe merge is not enabled for {}",
                job.name
            )));
        };

        let effect = SpaceEffect::GetMergeRequest {
            project_key: cmd.space_project_id.clone(),
            merge_request_id: cmd.merge_request_id.clone(),
        };
        let review = match space::execute(
            self.interpreter.as_ref(),
            &connection,
            self.config.retry_config(),
            effect,
        )
        .await
        .and_then(|r| r.into_merge_request())
        {
            Ok(review) => review,
            Err(e) if e.is_not_found() => {
                return Err(SafeMergeError::NotFound(format!(
                    "merge request {} does not exist",
                    cmd.merge_request_id
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let Some(pair) = review.primary_branch_pair() else {
            return Err(SafeMergeError::InvalidRequest(format!(
                "merge request {} has no branches",
                cmd.merge_request_id
            )));
        };

        let cause = BuildCause {
            connection_id: connection.id.clone(),
            space_url: connection.base_url.clone(),
            project_key: review.project_key.clone(),
            repository_name: pair.repository.clone(),
            // Whichever trigger allowed it, the build is a safe merge.
            trigger_type: TriggerType::SafeMergeOnly,
            event_kind: EventKind::SafeMerge,
            merge_request: Some(merge_request_info(&review, pair, &connection.base_url)),
            safe_merge: Some(SafeMergeInfo {
                branch: cmd.branch,
                commit: cmd.commit,
                is_dry_run: cmd.is_dry_run,
                started_by_user_id: cmd.started_by_user_id,
            }),
        };

        let item = match self.dispatcher.dispatch(&job, trigger, cause) {
            DispatchResult::Scheduled(item) | DispatchResult::AlreadyQueued(item) => item,
            DispatchResult::Refused(e) => return Err(e.into()),
        };
        info!(job = %job.name, queue_id = %item.id, merge_request = %cmd.merge_request_id, "Started safe merge");
        Ok(self.represent(self.advance(item)))
    }

    /// Cancels or interrupts a safe-merge build, then reports its state.
    ///
    /// Cancellation is best effort: an entry that already started or a build
    /// that already finished is reported as it is.
    pub fn stop(&self, cmd: &BuildCommand) -> Result<BuildRepresentation, SafeMergeError> {
        let queue = self.dispatcher.queue();
        let latest = match self.resolve(cmd)? {
            Resolved::Queued(item) => {
                if queue.cancel(item.id) {
                    info!(job = %item.job, queue_id = %item.id, "Cancelled safe merge queue item");
                } else {
                    info!(job = %item.job, queue_id = %item.id, "Queue item could not be cancelled; it may have started");
                }
                let refreshed = queue.queue_item(item.id).unwrap_or(item);
                self.advance(refreshed)
            }
            Resolved::Running(build) => {
                if queue.interrupt(&build.job, build.number) {
                    info!(job = %build.job, build = %build.number, "Interrupted safe merge build");
                } else {
                    info!(job = %build.job, build = %build.number, "Build could not be interrupted; it may have finished");
                }
                let refreshed = queue.build(&build.job, build.number).unwrap_or(build);
                Resolved::Running(refreshed)
            }
        };
        Ok(self.represent(latest))
    }

    pub fn fetch_status(&self, cmd: &BuildCommand) -> Result<BuildRepresentation, SafeMergeError> {
        self.resolve(cmd).map(|resolved| self.represent(resolved))
    }

    fn resolve(&self, cmd: &BuildCommand) -> Result<Resolved, SafeMergeError> {
        let build_ref: BuildRef = cmd.build_id.parse()?;
        let job = self.find_job(&cmd.project)?;
        let queue = self.dispatcher.queue();
        let not_found = || SafeMergeError::NotFound(format!("no safe merge build {build_ref} in {}", job.name));

        match build_ref {
            BuildRef::Queued(id) => {
                let item = queue.queue_item(id).ok_or_else(not_found)?;
                let owned = item.job == job.name
                    && item
                        .safe_merge_cause()
                        .is_some_and(|cause| self.started_by(cause, &cmd.client_id));
                if !owned {
                    warn!(job = %job.name, queue_id = %id, client_id = %cmd.client_id, "Queue item not owned by caller");
                    return Err(not_found());
                }
                Ok(self.advance(item))
            }
            BuildRef::Build(number) => {
                let build = queue.build(&job.name, number).ok_or_else(not_found)?;
                let owned = build
                    .safe_merge_cause()
                    .is_some_and(|cause| self.started_by(cause, &cmd.client_id));
                if !owned {
                    warn!(job = %job.name, build = %number, client_id = %cmd.client_id, "Build not owned by caller");
                    return Err(not_found());
                }
                Ok(Resolved::Running(build))
            }
        }
    }

    /// Prefers the running build over its queue entry once it has started.
    fn advance(&self, item: QueueItem) -> Resolved {
        let started = item
            .executable
            .and_then(|number| self.dispatcher.queue().build(&item.job, number));
        match started {
            Some(build) => Resolved::Running(build),
            None => Resolved::Queued(item),
        }
    }

    fn started_by(&self, cause: &BuildCause, client_id: &ClientId) -> bool {
        self.directory
            .connection_by_id(&cause.connection_id)
            .is_some_and(|connection| &connection.client_id == client_id)
    }

    fn find_job(&self, name: &JobName) -> Result<Job, SafeMergeError> {
        self.directory
            .find_job_by_name(name)
            .ok_or_else(|| SafeMergeError::NotFound(format!("job {name} does not exist")))
    }

    fn job_connection(&self, job: &Job) -> Result<Connection, SafeMergeError> {
        let binding = job.project.as_ref().ok_or_else(|| {
            SafeMergeError::Unauthorized(format!("job {} is not bound to a SpaceCode project", job.name))
        })?;
        self.directory
            .connection_by_id(&binding.connection_id)
            .ok_or_else(|| {
                SafeMergeError::Unauthorized(format!(
                    "connection {} of job {} is not configured",
                    binding.connection_id, job.name
                ))
            })
    }

    fn represent(&self, resolved: Resolved) -> BuildRepresentation {
        match resolved {
            Resolved::Queued(item) => BuildRepresentation::queued(&item, &self.config),
            Resolved::Running(build) => BuildRepresentation::running(&build, &self.config),
        }
    }
}
