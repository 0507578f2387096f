//! Build dispatcher: turns a build cause into a queue submission.
//!
//! Submissions are idempotent at the queue: an identical pending entry absorbs
//! a repeated submission, and callers treat `Scheduled` and `AlreadyQueued`
//! the same way. Build numbers are assigned later by the queue, when the entry
//! starts running.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::{JobQueue, Submission};
use crate::types::{
    BuildCause, Job, JobName, QueueItem, TriggerConfigError, TriggerDefinition, TriggerId,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("job {0} is disabled")]
    JobDisabled(JobName),

    #[error("trigger {trigger} of job {job} is misconfigured: {source}")]
    InvalidTrigger {
        job: JobName,
        trigger: TriggerId,
        #[source]
        source: TriggerConfigError,
    },

    #[error("queue refused job {job}: {reason}")]
    QueueRefused { job: JobName, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Scheduled(QueueItem),
    AlreadyQueued(QueueItem),
    /// Hard failure. Never retried by the dispatcher.
    Refused(DispatchError),
}

impl DispatchResult {
    /// The queue entry, for either success variant.
    pub fn queue_item(&self) -> Option<&QueueItem> {
        match self {
            DispatchResult::Scheduled(item) | DispatchResult::AlreadyQueued(item) => Some(item),
            DispatchResult::Refused(_) => None,
        }
    }
}

pub struct BuildDispatcher<Q> {
    queue: Arc<Q>,
}

impl<Q: JobQueue> BuildDispatcher<Q> {
    pub fn new(queue: Arc<Q>) -> Self {
        BuildDispatcher { queue }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Submits a build of `job` on behalf of `trigger`.
    pub fn dispatch(
        &self,
        job: &Job,
        trigger: &TriggerDefinition,
        cause: BuildCause,
    ) -> DispatchResult {
        if job.disabled {
            warn!(job = %job.name, "Refusing to schedule build of disabled job");
            return DispatchResult::Refused(DispatchError::JobDisabled(job.name.clone()));
        }

        if let Err(source) = trigger.validate() {
            warn!(job = %job.name, trigger_id = %trigger.id, error = %source, "Refusing to schedule build");
            return DispatchResult::Refused(DispatchError::InvalidTrigger {
                job: job.name.clone(),
                trigger: trigger.id.clone(),
                source,
            });
        }

        let description = cause.short_description();
        match self.queue.submit(job, cause) {
            Submission::Scheduled(item) => {
                info!(job = %job.name, queue_id = %item.id, cause = %description, "Scheduled build");
                DispatchResult::Scheduled(item)
            }
            Submission::AlreadyQueued(item) => {
                info!(job = %job.name, queue_id = %item.id, "Build already queued");
                DispatchResult::AlreadyQueued(item)
            }
            Submission::Refused(reason) => {
                warn!(job = %job.name, %reason, "Queue refused build");
                DispatchResult::Refused(DispatchError::QueueRefused {
                    job: job.name.clone(),
                    reason,
                })
            }
        }
    }
}
