//! Host-side collaborators: the job directory and the job queue.
//!
//! Both are injected. Nothing in this crate looks up jobs, connections or
//! queue entries through global state.

mod dispatch;

pub use dispatch::{BuildDispatcher, DispatchError, DispatchResult};

use crate::types::{
    Build, BuildCause, BuildNumber, ClientId, Connection, ConnectionId, Job, JobName, QueueId,
    QueueItem, TriggerDefinition,
};

/// Read access to configured jobs and connections.
pub trait JobDirectory: Send + Sync {
    fn find_job_by_name(&self, name: &JobName) -> Option<Job>;

    fn all_jobs(&self) -> Vec<Job>;

    /// Every trigger of every job, paired with the job's name.
    fn all_triggers(&self) -> Vec<(JobName, TriggerDefinition)> {
        self.all_jobs()
            .into_iter()
            .flat_map(|job| {
                let name = job.name;
                job.triggers
                    .into_iter()
                    .map(move |trigger| (name.clone(), trigger))
            })
            .collect()
    }

    fn connection_by_id(&self, id: &ConnectionId) -> Option<Connection>;

    fn connection_by_client_id(&self, client_id: &ClientId) -> Option<Connection>;
}

/// What the queue did with a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A new queue entry was created.
    Scheduled(QueueItem),
    /// An identical pending entry already existed and absorbed the submission.
    AlreadyQueued(QueueItem),
    /// The queue would not accept the job.
    Refused(String),
}

/// The host's build queue and executor.
///
/// Queue ids and build numbers come from independent sequences.
pub trait JobQueue: Send + Sync {
    fn submit(&self, job: &Job, cause: BuildCause) -> Submission;

    fn queue_item(&self, id: QueueId) -> Option<QueueItem>;

    /// Cancels a pending entry. Returns false if it already left the queue.
    fn cancel(&self, id: QueueId) -> bool;

    fn build(&self, job: &JobName, number: BuildNumber) -> Option<Build>;

    /// Interrupts a running execution. Returns false if it already finished.
    fn interrupt(&self, job: &JobName, number: BuildNumber) -> bool;
}
