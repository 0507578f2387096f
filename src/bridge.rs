//! The assembled bridge: one value the host talks to.
//!
//! The host owns the transport and the build lifecycle. It forwards inbound
//! webhook deliveries and safe-merge commands here, and notifies the bridge
//! when builds start and finish and when job configuration changes.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::info;

use crate::config::BridgeConfig;
use crate::jobs::{BuildDispatcher, JobDirectory, JobQueue};
use crate::safe_merge::{BuildRepresentation, SafeMergeCommand, SafeMergeController, SafeMergeError};
use crate::space::{ExternalStatus, SpaceInterpreter};
use crate::status::{ReportOutcome, ReportTarget, StatusReporter};
use crate::types::{Build, JobName};
use crate::webhooks::{TriggerRegistry, WebhookDelivery, WebhookHandler, WebhookResponse, WebhookSynchronizer};

pub struct Bridge<I, D, Q> {
    directory: Arc<D>,
    registry: Arc<TriggerRegistry>,
    synchronizer: Arc<WebhookSynchronizer<I, D>>,
    webhooks: WebhookHandler<I, D, Q>,
    safe_merge: SafeMergeController<I, D, Q>,
    reporter: StatusReporter<I, D>,
}

impl<I, D, Q> Bridge<I, D, Q>
where
    I: SpaceInterpreter,
    D: JobDirectory,
    Q: JobQueue,
{
    /// Wires every component around shared collaborators. The trigger
    /// registry starts out loaded from `directory`.
    pub fn new(interpreter: Arc<I>, directory: Arc<D>, queue: Arc<Q>, config: BridgeConfig) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(TriggerRegistry::load(directory.as_ref()));
        let synchronizer = Arc::new(WebhookSynchronizer::new(
            Arc::clone(&interpreter),
            Arc::clone(&directory),
            Arc::clone(&registry),
            Arc::clone(&config),
        ));
        let dispatcher = Arc::new(BuildDispatcher::new(queue));

        Bridge {
            webhooks: WebhookHandler::new(Arc::clone(&synchronizer), Arc::clone(&dispatcher)),
            safe_merge: SafeMergeController::new(
                Arc::clone(&interpreter),
                Arc::clone(&directory),
                dispatcher,
                Arc::clone(&config),
            ),
            reporter: StatusReporter::new(interpreter, Arc::clone(&directory), config),
            directory,
            registry,
            synchronizer,
        }
    }

    pub fn registry(&self) -> &TriggerRegistry {
        &self.registry
    }

    pub async fn handle_webhook(&self, delivery: WebhookDelivery) -> WebhookResponse {
        self.webhooks.handle(delivery).await
    }

    pub async fn handle_safe_merge(
        &self,
        command: SafeMergeCommand,
    ) -> Result<BuildRepresentation, SafeMergeError> {
        self.safe_merge.handle(command).await
    }

    pub async fn on_build_started(&self, build: &Build) -> ReportOutcome {
        self.reporter.report_started(build).await
    }

    /// Posts the final status, then re-syncs the job's webhooks and drops
    /// the build's report ledger.
    pub async fn on_build_completed(&self, build: &Build) -> ReportOutcome {
        let outcome = self.reporter.report(build, None).await;
        self.synchronizer.sync_job(&build.job).await;
        self.reporter.forget(&build.job, build.number);
        outcome
    }

    /// Explicit status post from a running build step.
    pub async fn post_status(
        &self,
        build: &Build,
        target: Option<ReportTarget>,
        status: ExternalStatus,
    ) -> ReportOutcome {
        self.reporter.post_status(build, target, status).await
    }

    /// Re-reads triggers after one job's configuration was saved and brings
    /// its webhooks in line.
    pub async fn on_job_updated(&self, job: &JobName) {
        self.registry.reload(self.directory.as_ref());
        self.synchronizer.sync_job(job).await;
    }

    /// Re-reads every trigger and syncs the webhooks of every job.
    pub async fn reload_triggers(&self) {
        self.registry.reload(self.directory.as_ref());
        let jobs: BTreeSet<JobName> = self.registry.snapshot().iter().map(|t| t.job.clone()).collect();
        info!(jobs = jobs.len(), "Reloaded triggers");
        for job in &jobs {
            self.synchronizer.sync_job(job).await;
        }
    }
}
