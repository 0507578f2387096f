//! Shared fixtures, in-memory collaborators and generators for tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use proptest::prelude::*;

use crate::config::{BridgeConfig, RetrySettings};
use crate::jobs::{JobDirectory, JobQueue, Submission};
use crate::space::{
    CheckStatusReport, RemoteSubscription, RemoteWebhook, SpaceApiError, SpaceEffect,
    SpaceInterpreter, SpaceResponse,
};
use crate::types::{
    BranchPair, Build, BuildCause, BuildNumber, BuildResult, ClientId, Connection, ConnectionId,
    EventKind, Job, JobName, MergeRequestFilter, MergeRequestInfo, MergeRequestSnapshot,
    Participant, ParticipantRole, ProjectBinding, QueueId, QueueItem, ReviewKind, ReviewerState,
    SafeMergeInfo, TriggerDefinition, TriggerId, TriggerType, WebhookId,
};

pub const SPACE_URL: &str = "https://acme.spacecode.example";
pub const CLIENT_ID: &str = "client-1";

// ─── Configuration ──────────────────────────────────────────────────────────

/// Config with millisecond retry delays so transient failures stay fast.
pub fn bridge_config() -> BridgeConfig {
    BridgeConfig {
        jenkins_url: "https://ci.example.com".into(),
        retry: RetrySettings {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 4,
            backoff_multiplier: 2.0,
        },
        ..BridgeConfig::default()
    }
}

// ─── Triggers, jobs, connections ────────────────────────────────────────────

fn trigger(id: &str, trigger_type: TriggerType) -> TriggerDefinition {
    TriggerDefinition {
        id: TriggerId::new(id),
        connection_id: ConnectionId::new("conn-1"),
        project_key: "PRJ".into(),
        repository_name: Some("backend".into()),
        trigger_type,
        branch_spec: "+:*".into(),
        branch_spec_is_regex: false,
        merge_request: MergeRequestFilter::default(),
        allow_safe_merge: false,
        registered_webhook_ids: BTreeSet::new(),
    }
}

pub fn branch_push_trigger(id: &str) -> TriggerDefinition {
    trigger(id, TriggerType::BranchPush)
}

pub fn merge_request_trigger(id: &str) -> TriggerDefinition {
    trigger(id, TriggerType::MergeRequest)
}

pub fn job_with(name: &str, triggers: Vec<TriggerDefinition>) -> Job {
    Job {
        name: JobName::new(name),
        project: Some(ProjectBinding {
            connection_id: ConnectionId::new("conn-1"),
            project_key: "PRJ".into(),
        }),
        disabled: false,
        triggers,
    }
}

fn default_connection() -> Connection {
    Connection {
        id: ConnectionId::new("conn-1"),
        base_url: SPACE_URL.into(),
        client_id: ClientId::new(CLIENT_ID),
    }
}

pub fn other_connection() -> Connection {
    Connection {
        id: ConnectionId::new("conn-2"),
        base_url: "https://other.spacecode.example".into(),
        client_id: ClientId::new("client-2"),
    }
}

// ─── Reviews and causes ─────────────────────────────────────────────────────

/// Merge request #17 from `feature/login` into `main` of `PRJ/backend`.
pub fn review_snapshot(title: &str) -> MergeRequestSnapshot {
    MergeRequestSnapshot {
        id: "review-17".into(),
        number: 17,
        project_key: "PRJ".into(),
        title: title.into(),
        kind: ReviewKind::MergeRequest,
        branch_pairs: vec![BranchPair {
            repository: "backend".into(),
            source_branch: "feature/login".into(),
            source_ref: "refs/heads/feature/login".into(),
            target_branch: "main".into(),
            target_ref: "refs/heads/main".into(),
        }],
        participants: Vec::new(),
    }
}

pub fn reviewer(state: Option<ReviewerState>) -> Participant {
    Participant {
        role: ParticipantRole::Reviewer,
        state,
    }
}

pub fn push_cause() -> BuildCause {
    BuildCause {
        connection_id: ConnectionId::new("conn-1"),
        space_url: SPACE_URL.into(),
        project_key: "PRJ".into(),
        repository_name: "backend".into(),
        trigger_type: TriggerType::BranchPush,
        event_kind: EventKind::BranchHeadsChanged,
        merge_request: None,
        safe_merge: None,
    }
}

pub fn safe_merge_cause() -> BuildCause {
    BuildCause {
        trigger_type: TriggerType::SafeMergeOnly,
        event_kind: EventKind::SafeMerge,
        merge_request: Some(MergeRequestInfo {
            id: "review-17".into(),
            number: 17,
            title: "Add login".into(),
            url: format!("{SPACE_URL}/p/PRJ/repositories/backend/reviews/17/timeline"),
            source_branch: "feature/login".into(),
            source_ref: "refs/heads/feature/login".into(),
            target_branch: "main".into(),
            target_ref: "refs/heads/main".into(),
        }),
        safe_merge: Some(SafeMergeInfo {
            branch: "safe-merge/17".into(),
            commit: "c0ffee".into(),
            is_dry_run: false,
            started_by_user_id: Some("user-3".into()),
        }),
        ..push_cause()
    }
}

// ─── Queue entries and builds ───────────────────────────────────────────────

fn started_at() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn sample_queue_item(id: u64) -> QueueItem {
    QueueItem {
        id: QueueId(id),
        job: JobName::new("backend"),
        url: format!("queue/item/{id}/"),
        causes: Vec::new(),
        cancelled: false,
        stuck: false,
        why: None,
        executable: None,
    }
}

/// An in-progress build of `backend` with no causes.
pub fn sample_build(number: u64, queue_id: u64) -> Build {
    Build {
        job: JobName::new("backend"),
        number: BuildNumber(number),
        queue_id: QueueId(queue_id),
        url: format!("job/backend/{number}/"),
        full_display_name: format!("backend #{number}"),
        in_progress: true,
        duration_ms: 0,
        result: None,
        started_at: started_at(),
        causes: Vec::new(),
        revision: None,
    }
}

pub fn arb_build_result() -> impl Strategy<Value = BuildResult> {
    prop_oneof![
        Just(BuildResult::Success),
        Just(BuildResult::Unstable),
        Just(BuildResult::Failure),
        Just(BuildResult::NotBuilt),
        Just(BuildResult::Aborted),
        Just(BuildResult::Unknown),
    ]
}

// ─── In-memory job directory ────────────────────────────────────────────────

/// Starts out with `conn-1` / `client-1` and no jobs.
pub struct InMemoryDirectory {
    jobs: Vec<Job>,
    connections: Vec<Connection>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        InMemoryDirectory {
            jobs: Vec::new(),
            connections: vec![default_connection()],
        }
    }

    pub fn with_job(mut self, job: Job) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn with_connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }
}

impl JobDirectory for InMemoryDirectory {
    fn find_job_by_name(&self, name: &JobName) -> Option<Job> {
        self.jobs.iter().find(|j| &j.name == name).cloned()
    }

    fn all_jobs(&self) -> Vec<Job> {
        self.jobs.clone()
    }

    fn connection_by_id(&self, id: &ConnectionId) -> Option<Connection> {
        self.connections.iter().find(|c| &c.id == id).cloned()
    }

    fn connection_by_client_id(&self, client_id: &ClientId) -> Option<Connection> {
        self.connections
            .iter()
            .find(|c| &c.client_id == client_id)
            .cloned()
    }
}

// ─── In-memory job queue ────────────────────────────────────────────────────

#[derive(Default)]
struct QueueState {
    items: BTreeMap<QueueId, QueueItem>,
    builds: BTreeMap<(JobName, BuildNumber), Build>,
    last_queue_id: u64,
    last_build: HashMap<JobName, u64>,
}

/// Coalesces a submission with a pending entry of the same job and cause.
#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    refusal: Option<String>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue that refuses every submission.
    pub fn refusing(reason: &str) -> Self {
        InMemoryQueue {
            refusal: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn items(&self) -> Vec<QueueItem> {
        self.state.lock().items.values().cloned().collect()
    }

    /// Moves a pending entry onto an executor.
    pub fn start(&self, id: QueueId) -> Option<BuildNumber> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let item = state.items.get_mut(&id)?;
        if item.cancelled || item.executable.is_some() {
            return None;
        }

        let last = state.last_build.entry(item.job.clone()).or_insert(0);
        *last += 1;
        let number = BuildNumber(*last);
        item.executable = Some(number);
        item.why = None;

        let job = item.job.clone();
        let build = Build {
            job: job.clone(),
            number,
            queue_id: id,
            url: format!("job/{job}/{}/", number.0),
            full_display_name: format!("{job} {number}"),
            in_progress: true,
            duration_ms: 0,
            result: None,
            started_at: started_at(),
            causes: item.causes.clone(),
            revision: None,
        };
        state.builds.insert((job, number), build);
        Some(number)
    }

    pub fn finish(&self, job: &JobName, number: BuildNumber, result: BuildResult) {
        if let Some(build) = self.state.lock().builds.get_mut(&(job.clone(), number)) {
            build.in_progress = false;
            build.result = Some(result);
            build.duration_ms = 1_000;
        }
    }
}

impl JobQueue for InMemoryQueue {
    fn submit(&self, job: &Job, cause: BuildCause) -> Submission {
        if let Some(reason) = &self.refusal {
            return Submission::Refused(reason.clone());
        }

        let mut state = self.state.lock();
        let pending = state.items.values().find(|i| {
            i.job == job.name && i.executable.is_none() && !i.cancelled && i.causes.contains(&cause)
        });
        if let Some(item) = pending {
            return Submission::AlreadyQueued(item.clone());
        }

        state.last_queue_id += 1;
        let id = QueueId(state.last_queue_id);
        let item = QueueItem {
            id,
            job: job.name.clone(),
            url: format!("queue/item/{}/", id.0),
            causes: vec![cause],
            cancelled: false,
            stuck: false,
            why: Some("Waiting for next available executor".into()),
            executable: None,
        };
        state.items.insert(id, item.clone());
        Submission::Scheduled(item)
    }

    fn queue_item(&self, id: QueueId) -> Option<QueueItem> {
        self.state.lock().items.get(&id).cloned()
    }

    fn cancel(&self, id: QueueId) -> bool {
        match self.state.lock().items.get_mut(&id) {
            Some(item) if item.executable.is_none() && !item.cancelled => {
                item.cancelled = true;
                item.why = None;
                true
            }
            _ => false,
        }
    }

    fn build(&self, job: &JobName, number: BuildNumber) -> Option<Build> {
        self.state.lock().builds.get(&(job.clone(), number)).cloned()
    }

    fn interrupt(&self, job: &JobName, number: BuildNumber) -> bool {
        match self.state.lock().builds.get_mut(&(job.clone(), number)) {
            Some(build) if build.in_progress => {
                build.in_progress = false;
                build.result = Some(BuildResult::Aborted);
                true
            }
            _ => false,
        }
    }
}

// ─── Fake SpaceCode ─────────────────────────────────────────────────────────

#[derive(Default)]
struct SpaceState {
    webhooks: BTreeMap<WebhookId, RemoteWebhook>,
    merge_requests: HashMap<String, MergeRequestSnapshot>,
    failures: HashMap<&'static str, SpaceApiError>,
    effects: Vec<SpaceEffect>,
    last_id: u64,
}

/// Records every effect and answers from in-memory state.
#[derive(Default)]
pub struct FakeSpace {
    state: Mutex<SpaceState>,
}

impl FakeSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_webhook(self, webhook: RemoteWebhook) -> Self {
        self.state.lock().webhooks.insert(webhook.id.clone(), webhook);
        self
    }

    pub fn with_merge_request(self, review: MergeRequestSnapshot) -> Self {
        self.state.lock().merge_requests.insert(review.id.clone(), review);
        self
    }

    /// Every effect with this name fails with `error`.
    pub fn failing(self, effect_name: &'static str, error: SpaceApiError) -> Self {
        self.state.lock().failures.insert(effect_name, error);
        self
    }

    pub fn effects(&self) -> Vec<SpaceEffect> {
        self.state.lock().effects.clone()
    }

    pub fn webhook(&self, id: &WebhookId) -> Option<RemoteWebhook> {
        self.state.lock().webhooks.get(id).cloned()
    }

    pub fn reports(&self) -> Vec<CheckStatusReport> {
        self.state
            .lock()
            .effects
            .iter()
            .filter_map(|e| match e {
                SpaceEffect::ReportExternalCheckStatus(report) => Some(report.clone()),
                _ => None,
            })
            .collect()
    }

    fn apply(&self, effect: SpaceEffect) -> Result<SpaceResponse, SpaceApiError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.effects.push(effect.clone());
        if let Some(error) = state.failures.get(effect.name()) {
            return Err(error.clone());
        }

        let missing = |what: &str| SpaceApiError::not_found(format!("{what} not found"));
        match effect {
            SpaceEffect::GetWebhook { webhook_id } => {
                Ok(SpaceResponse::Webhook(state.webhooks.get(&webhook_id).cloned()))
            }
            SpaceEffect::CreateWebhook { spec, .. } => {
                state.last_id += 1;
                let id = WebhookId::new(format!("wh-created-{}", state.last_id));
                let webhook = RemoteWebhook {
                    subscriptions: spec
                        .subscriptions
                        .into_iter()
                        .enumerate()
                        .map(|(n, subscription)| RemoteSubscription {
                            id: format!("{id}-sub-{n}"),
                            subscription,
                        })
                        .collect(),
                    id: id.clone(),
                    name: spec.name,
                    description: spec.description,
                    endpoint_url: spec.endpoint_url,
                };
                state.webhooks.insert(id, webhook.clone());
                Ok(SpaceResponse::WebhookCreated(webhook))
            }
            SpaceEffect::UpdateWebhook { webhook_id, spec } => {
                let webhook = state.webhooks.get_mut(&webhook_id).ok_or_else(|| missing("webhook"))?;
                webhook.name = spec.name;
                webhook.description = spec.description;
                webhook.endpoint_url = spec.endpoint_url;
                Ok(SpaceResponse::Done)
            }
            SpaceEffect::DeleteWebhook { webhook_id } => state
                .webhooks
                .remove(&webhook_id)
                .map(|_| SpaceResponse::Done)
                .ok_or_else(|| missing("webhook")),
            SpaceEffect::CreateSubscription {
                webhook_id,
                subscription,
            } => {
                state.last_id += 1;
                let id = format!("sub-{}", state.last_id);
                let webhook = state.webhooks.get_mut(&webhook_id).ok_or_else(|| missing("webhook"))?;
                webhook.subscriptions.push(RemoteSubscription {
                    id: id.clone(),
                    subscription,
                });
                Ok(SpaceResponse::SubscriptionCreated { id })
            }
            SpaceEffect::UpdateSubscription {
                webhook_id,
                subscription_id,
                subscription,
            } => {
                let webhook = state.webhooks.get_mut(&webhook_id).ok_or_else(|| missing("webhook"))?;
                let existing = webhook
                    .subscriptions
                    .iter_mut()
                    .find(|s| s.id == subscription_id)
                    .ok_or_else(|| missing("subscription"))?;
                existing.subscription = subscription;
                Ok(SpaceResponse::Done)
            }
            SpaceEffect::DeleteSubscription {
                webhook_id,
                subscription_id,
            } => {
                let webhook = state.webhooks.get_mut(&webhook_id).ok_or_else(|| missing("webhook"))?;
                webhook.subscriptions.retain(|s| s.id != subscription_id);
                Ok(SpaceResponse::Done)
            }
            SpaceEffect::GetMergeRequest {
                merge_request_id, ..
            } => state
                .merge_requests
                .get(&merge_request_id)
                .cloned()
                .map(SpaceResponse::MergeRequest)
                .ok_or_else(|| missing("merge request")),
            SpaceEffect::ReportExternalCheckStatus(_) => Ok(SpaceResponse::Done),
        }
    }
}

impl SpaceInterpreter for FakeSpace {
    fn interpret(
        &self,
        _connection: &Connection,
        effect: SpaceEffect,
    ) -> impl Future<Output = Result<SpaceResponse, SpaceApiError>> + Send {
        let result = self.apply(effect);
        async move { result }
    }
}
