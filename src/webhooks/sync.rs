//! Re-synchronization of a trigger's remote webhook.
//!
//! Local trigger definitions and remote webhooks are only eventually
//! consistent. Sync runs after a build completes and whenever routing finds
//! the registry stale. It:
//!
//! 1. fetches every webhook the trigger believes it owns;
//! 2. keeps the first one that still exists, bringing its metadata and
//!    subscriptions up to date (subscriptions are diffed by name);
//! 3. creates a webhook if none survived;
//! 4. deletes surplus duplicates;
//! 5. publishes the surviving ids into the registry.
//!
//! Individual remote failures are logged and skipped. Sync fails only when no
//! webhook could be established at all.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::jobs::JobDirectory;
use crate::space::{
    self, RemoteWebhook, SpaceApiError, SpaceEffect, SpaceInterpreter, Subscription, WebhookSpec,
};
use crate::types::{Connection, ConnectionId, JobName, TriggerDefinition, TriggerId, TriggerType, WebhookId};

use super::naming::webhook_name;
use super::registry::TriggerRegistry;

/// Payload fields requested from SpaceCode for every delivery.
pub const PAYLOAD_FIELDS: &[&str] = &["clientId", "webhookId", "payload"];

const BRANCH_PUSH_EVENT: &str = "Repository.Heads";
const REVIEW_CREATED: &str = "CodeReview.Created";
const REVIEW_COMMITS_UPDATED: &str = "CodeReview.CommitsUpdated";
const REVIEW_TITLE_UPDATED: &str = "CodeReview.TitleUpdated";
const REVIEWER_STATE_UPDATED: &str = "CodeReview.Participant.ReviewerStateUpdated";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("connection {0} is not configured")]
    UnknownConnection(ConnectionId),

    #[error("no webhook could be established for trigger {trigger}: {source}")]
    NoWebhook {
        trigger: TriggerId,
        #[source]
        source: SpaceApiError,
    },
}

/// The webhook `trigger` should have, or `None` if it needs none.
pub fn desired_webhook(job: &JobName, trigger: &TriggerDefinition, config: &BridgeConfig) -> Option<WebhookSpec> {
    let subscription = desired_subscription(trigger)?;
    Some(WebhookSpec {
        name: webhook_name(trigger),
        description: format!("Triggers {} build of job {}", trigger.trigger_type.as_str(), job),
        endpoint_url: config.webhook_endpoint(),
        payload_fields: PAYLOAD_FIELDS.iter().map(|f| f.to_string()).collect(),
        subscriptions: vec![subscription],
    })
}

fn desired_subscription(trigger: &TriggerDefinition) -> Option<Subscription> {
    let (name, events) = match trigger.trigger_type {
        TriggerType::SafeMergeOnly => return None,
        TriggerType::BranchPush => ("Branch pushes", vec![BRANCH_PUSH_EVENT]),
        TriggerType::MergeRequest => {
            let filter = &trigger.merge_request;
            let mut events = Vec::new();
            // A review that was just created has no reviewer verdicts yet.
            if !filter.require_all_approvals {
                events.push(REVIEW_CREATED);
            }
            events.push(REVIEW_COMMITS_UPDATED);
            if filter.title_regex().is_some() {
                events.push(REVIEW_TITLE_UPDATED);
            }
            if filter.require_all_approvals {
                events.push(REVIEWER_STATE_UPDATED);
            }
            ("Merge requests", events)
        }
    };

    Some(Subscription {
        name: name.to_string(),
        project_key: trigger.project_key.clone(),
        repository: trigger.repository().map(str::to_string),
        events: events.into_iter().map(str::to_string).collect(),
        branch_spec: subscription_branch_filter(trigger),
    })
}

/// Branch filter lines SpaceCode can apply before delivering a push.
///
/// SpaceCode only understands wildcard specs, so regex specs subscribe to
/// every branch and are filtered on arrival.
fn subscription_branch_filter(trigger: &TriggerDefinition) -> Vec<String> {
    if trigger.trigger_type != TriggerType::BranchPush || trigger.branch_spec_is_regex {
        return Vec::new();
    }
    trigger
        .branch_spec
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub struct WebhookSynchronizer<I, D> {
    interpreter: Arc<I>,
    directory: Arc<D>,
    registry: Arc<TriggerRegistry>,
    config: Arc<BridgeConfig>,
}

impl<I: SpaceInterpreter, D: JobDirectory> WebhookSynchronizer<I, D> {
    pub fn new(
        interpreter: Arc<I>,
        directory: Arc<D>,
        registry: Arc<TriggerRegistry>,
        config: Arc<BridgeConfig>,
    ) -> Self {
        WebhookSynchronizer {
            interpreter,
            directory,
            registry,
            config,
        }
    }

    pub fn interpreter(&self) -> &I {
        &self.interpreter
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn registry(&self) -> &TriggerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Syncs every trigger of `job` that is currently registered.
    ///
    /// Failures are logged per trigger.
    pub async fn sync_job(&self, job: &JobName) {
        let triggers: Vec<TriggerDefinition> = self
            .registry
            .snapshot()
            .iter()
            .filter(|t| &t.job == job)
            .map(|t| t.trigger.clone())
            .collect();

        for trigger in &triggers {
            if let Err(e) = self.sync(job, trigger).await {
                warn!(%job, trigger_id = %trigger.id, error = %e, "Webhook sync failed");
            }
        }
    }

    /// Brings the remote webhook of `trigger` in line with its definition.
    ///
    /// Returns the ids now backing the trigger, which are also published to
    /// the registry.
    pub async fn sync(
        &self,
        job: &JobName,
        trigger: &TriggerDefinition,
    ) -> Result<BTreeSet<WebhookId>, SyncError> {
        let connection = self
            .directory
            .connection_by_id(&trigger.connection_id)
            .ok_or_else(|| SyncError::UnknownConnection(trigger.connection_id.clone()))?;

        let (existing, mut unreachable) = self.fetch_existing(&connection, trigger).await;
        let mut ids = BTreeSet::new();

        match desired_webhook(job, trigger, &self.config) {
            None => {
                for webhook in existing {
                    if !self.delete_webhook(&connection, &webhook.id).await {
                        ids.insert(webhook.id);
                    }
                }
            }
            Some(spec) => {
                let mut existing = existing.into_iter();
                match existing.next() {
                    Some(primary) => {
                        self.reconcile(&connection, &primary, &spec).await;
                        ids.insert(primary.id);
                    }
                    None => match self.create_webhook(&connection, trigger, spec).await {
                        Ok(created) => {
                            ids.insert(created);
                        }
                        // A webhook we could not even look at may still be
                        // delivering; keep pointing at it.
                        Err(source) if !unreachable.is_empty() => {
                            warn!(trigger_id = %trigger.id, error = %source, "Webhook creation failed; keeping unreachable webhooks");
                        }
                        Err(source) => {
                            return Err(SyncError::NoWebhook {
                                trigger: trigger.id.clone(),
                                source,
                            });
                        }
                    },
                }

                for surplus in existing {
                    if !self.delete_webhook(&connection, &surplus.id).await {
                        ids.insert(surplus.id);
                    }
                }
            }
        }

        ids.append(&mut unreachable);
        if !self.registry.set_webhook_ids(&trigger.id, ids.clone()) {
            debug!(trigger_id = %trigger.id, "Trigger no longer registered; webhook ids not published");
        }
        info!(trigger_id = %trigger.id, %job, webhooks = ids.len(), "Synchronized webhook");
        Ok(ids)
    }

    /// Splits the registered ids into webhooks that exist and ids whose state
    /// could not be determined.
    async fn fetch_existing(
        &self,
        connection: &Connection,
        trigger: &TriggerDefinition,
    ) -> (Vec<RemoteWebhook>, BTreeSet<WebhookId>) {
        let mut existing = Vec::new();
        let mut unreachable = BTreeSet::new();

        for webhook_id in &trigger.registered_webhook_ids {
            let effect = SpaceEffect::GetWebhook {
                webhook_id: webhook_id.clone(),
            };
            match self.run(connection, effect).await.and_then(|r| r.into_webhook()) {
                Ok(Some(webhook)) => existing.push(webhook),
                Ok(None) => debug!(%webhook_id, "Registered webhook no longer exists"),
                Err(e) if e.is_not_found() => {
                    debug!(%webhook_id, "Registered webhook no longer exists")
                }
                Err(e) => {
                    warn!(%webhook_id, trigger_id = %trigger.id, error = %e, "Failed to fetch webhook");
                    unreachable.insert(webhook_id.clone());
                }
            }
        }

        (existing, unreachable)
    }

    async fn create_webhook(
        &self,
        connection: &Connection,
        trigger: &TriggerDefinition,
        spec: WebhookSpec,
    ) -> Result<WebhookId, SpaceApiError> {
        let effect = SpaceEffect::CreateWebhook {
            project_key: trigger.project_key.clone(),
            spec,
        };
        let created = self.run(connection, effect).await?.into_created_webhook()?;
        info!(trigger_id = %trigger.id, webhook_id = %created.id, "Created webhook");
        Ok(created.id)
    }

    /// Returns true if the webhook is gone afterwards.
    async fn delete_webhook(&self, connection: &Connection, webhook_id: &WebhookId) -> bool {
        let effect = SpaceEffect::DeleteWebhook {
            webhook_id: webhook_id.clone(),
        };
        match self.run(connection, effect).await {
            Ok(_) => {
                info!(%webhook_id, "Deleted webhook");
                true
            }
            Err(e) if e.is_not_found() => true,
            Err(e) => {
                warn!(%webhook_id, error = %e, "Failed to delete webhook");
                false
            }
        }
    }

    async fn reconcile(&self, connection: &Connection, webhook: &RemoteWebhook, spec: &WebhookSpec) {
        let webhook_id = &webhook.id;

        if webhook.name != spec.name
            || webhook.description != spec.description
            || webhook.endpoint_url != spec.endpoint_url
        {
            let effect = SpaceEffect::UpdateWebhook {
                webhook_id: webhook_id.clone(),
                spec: spec.clone(),
            };
            if let Err(e) = self.run(connection, effect).await {
                warn!(%webhook_id, error = %e, "Failed to update webhook");
            }
        }

        for wanted in &spec.subscriptions {
            let current = webhook
                .subscriptions
                .iter()
                .find(|s| s.subscription.name == wanted.name);
            let effect = match current {
                Some(current) if &current.subscription == wanted => continue,
                Some(current) => SpaceEffect::UpdateSubscription {
                    webhook_id: webhook_id.clone(),
                    subscription_id: current.id.clone(),
                    subscription: wanted.clone(),
                },
                None => SpaceEffect::CreateSubscription {
                    webhook_id: webhook_id.clone(),
                    subscription: wanted.clone(),
                },
            };
            let name = effect.name();
            if let Err(e) = self.run(connection, effect).await {
                warn!(%webhook_id, subscription = %wanted.name, effect = name, error = %e, "Failed to sync subscription");
            }
        }

        for extra in webhook
            .subscriptions
            .iter()
            .filter(|s| !spec.subscriptions.iter().any(|w| w.name == s.subscription.name))
        {
            let effect = SpaceEffect::DeleteSubscription {
                webhook_id: webhook_id.clone(),
                subscription_id: extra.id.clone(),
            };
            if let Err(e) = self.run(connection, effect).await {
                warn!(%webhook_id, subscription = %extra.subscription.name, error = %e, "Failed to delete subscription");
            }
        }
    }

    async fn run(
        &self,
        connection: &Connection,
        effect: SpaceEffect,
    ) -> Result<space::SpaceResponse, SpaceApiError> {
        space::execute(
            self.interpreter.as_ref(),
            connection,
            self.config.retry_config(),
            effect,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::RemoteSubscription;
    use crate::test_utils::{
        FakeSpace, InMemoryDirectory, bridge_config, branch_push_trigger, job_with,
        merge_request_trigger,
    };

    struct Fixture {
        space: Arc<FakeSpace>,
        registry: Arc<TriggerRegistry>,
        synchronizer: WebhookSynchronizer<FakeSpace, InMemoryDirectory>,
    }

    fn fixture(trigger: &TriggerDefinition) -> Fixture {
        fixture_with(trigger, FakeSpace::new())
    }

    fn fixture_with(trigger: &TriggerDefinition, space: FakeSpace) -> Fixture {
        let directory = Arc::new(
            InMemoryDirectory::new().with_job(job_with("backend", vec![trigger.clone()])),
        );
        let registry = Arc::new(TriggerRegistry::load(directory.as_ref()));
        let space = Arc::new(space);
        let synchronizer = WebhookSynchronizer::new(
            Arc::clone(&space),
            directory,
            Arc::clone(&registry),
            Arc::new(bridge_config()),
        );
        Fixture {
            space,
            registry,
            synchronizer,
        }
    }

    fn remote(id: &str, spec: &WebhookSpec) -> RemoteWebhook {
        RemoteWebhook {
            id: WebhookId::new(id),
            name: spec.name.clone(),
            description: spec.description.clone(),
            endpoint_url: spec.endpoint_url.clone(),
            subscriptions: spec
                .subscriptions
                .iter()
                .enumerate()
                .map(|(n, s)| RemoteSubscription {
                    id: format!("{id}-sub-{n}"),
                    subscription: s.clone(),
                })
                .collect(),
        }
    }

    // ─── Desired state ──────────────────────────────────────────────────────

    #[test]
    fn branch_push_subscribes_to_heads() {
        let trigger = branch_push_trigger("t1");
        let spec = desired_webhook(&JobName::new("backend"), &trigger, &bridge_config()).unwrap();
        assert_eq!(spec.name, "GEN|t1|PRJ|backend");
        assert_eq!(spec.endpoint_url, "https://ci.example.com/spacecode-webhook/");
        assert_eq!(spec.subscriptions.len(), 1);
        assert_eq!(spec.subscriptions[0].events, vec!["Repository.Heads"]);
        assert_eq!(spec.subscriptions[0].repository.as_deref(), Some("backend"));
    }

    #[test]
    fn branch_spec_becomes_subscription_filter() {
        let job = JobName::new("backend");
        let config = bridge_config();

        let mut only_main = branch_push_trigger("t1");
        only_main.branch_spec = "+:main".into();
        let mut all_but_main = branch_push_trigger("t1");
        all_but_main.branch_spec = "+:*\n# release branches build elsewhere\n\n-:main".into();

        let only_main = desired_webhook(&job, &only_main, &config).unwrap();
        let all_but_main = desired_webhook(&job, &all_but_main, &config).unwrap();
        assert_eq!(only_main.subscriptions[0].branch_spec, vec!["+:main"]);
        assert_eq!(all_but_main.subscriptions[0].branch_spec, vec!["+:*", "-:main"]);
        assert_ne!(only_main, all_but_main);
    }

    #[test]
    fn regex_spec_and_reviews_subscribe_to_every_branch() {
        let job = JobName::new("backend");
        let config = bridge_config();

        let mut regex = branch_push_trigger("t1");
        regex.branch_spec = "+:release/\\d+".into();
        regex.branch_spec_is_regex = true;
        let spec = desired_webhook(&job, &regex, &config).unwrap();
        assert!(spec.subscriptions[0].branch_spec.is_empty());

        let spec = desired_webhook(&job, &merge_request_trigger("t2"), &config).unwrap();
        assert!(spec.subscriptions[0].branch_spec.is_empty());
    }

    #[test]
    fn merge_request_events_follow_filters() {
        let job = JobName::new("backend");
        let config = bridge_config();

        let plain = merge_request_trigger("t1");
        let spec = desired_webhook(&job, &plain, &config).unwrap();
        assert_eq!(
            spec.subscriptions[0].events,
            vec!["CodeReview.Created", "CodeReview.CommitsUpdated"]
        );

        let mut gated = merge_request_trigger("t2");
        gated.merge_request.title_regex = Some("release/.*".into());
        gated.merge_request.require_all_approvals = true;
        let spec = desired_webhook(&job, &gated, &config).unwrap();
        assert_eq!(
            spec.subscriptions[0].events,
            vec![
                "CodeReview.CommitsUpdated",
                "CodeReview.TitleUpdated",
                "CodeReview.Participant.ReviewerStateUpdated"
            ]
        );
    }

    #[test]
    fn safe_merge_only_needs_no_webhook() {
        let mut trigger = branch_push_trigger("t1");
        trigger.trigger_type = TriggerType::SafeMergeOnly;
        assert!(desired_webhook(&JobName::new("backend"), &trigger, &bridge_config()).is_none());
    }

    // ─── Sync ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn creates_webhook_when_none_registered() {
        let trigger = branch_push_trigger("t1");
        let f = fixture(&trigger);

        let ids = f.synchronizer.sync(&JobName::new("backend"), &trigger).await.unwrap();
        assert_eq!(ids.len(), 1);

        let id = ids.iter().next().unwrap();
        let created = f.space.webhook(id).unwrap();
        assert_eq!(created.name, "GEN|t1|PRJ|backend");
        assert_eq!(
            f.registry.find_by_webhook_id(id).unwrap().trigger.id,
            TriggerId::new("t1")
        );
    }

    #[tokio::test]
    async fn keeps_first_existing_and_deletes_duplicates() {
        let mut trigger = branch_push_trigger("t1");
        let spec = desired_webhook(&JobName::new("backend"), &trigger, &bridge_config()).unwrap();
        trigger.registered_webhook_ids = BTreeSet::from([
            WebhookId::new("wh-a"),
            WebhookId::new("wh-b"),
            WebhookId::new("wh-gone"),
        ]);
        let space = FakeSpace::new()
            .with_webhook(remote("wh-a", &spec))
            .with_webhook(remote("wh-b", &spec));
        let f = fixture_with(&trigger, space);

        let ids = f.synchronizer.sync(&JobName::new("backend"), &trigger).await.unwrap();
        assert_eq!(ids, BTreeSet::from([WebhookId::new("wh-a")]));
        assert!(f.space.webhook(&WebhookId::new("wh-b")).is_none());
        assert!(f.registry.find_by_webhook_id(&WebhookId::new("wh-gone")).is_none());

        // Up-to-date webhook: no update or subscription effects.
        assert!(!f.space.effects().iter().any(|e| matches!(
            e,
            SpaceEffect::UpdateWebhook { .. }
                | SpaceEffect::CreateSubscription { .. }
                | SpaceEffect::UpdateSubscription { .. }
        )));
    }

    #[tokio::test]
    async fn diffs_subscriptions_by_name() {
        let mut trigger = merge_request_trigger("t1");
        let old_spec = desired_webhook(&JobName::new("backend"), &trigger, &bridge_config()).unwrap();
        let mut stale = remote("wh-a", &old_spec);
        stale.endpoint_url = "https://old.example.com/hook".into();
        stale.subscriptions.push(RemoteSubscription {
            id: "wh-a-extra".into(),
            subscription: Subscription {
                name: "Leftover".into(),
                project_key: "PRJ".into(),
                repository: None,
                events: vec!["Repository.Heads".into()],
                branch_spec: Vec::new(),
            },
        });

        trigger.merge_request.title_regex = Some("release/.*".into());
        trigger.registered_webhook_ids = BTreeSet::from([WebhookId::new("wh-a")]);
        let f = fixture_with(&trigger, FakeSpace::new().with_webhook(stale));

        f.synchronizer.sync(&JobName::new("backend"), &trigger).await.unwrap();

        let effects = f.space.effects();
        assert!(effects.iter().any(|e| matches!(e, SpaceEffect::UpdateWebhook { .. })));
        assert!(effects.iter().any(|e| matches!(
            e,
            SpaceEffect::UpdateSubscription { subscription, .. }
                if subscription.events.contains(&"CodeReview.TitleUpdated".to_string())
        )));
        assert!(effects.iter().any(|e| matches!(
            e,
            SpaceEffect::DeleteSubscription { subscription_id, .. } if subscription_id == "wh-a-extra"
        )));
    }

    #[tokio::test]
    async fn changed_branch_spec_updates_subscription() {
        let mut trigger = branch_push_trigger("t1");
        let old_spec = desired_webhook(&JobName::new("backend"), &trigger, &bridge_config()).unwrap();
        trigger.branch_spec = "+:*\n-:main".into();
        trigger.registered_webhook_ids = BTreeSet::from([WebhookId::new("wh-a")]);
        let f = fixture_with(&trigger, FakeSpace::new().with_webhook(remote("wh-a", &old_spec)));

        f.synchronizer.sync(&JobName::new("backend"), &trigger).await.unwrap();

        let updated: Vec<_> = f
            .space
            .effects()
            .into_iter()
            .filter_map(|e| match e {
                SpaceEffect::UpdateSubscription { subscription, .. } => Some(subscription.branch_spec),
                _ => None,
            })
            .collect();
        assert_eq!(updated, vec![vec!["+:*".to_string(), "-:main".to_string()]]);
        assert!(!f.space.effects().iter().any(|e| matches!(e, SpaceEffect::CreateWebhook { .. })));
    }

    #[tokio::test]
    async fn safe_merge_only_deletes_existing_webhooks() {
        let mut trigger = branch_push_trigger("t1");
        let spec = desired_webhook(&JobName::new("backend"), &trigger, &bridge_config()).unwrap();
        trigger.trigger_type = TriggerType::SafeMergeOnly;
        trigger.registered_webhook_ids = BTreeSet::from([WebhookId::new("wh-a")]);
        let f = fixture_with(&trigger, FakeSpace::new().with_webhook(remote("wh-a", &spec)));

        let ids = f.synchronizer.sync(&JobName::new("backend"), &trigger).await.unwrap();
        assert!(ids.is_empty());
        assert!(f.space.webhook(&WebhookId::new("wh-a")).is_none());
    }

    #[tokio::test]
    async fn fails_when_no_webhook_can_be_created() {
        let trigger = branch_push_trigger("t1");
        let space = FakeSpace::new().failing("create_webhook", SpaceApiError::from_status(403, "forbidden"));
        let f = fixture_with(&trigger, space);

        let err = f.synchronizer.sync(&JobName::new("backend"), &trigger).await.unwrap_err();
        assert!(matches!(err, SyncError::NoWebhook { .. }), "{err}");
    }

    #[tokio::test]
    async fn subscription_failure_does_not_fail_sync() {
        let mut trigger = merge_request_trigger("t1");
        let spec = desired_webhook(&JobName::new("backend"), &trigger, &bridge_config()).unwrap();
        let mut webhook = remote("wh-a", &spec);
        webhook.subscriptions.clear();
        trigger.registered_webhook_ids = BTreeSet::from([WebhookId::new("wh-a")]);
        let space = FakeSpace::new()
            .with_webhook(webhook)
            .failing("create_subscription", SpaceApiError::from_status(400, "bad"));
        let f = fixture_with(&trigger, space);

        let ids = f.synchronizer.sync(&JobName::new("backend"), &trigger).await.unwrap();
        assert_eq!(ids, BTreeSet::from([WebhookId::new("wh-a")]));
    }

    #[tokio::test]
    async fn unknown_connection_is_an_error() {
        let mut trigger = branch_push_trigger("t1");
        trigger.connection_id = ConnectionId::new("conn-missing");
        let f = fixture(&trigger);

        let err = f.synchronizer.sync(&JobName::new("backend"), &trigger).await.unwrap_err();
        assert!(matches!(err, SyncError::UnknownConnection(_)));
    }
}
