//! Inbound webhook handling: route, authenticate, classify, dispatch.
//!
//! Every delivery ends in a `WebhookResponse`; nothing escapes as an error.
//!
//! | Situation | Response |
//! |-----------|----------|
//! | webhook id unknown, even by name | 400, logged with the webhook id |
//! | caller is not the trigger's connection | 401 |
//! | event should not have reached the trigger | webhook re-sync, then 400 |
//! | event filtered out by the trigger | 202 |
//! | build scheduled or already queued | 200 |
//! | build refused | 400 |

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::jobs::{BuildDispatcher, DispatchResult, JobDirectory, JobQueue};
use crate::space::{self, SpaceApiError, SpaceEffect, SpaceInterpreter};
use crate::types::{ClientId, TriggerId, WebhookId};

use super::classify::{TriggerOutcome, classify};
use super::events::WebhookDelivery;
use super::naming::parse_webhook_name;
use super::registry::RegisteredTrigger;
use super::sync::WebhookSynchronizer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookResponse {
    Ok(String),
    Accepted(String),
    BadRequest(String),
    Unauthorized(String),
}

impl WebhookResponse {
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookResponse::Ok(_) => 200,
            WebhookResponse::Accepted(_) => 202,
            WebhookResponse::BadRequest(_) => 400,
            WebhookResponse::Unauthorized(_) => 401,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            WebhookResponse::Ok(m)
            | WebhookResponse::Accepted(m)
            | WebhookResponse::BadRequest(m)
            | WebhookResponse::Unauthorized(m) => m,
        }
    }
}

/// Why a delivery could not be tied to a trigger.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("no connection is configured for client {0}")]
    UnknownClient(ClientId),

    #[error("webhook {0} does not exist")]
    UnknownWebhook(WebhookId),

    #[error("webhook {webhook_id} is named `{name}`, which was not generated by this server")]
    ForeignWebhook { webhook_id: WebhookId, name: String },

    #[error("webhook {webhook_id} belongs to trigger {trigger_id}, which no longer exists")]
    UnknownTrigger {
        webhook_id: WebhookId,
        trigger_id: TriggerId,
    },

    #[error("failed to look up webhook {webhook_id}: {source}")]
    Remote {
        webhook_id: WebhookId,
        #[source]
        source: SpaceApiError,
    },
}

struct Route {
    registered: RegisteredTrigger,
    /// Found by webhook name rather than by id.
    stale: bool,
}

pub struct WebhookHandler<I, D, Q> {
    synchronizer: Arc<WebhookSynchronizer<I, D>>,
    dispatcher: Arc<BuildDispatcher<Q>>,
}

impl<I, D, Q> WebhookHandler<I, D, Q>
where
    I: SpaceInterpreter,
    D: JobDirectory,
    Q: JobQueue,
{
    pub fn new(synchronizer: Arc<WebhookSynchronizer<I, D>>, dispatcher: Arc<BuildDispatcher<Q>>) -> Self {
        WebhookHandler {
            synchronizer,
            dispatcher,
        }
    }

    pub async fn handle(&self, delivery: WebhookDelivery) -> WebhookResponse {
        let webhook_id = &delivery.webhook_id;
        let event = &delivery.payload;
        debug!(%webhook_id, event = event.kind().as_str(), "Received webhook delivery");

        let route = match self.route(&delivery).await {
            Ok(route) => route,
            Err(e) => {
                error!(%webhook_id, client_id = %delivery.client_id, error = %e, "Unroutable webhook delivery");
                return WebhookResponse::BadRequest(e.to_string());
            }
        };
        let RegisteredTrigger { job, trigger } = &route.registered;

        let directory = self.synchronizer.directory();
        let Some(connection) = directory.connection_by_id(&trigger.connection_id) else {
            error!(%webhook_id, trigger_id = %trigger.id, connection_id = %trigger.connection_id, "Trigger refers to an unknown connection");
            return WebhookResponse::BadRequest(format!(
                "connection {} is not configured",
                trigger.connection_id
            ));
        };
        if connection.client_id != delivery.client_id {
            warn!(%webhook_id, client_id = %delivery.client_id, trigger_id = %trigger.id, "Webhook delivery from the wrong client");
            return WebhookResponse::Unauthorized(format!(
                "client {} may not call webhook {webhook_id}",
                delivery.client_id
            ));
        }

        let mut resynced = false;
        if route.stale {
            info!(%webhook_id, trigger_id = %trigger.id, "Webhook found by name; re-synchronizing");
            // Sync must see the delivering webhook, or it would create another.
            let mut known = route.registered.clone();
            known.trigger.registered_webhook_ids.insert(webhook_id.clone());
            self.resync(&known).await;
            resynced = true;
        }

        match classify(event, trigger, &connection.base_url) {
            TriggerOutcome::Unexpected => {
                warn!(%webhook_id, %job, trigger_id = %trigger.id, event = event.kind().as_str(), "Unexpected event for trigger");
                if !resynced {
                    self.resync(&route.registered).await;
                }
                WebhookResponse::BadRequest(format!(
                    "event {} does not match trigger {}",
                    event.kind().as_str(),
                    trigger.id
                ))
            }
            TriggerOutcome::Ignored => {
                info!(%webhook_id, %job, trigger_id = %trigger.id, "Event filtered out by trigger configuration");
                WebhookResponse::Accepted("event does not match trigger filters".to_string())
            }
            TriggerOutcome::RunBuild(cause) => {
                let Some(job_def) = directory.find_job_by_name(job) else {
                    error!(%webhook_id, %job, "Trigger refers to an unknown job");
                    return WebhookResponse::BadRequest(format!("job {job} does not exist"));
                };
                match self.dispatcher.dispatch(&job_def, trigger, cause) {
                    DispatchResult::Scheduled(item) => {
                        WebhookResponse::Ok(format!("scheduled {job} as queue item {}", item.id))
                    }
                    DispatchResult::AlreadyQueued(item) => {
                        WebhookResponse::Ok(format!("{job} already queued as queue item {}", item.id))
                    }
                    DispatchResult::Refused(e) => {
                        error!(%webhook_id, %job, error = %e, "Build refused");
                        WebhookResponse::BadRequest(e.to_string())
                    }
                }
            }
        }
    }

    /// Finds the trigger behind a delivery, first by webhook id, then by
    /// decoding the webhook's name.
    async fn route(&self, delivery: &WebhookDelivery) -> Result<Route, RouteError> {
        let webhook_id = &delivery.webhook_id;
        let registry = self.synchronizer.registry();
        if let Some(registered) = registry.find_by_webhook_id(webhook_id) {
            return Ok(Route {
                registered,
                stale: false,
            });
        }

        let connection = self
            .synchronizer
            .directory()
            .connection_by_client_id(&delivery.client_id)
            .ok_or_else(|| RouteError::UnknownClient(delivery.client_id.clone()))?;

        let effect = SpaceEffect::GetWebhook {
            webhook_id: webhook_id.clone(),
        };
        let config = self.synchronizer.config();
        let webhook = space::execute(self.synchronizer.interpreter(), &connection, config.retry_config(), effect)
            .await
            .and_then(|r| r.into_webhook())
            .map_err(|source| RouteError::Remote {
                webhook_id: webhook_id.clone(),
                source,
            })?
            .ok_or_else(|| RouteError::UnknownWebhook(webhook_id.clone()))?;

        let name = parse_webhook_name(&webhook.name).ok_or_else(|| RouteError::ForeignWebhook {
            webhook_id: webhook_id.clone(),
            name: webhook.name.clone(),
        })?;

        let registered = registry
            .find_by_trigger_id(&name.trigger_id)
            .ok_or_else(|| RouteError::UnknownTrigger {
                webhook_id: webhook_id.clone(),
                trigger_id: name.trigger_id,
            })?;

        Ok(Route {
            registered,
            stale: true,
        })
    }

    async fn resync(&self, registered: &RegisteredTrigger) {
        if let Err(e) = self.synchronizer.sync(&registered.job, &registered.trigger).await {
            warn!(job = %registered.job, trigger_id = %registered.trigger.id, error = %e, "Webhook re-sync failed");
        }
    }
}
