//! SpaceCode API effect types.
//!
//! These types describe remote calls as data, without executing them. A
//! `SpaceInterpreter` runs them against a concrete `Connection`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{MergeRequestSnapshot, WebhookId};

use super::error::SpaceApiError;

/// Check status as reported to SpaceCode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExternalStatus {
    Running,
    Succeeded,
    Terminated,
    Failed,
}

impl ExternalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalStatus::Running => "RUNNING",
            ExternalStatus::Succeeded => "SUCCEEDED",
            ExternalStatus::Terminated => "TERMINATED",
            ExternalStatus::Failed => "FAILED",
        }
    }
}

/// One event subscription on a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique per webhook; subscriptions are diffed by name.
    pub name: String,
    pub project_key: String,
    /// `None` subscribes to every repository in the project.
    pub repository: Option<String>,
    pub events: Vec<String>,
    /// Wildcard branch filter lines; empty means every branch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branch_spec: Vec<String>,
}

/// The full desired state of a webhook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookSpec {
    pub name: String,
    pub description: String,
    pub endpoint_url: String,
    pub payload_fields: Vec<String>,
    pub subscriptions: Vec<Subscription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteSubscription {
    pub id: String,
    pub subscription: Subscription,
}

/// A webhook as it currently exists on SpaceCode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteWebhook {
    pub id: WebhookId,
    pub name: String,
    pub description: String,
    pub endpoint_url: String,
    pub subscriptions: Vec<RemoteSubscription>,
}

/// Payload of an external check status post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckStatusReport {
    pub project_key: String,
    pub repository: String,
    pub revision: String,
    pub branch: String,
    pub status: ExternalStatus,
    pub url: String,
    pub service_name: String,
    pub task_name: String,
    pub task_id: String,
    pub task_build_id: String,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// A SpaceCode API effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpaceEffect {
    // ─── Webhooks ───────────────────────────────────────────────────────────
    /// Fetch a webhook. A missing webhook is `Webhook(None)`, not an error.
    GetWebhook { webhook_id: WebhookId },

    CreateWebhook {
        project_key: String,
        spec: WebhookSpec,
    },

    /// Update name, description and endpoint. Subscriptions are left alone.
    UpdateWebhook {
        webhook_id: WebhookId,
        spec: WebhookSpec,
    },

    DeleteWebhook { webhook_id: WebhookId },

    // ─── Subscriptions ──────────────────────────────────────────────────────
    CreateSubscription {
        webhook_id: WebhookId,
        subscription: Subscription,
    },

    UpdateSubscription {
        webhook_id: WebhookId,
        subscription_id: String,
        subscription: Subscription,
    },

    DeleteSubscription {
        webhook_id: WebhookId,
        subscription_id: String,
    },

    // ─── Reviews & checks ───────────────────────────────────────────────────
    GetMergeRequest {
        project_key: String,
        merge_request_id: String,
    },

    ReportExternalCheckStatus(CheckStatusReport),
}

impl SpaceEffect {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SpaceEffect::GetWebhook { .. } => "get_webhook",
            SpaceEffect::CreateWebhook { .. } => "create_webhook",
            SpaceEffect::UpdateWebhook { .. } => "update_webhook",
            SpaceEffect::DeleteWebhook { .. } => "delete_webhook",
            SpaceEffect::CreateSubscription { .. } => "create_subscription",
            SpaceEffect::UpdateSubscription { .. } => "update_subscription",
            SpaceEffect::DeleteSubscription { .. } => "delete_subscription",
            SpaceEffect::GetMergeRequest { .. } => "get_merge_request",
            SpaceEffect::ReportExternalCheckStatus(_) => "report_external_check_status",
        }
    }
}

/// Response from executing a `SpaceEffect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpaceResponse {
    /// Response to `GetWebhook`.
    Webhook(Option<RemoteWebhook>),

    /// Response to `CreateWebhook`.
    WebhookCreated(RemoteWebhook),

    /// Response to `CreateSubscription`.
    SubscriptionCreated { id: String },

    /// Response to `GetMergeRequest`.
    MergeRequest(MergeRequestSnapshot),

    /// Response to every effect with nothing to return.
    Done,
}

impl SpaceResponse {
    pub fn into_webhook(self) -> Result<Option<RemoteWebhook>, SpaceApiError> {
        match self {
            SpaceResponse::Webhook(webhook) => Ok(webhook),
            other => Err(SpaceApiError::unexpected_response("get_webhook", other)),
        }
    }

    pub fn into_created_webhook(self) -> Result<RemoteWebhook, SpaceApiError> {
        match self {
            SpaceResponse::WebhookCreated(webhook) => Ok(webhook),
            other => Err(SpaceApiError::unexpected_response("create_webhook", other)),
        }
    }

    pub fn into_merge_request(self) -> Result<MergeRequestSnapshot, SpaceApiError> {
        match self {
            SpaceResponse::MergeRequest(review) => Ok(review),
            other => Err(SpaceApiError::unexpected_response("get_merge_request", other)),
        }
    }
}
