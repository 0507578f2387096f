//! Newtype wrappers for domain identifiers.
//!
//! Webhook ids, trigger ids, connection ids and job names are all strings on
//! the wire, and queue ids and build numbers are both integers drawn from
//! independent sequences. Wrapping each one keeps them from being mixed up.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a webhook registered on the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookId(pub String);

impl WebhookId {
    pub fn new(s: impl Into<String>) -> Self {
        WebhookId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WebhookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WebhookId {
    fn from(s: &str) -> Self {
        WebhookId(s.to_string())
    }
}

/// Stable opaque identifier of a trigger definition.
///
/// Trigger ids are embedded in generated webhook names, so they must never
/// contain the `|` separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(pub String);

impl TriggerId {
    pub fn new(s: impl Into<String>) -> Self {
        TriggerId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TriggerId {
    fn from(s: &str) -> Self {
        TriggerId(s.to_string())
    }
}

/// Identifier of a configured connection to a SpaceCode organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn new(s: impl Into<String>) -> Self {
        ConnectionId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// OAuth client identity the remote platform authenticates calls with.
///
/// Every inbound webhook delivery and safe-merge command carries one; it is
/// compared against the client id of the connection a job is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn new(s: impl Into<String>) -> Self {
        ClientId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Full name of a CI job (folder path included, e.g. `team/backend/main`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobName(pub String);

impl JobName {
    pub fn new(s: impl Into<String>) -> Self {
        JobName(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobName {
    fn from(s: &str) -> Self {
        JobName(s.to_string())
    }
}

/// Id of an entry in the job queue, from the queue's own sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(pub u64);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for QueueId {
    fn from(n: u64) -> Self {
        QueueId(n)
    }
}

/// Number of an execution within its job, from the job's build sequence.
///
/// Unrelated to [`QueueId`]: the same integer may name a queue entry and a
/// build at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildNumber(pub u64);

impl fmt::Display for BuildNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for BuildNumber {
    fn from(n: u64) -> Self {
        BuildNumber(n)
    }
}
