//! In-memory index from webhook ids and trigger ids to triggers.
//!
//! Lookups run once per delivery and scan every trigger of every job. The
//! index is an immutable snapshot behind an `Arc`; writers (webhook re-sync,
//! configuration reload) build a new snapshot and swap it in, so a concurrent
//! lookup sees either the old or the new state, never a mix.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::jobs::JobDirectory;
use crate::types::{JobName, TriggerDefinition, TriggerId, WebhookId};

/// A trigger together with the job it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredTrigger {
    pub job: JobName,
    pub trigger: TriggerDefinition,
}

#[derive(Debug, Default)]
pub struct TriggerRegistry {
    snapshot: RwLock<Arc<Vec<RegisteredTrigger>>>,
}

impl TriggerRegistry {
    pub fn new(triggers: Vec<RegisteredTrigger>) -> Self {
        TriggerRegistry {
            snapshot: RwLock::new(Arc::new(triggers)),
        }
    }

    /// Builds the registry from every trigger the directory knows about.
    pub fn load(directory: &impl JobDirectory) -> Self {
        Self::new(collect(directory))
    }

    /// Replaces the whole index with the directory's current triggers.
    pub fn reload(&self, directory: &impl JobDirectory) {
        let triggers = collect(directory);
        debug!(triggers = triggers.len(), "Reloaded trigger registry");
        *self.snapshot.write() = Arc::new(triggers);
    }

    /// Current snapshot. Cheap; holds no lock after returning.
    pub fn snapshot(&self) -> Arc<Vec<RegisteredTrigger>> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn find_by_webhook_id(&self, webhook_id: &WebhookId) -> Option<RegisteredTrigger> {
        self.snapshot()
            .iter()
            .find(|t| t.trigger.registered_webhook_ids.contains(webhook_id))
            .cloned()
    }

    pub fn find_by_trigger_id(&self, trigger_id: &TriggerId) -> Option<RegisteredTrigger> {
        self.snapshot()
            .iter()
            .find(|t| &t.trigger.id == trigger_id)
            .cloned()
    }

    /// Publishes the set of webhooks now backing `trigger_id`.
    ///
    /// Returns false if the trigger is no longer registered.
    pub fn set_webhook_ids(&self, trigger_id: &TriggerId, ids: BTreeSet<WebhookId>) -> bool {
        let mut guard = self.snapshot.write();
        let Some(index) = guard.iter().position(|t| &t.trigger.id == trigger_id) else {
            return false;
        };

        let mut next = Vec::clone(&guard);
        next[index].trigger.registered_webhook_ids = ids;
        *guard = Arc::new(next);
        true
    }
}

fn collect(directory: &impl JobDirectory) -> Vec<RegisteredTrigger> {
    directory
        .all_triggers()
        .into_iter()
        .map(|(job, trigger)| RegisteredTrigger { job, trigger })
        .collect()
}
