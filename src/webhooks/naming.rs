//! Names of webhooks created by this crate.
//!
//! Generated names encode the owning trigger:
//! `GEN|<trigger id>|<project key>|<repository>`. When a delivery arrives for
//! a webhook id no trigger knows about, the name is the only way back to the
//! trigger. Renaming the webhook on the remote side breaks that link.

use crate::types::{TriggerDefinition, TriggerId};

const MARKER: &str = "GEN";
const SEPARATOR: char = '|';

/// A decoded generated webhook name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedName {
    pub trigger_id: TriggerId,
    pub project_key: String,
    pub repository: String,
}

/// Name of the webhook backing `trigger`.
pub fn webhook_name(trigger: &TriggerDefinition) -> String {
    format!(
        "{MARKER}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
        trigger.id,
        trigger.project_key,
        trigger.repository().unwrap_or_default()
    )
}

/// Decodes a webhook name, or returns `None` if this crate did not generate it.
pub fn parse_webhook_name(name: &str) -> Option<GeneratedName> {
    let parts: Vec<&str> = name.split(SEPARATOR).collect();
    match parts.as_slice() {
        [MARKER, trigger_id, project_key, repository] if !trigger_id.is_empty() => {
            Some(GeneratedName {
                trigger_id: TriggerId::new(*trigger_id),
                project_key: project_key.to_string(),
                repository: repository.to_string(),
            })
        }
        _ => None,
    }
}
