//! Decides what a webhook event means for one trigger.
//!
//! # Outcomes
//!
//! | Outcome | Meaning | Caller reaction |
//! |---------|---------|-----------------|
//! | `RunBuild` | event passes every filter | schedule a build |
//! | `Unexpected` | the event should never have reached this trigger | re-sync the webhook, reply 400 |
//! | `Ignored` | correctly routed, filtered out by configuration | reply 202, no build |
//!
//! Each event is judged on its own together with the trigger's static
//! configuration. Deliveries may arrive out of order, so nothing here depends
//! on having seen an earlier event.

use tracing::{debug, warn};

use crate::branch_spec::{BranchSpec, cached_regex};
use crate::types::{
    BranchPair, BuildCause, EventKind, MergeRequestInfo, MergeRequestSnapshot, TriggerDefinition,
    TriggerType,
};

use super::events::WebhookEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    RunBuild(BuildCause),
    Unexpected,
    Ignored,
}

/// Classifies `event` against `trigger`.
///
/// `space_url` is the base URL of the trigger's connection; it ends up in the
/// build cause.
pub fn classify(event: &WebhookEvent, trigger: &TriggerDefinition, space_url: &str) -> TriggerOutcome {
    match trigger.trigger_type {
        TriggerType::BranchPush => classify_push(event, trigger, space_url),
        TriggerType::MergeRequest => classify_review(event, trigger, space_url),
        TriggerType::SafeMergeOnly => {
            warn!(
                trigger_id = %trigger.id,
                event = event.kind().as_str(),
                "Webhook event routed to a safe-merge-only trigger"
            );
            TriggerOutcome::Unexpected
        }
    }
}

fn classify_push(event: &WebhookEvent, trigger: &TriggerDefinition, space_url: &str) -> TriggerOutcome {
    let WebhookEvent::BranchHeadsChanged {
        project_key,
        repository,
        refs,
    } = event
    else {
        return TriggerOutcome::Unexpected;
    };

    if !trigger.covers(project_key, repository) {
        debug!(
            trigger_id = %trigger.id,
            project_key = %project_key,
            repository = %repository,
            "Push event outside the trigger's repository scope"
        );
        return TriggerOutcome::Unexpected;
    }

    // Without refs the subscription filter is all we have to go on.
    if !refs.is_empty() {
        let spec = BranchSpec::parse(&trigger.branch_spec, trigger.branch_spec_is_regex);
        if !refs.iter().any(|r| spec.matches(r)) {
            debug!(
                trigger_id = %trigger.id,
                refs = ?refs,
                "No pushed branch matches the trigger's branch spec"
            );
            return TriggerOutcome::Ignored;
        }
    }

    TriggerOutcome::RunBuild(BuildCause {
        connection_id: trigger.connection_id.clone(),
        space_url: space_url.to_string(),
        project_key: project_key.clone(),
        repository_name: repository.clone(),
        trigger_type: trigger.trigger_type,
        event_kind: EventKind::BranchHeadsChanged,
        merge_request: None,
        safe_merge: None,
    })
}

fn classify_review(
    event: &WebhookEvent,
    trigger: &TriggerDefinition,
    space_url: &str,
) -> TriggerOutcome {
    let filter = &trigger.merge_request;

    let (review, routable) = match event {
        WebhookEvent::BranchHeadsChanged { .. } => return TriggerOutcome::Unexpected,
        WebhookEvent::ReviewCreated { review } => (review, !filter.require_all_approvals),
        WebhookEvent::ReviewTitleChanged { review, .. } => {
            if filter.title_regex().is_none() {
                warn!(
                    trigger_id = %trigger.id,
                    review = review.number,
                    "Title change event for a trigger without a title filter"
                );
            }
            (review, filter.title_regex().is_some())
        }
        WebhookEvent::ReviewParticipantChanged {
            review,
            reviewer_state,
        } => (
            review,
            reviewer_state.is_some() && filter.require_all_approvals,
        ),
        WebhookEvent::ReviewCommitsChanged { review } => (review, true),
    };

    if !routable {
        return TriggerOutcome::Unexpected;
    }
    if !review.is_merge_request() {
        return ignored(trigger, review, "not a merge request");
    }
    let Some(pair) = review.primary_branch_pair() else {
        return ignored(trigger, review, "no branches");
    };

    if !trigger.covers(&review.project_key, &pair.repository) {
        debug!(
            trigger_id = %trigger.id,
            project_key = %review.project_key,
            repository = %pair.repository,
            "Review outside the trigger's repository scope"
        );
        return TriggerOutcome::Unexpected;
    }

    if !spec_accepts(filter.source_branch_spec.as_deref(), &pair.source_branch) {
        return ignored(trigger, review, "source branch filtered out");
    }
    if !spec_accepts(filter.target_branch_spec.as_deref(), &pair.target_branch) {
        return ignored(trigger, review, "target branch filtered out");
    }

    if filter.require_all_approvals && !review.all_reviewers_accepted() {
        return ignored(trigger, review, "not every reviewer has accepted");
    }

    if let Some(source) = filter.title_regex() {
        let title_regex = match cached_regex(source) {
            Ok(regex) => regex,
            Err(e) => {
                warn!(trigger_id = %trigger.id, error = %e, "Trigger has an invalid title regex");
                return TriggerOutcome::Ignored;
            }
        };

        if !title_regex.is_match(&review.title) {
            debug!(
                trigger_id = %trigger.id,
                review = review.number,
                "Review title does not match the trigger's title filter"
            );
            return TriggerOutcome::Unexpected;
        }

        if let WebhookEvent::ReviewTitleChanged {
            old_title,
            new_title,
            ..
        } = event
            && !(title_regex.is_match(new_title) && !title_regex.is_match(old_title))
        {
            return ignored(trigger, review, "title already matched before the change");
        }
    }

    TriggerOutcome::RunBuild(review_cause(trigger, review, pair, event.kind(), space_url))
}

fn spec_accepts(spec: Option<&str>, branch: &str) -> bool {
    match spec.filter(|s| !s.trim().is_empty()) {
        Some(spec) => BranchSpec::parse(spec, false).matches(branch),
        None => true,
    }
}

fn ignored(trigger: &TriggerDefinition, review: &MergeRequestSnapshot, reason: &str) -> TriggerOutcome {
    debug!(trigger_id = %trigger.id, review = review.number, reason, "Review event ignored");
    TriggerOutcome::Ignored
}

fn review_cause(
    trigger: &TriggerDefinition,
    review: &MergeRequestSnapshot,
    pair: &BranchPair,
    event_kind: EventKind,
    space_url: &str,
) -> BuildCause {
    BuildCause {
        connection_id: trigger.connection_id.clone(),
        space_url: space_url.to_string(),
        project_key: review.project_key.clone(),
        repository_name: pair.repository.clone(),
        trigger_type: trigger.trigger_type,
        event_kind,
        merge_request: Some(merge_request_info(review, pair, space_url)),
        safe_merge: None,
    }
}

/// Merge request metadata for a build cause, taken from `pair`.
pub(crate) fn merge_request_info(
    review: &MergeRequestSnapshot,
    pair: &BranchPair,
    space_url: &str,
) -> MergeRequestInfo {
    MergeRequestInfo {
        id: review.id.clone(),
        number: review.number,
        title: review.title.clone(),
        url: review.url(space_url, &pair.repository),
        source_branch: pair.source_branch.clone(),
        source_ref: pair.source_ref.clone(),
        target_branch: pair.target_branch.clone(),
        target_ref: pair.target_ref.clone(),
    }
}
