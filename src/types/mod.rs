//! Core domain types shared by every component.

pub mod build;
pub mod cause;
pub mod ids;
pub mod review;
pub mod trigger;

pub use build::{Build, BuildResult, GitRevision, QueueItem};
pub use cause::{BuildCause, EventKind, MergeRequestInfo, SafeMergeInfo};
pub use ids::{BuildNumber, ClientId, ConnectionId, JobName, QueueId, TriggerId, WebhookId};
pub use review::{
    BranchPair, MergeRequestSnapshot, Participant, ParticipantRole, ReviewKind, ReviewerState,
};
pub use trigger::{
    Connection, Job, MergeRequestFilter, ProjectBinding, TriggerConfigError, TriggerDefinition,
    TriggerType,
};
