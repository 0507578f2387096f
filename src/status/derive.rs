use crate::space::ExternalStatus;
use crate::types::{Build, BuildResult};

/// Maps an execution's state to the status reported to SpaceCode.
///
/// Any result that is not explicitly a success or a termination counts as a
/// failure, including result kinds added after this was written.
pub fn derive_status(build: &Build) -> ExternalStatus {
    if build.in_progress {
        return ExternalStatus::Running;
    }
    match build.result {
        Some(BuildResult::Success | BuildResult::Unstable) => ExternalStatus::Succeeded,
        Some(BuildResult::Aborted | BuildResult::NotBuilt) => ExternalStatus::Terminated,
        Some(BuildResult::Failure | BuildResult::Unknown) | None => ExternalStatus::Failed,
    }
}
