//! External check status reporting.

mod derive;
mod reporter;

pub use crate::space::ExternalStatus;
pub use derive::derive_status;
pub use reporter::{ReportOutcome, ReportTarget, StatusReporter};
