//! SpaceCode CI bridge - routes SpaceCode webhooks and safe-merge commands to
//! CI builds, and reports build status back to SpaceCode.
//!
//! The library holds the routing, filtering and reporting logic. The host
//! supplies the transport, the job directory, the job queue and an
//! interpreter for remote calls.

pub mod branch_spec;
pub mod bridge;
pub mod config;
pub mod jobs;
pub mod safe_merge;
pub mod space;
pub mod status;
pub mod telemetry;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod test_utils;

pub use bridge::Bridge;
