//! Safe merge: SpaceCode drives builds of a speculative merge and polls or
//! cancels them through prefixed build identifiers.

mod build_ref;
mod controller;
mod representation;

pub use build_ref::{BuildRef, BuildRefError};
pub use controller::{
    BuildCommand, SafeMergeCommand, SafeMergeController, SafeMergeError, StartCommand,
};
pub use representation::{BuildRepresentation, QueuedBuild, RunningBuild};
