//! Amortization schedule module
//!
//! Schedule lines, their persistence, and the applier that writes
//! allocations onto them.

mod applier;
mod model;
pub mod repo;

pub use applier::{apply_allocation, apply_line, ApplyContext, Direction};
pub use model::{ScheduleLine, ScheduleStatus};

#[cfg(test)]
pub(crate) use model::fixtures;
