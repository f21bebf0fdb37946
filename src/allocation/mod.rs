//! Allocation domain module
//!
//! Contains the category model and the waterfall planner.

mod error;
mod model;
mod planner;

pub use error::AllocationError;
pub use model::*;
pub use planner::{line_remaining, plan_allocation, LineRemaining, PlanRequest};
