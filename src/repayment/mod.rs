//! Repayment module
//!
//! Recording, approval, rejection and reversal of loan repayments.

mod error;
mod model;
pub mod repo;
mod service;

pub use error::RepaymentError;
pub use model::*;
pub use service::{IngestOutcome, RepaymentService};
