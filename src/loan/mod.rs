//! Loan domain module
//!
//! Loan and borrower models, persistence, and the aggregate updater.

mod aggregate;
mod model;
pub mod repo;

pub use aggregate::AggregateChange;
pub use model::{Borrower, Loan, LoanStatus};
