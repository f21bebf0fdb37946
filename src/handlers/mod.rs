//! API handlers

mod gateway;
mod loan;
mod repayment;

pub use gateway::gateway_callback;
pub use loan::get_loan_schedule;
pub use repayment::*;
