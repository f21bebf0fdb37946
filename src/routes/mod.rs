//! Route definitions for the repayment API

mod gateway;
mod loan;
mod repayment;

pub use gateway::gateway_routes;
pub use loan::loan_routes;
pub use repayment::repayment_routes;
