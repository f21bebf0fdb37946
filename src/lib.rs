//! Microlend repayment engine
//!
//! Allocates borrower payments over a loan's amortization schedule, keeps
//! the loan aggregate in step and ingests payments pushed by gateways.

pub mod allocation;
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod loan;
pub mod middleware;
pub mod models;
pub mod money;
pub mod repayment;
pub mod routes;
pub mod schedule;
pub mod side_effects;
pub mod state;
