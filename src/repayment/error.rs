//! Repayment engine errors

use thiserror::Error;

use crate::allocation::AllocationError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Errors raised by repayment operations.
///
/// Any of these aborts the surrounding transaction.
#[derive(Error, Debug)]
pub enum RepaymentError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Unresolved reference: {0}")]
    Referential(String),

    /// Holds the violated constraint name when the database reports one
    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Invalid signature: {0}")]
    Signature(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl RepaymentError {
    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        RepaymentError::NotFound(format!("{} {}", what, id))
    }

    /// True when the error is a unique violation of the given constraint
    pub fn is_constraint(&self, name: &str) -> bool {
        matches!(self, RepaymentError::Constraint(c) if c == name)
    }
}

impl From<sqlx::Error> for RepaymentError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepaymentError::NotFound("record".to_string()),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => RepaymentError::Constraint(
                    db_err
                        .constraint()
                        .map(str::to_string)
                        .unwrap_or_else(|| db_err.message().to_string()),
                ),
                Some(FOREIGN_KEY_VIOLATION) => {
                    RepaymentError::Referential(db_err.message().to_string())
                }
                Some(LOCK_NOT_AVAILABLE) => RepaymentError::StateConflict(
                    "record is locked by another operation, retry".to_string(),
                ),
                _ => RepaymentError::Database(err.to_string()),
            },
            _ => RepaymentError::Database(err.to_string()),
        }
    }
}

impl From<AllocationError> for RepaymentError {
    fn from(err: AllocationError) -> Self {
        RepaymentError::Validation(err.to_string())
    }
}

impl From<validator::ValidationErrors> for RepaymentError {
    fn from(err: validator::ValidationErrors) -> Self {
        RepaymentError::Validation(err.to_string())
    }
}
