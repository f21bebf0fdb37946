//! Loan and borrower models
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Loan status enum
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    Approved,
    Active,
    Closed,
    Rejected,
    WrittenOff,
}

impl LoanStatus {
    /// Statuses a full repayment does not move to `closed`
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanStatus::Closed | LoanStatus::Rejected | LoanStatus::WrittenOff
        )
    }

    /// Only disbursed loans take payments
    pub fn accepts_repayments(&self) -> bool {
        matches!(self, LoanStatus::Approved | LoanStatus::Active)
    }
}

/// Loan model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Loan {
    pub id: Uuid,
    pub borrower_id: Uuid,
    /// External reference quoted by borrowers and gateways
    pub reference: String,
    pub principal: Decimal,
    pub interest: Decimal,
    pub currency: String,
    pub total_paid: Decimal,
    /// `None` when the balance is derived from principal, interest and payments
    pub outstanding: Option<Decimal>,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Borrower contact details, read for notifications and the savings mirror
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Borrower {
    pub id: Uuid,
    pub full_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}
