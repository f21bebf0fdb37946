//! Post-commit collaborators
//!
//! Borrower notification and the savings deposit mirror run after a
//! repayment is committed. They are best-effort: failures are logged and
//! never undo or fail the repayment.

use axum::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::loan::Borrower;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Borrower has no contact channel")]
    NoChannel,
}

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Savings reference already used: {0}")]
    DuplicateReference(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for MirrorError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                return MirrorError::DuplicateReference(db_err.message().to_string());
            }
        }
        MirrorError::Database(err.to_string())
    }
}

/// Tells a borrower that a repayment was received
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        borrower: &Borrower,
        amount: Decimal,
        loan_reference: &str,
        method: &str,
    ) -> Result<(), NotifyError>;
}

/// Records a repayment as a deposit in the borrower's savings ledger
#[async_trait]
pub trait SavingsMirror: Send + Sync {
    async fn record_deposit(
        &self,
        borrower_id: Uuid,
        amount: Decimal,
        date: NaiveDate,
        reference: &str,
    ) -> Result<(), MirrorError>;
}

/// Notifier that only emits a structured log line
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(
        &self,
        borrower: &Borrower,
        amount: Decimal,
        loan_reference: &str,
        method: &str,
    ) -> Result<(), NotifyError> {
        let channel = borrower
            .phone
            .as_deref()
            .or(borrower.email.as_deref())
            .ok_or(NotifyError::NoChannel)?;

        tracing::info!(
            borrower_id = %borrower.id,
            channel = %channel,
            amount = %amount,
            loan_reference = %loan_reference,
            method = %method,
            "Repayment notification sent"
        );
        Ok(())
    }
}

/// Savings mirror writing to the `savings_transactions` table
#[derive(Clone)]
pub struct PgSavingsMirror {
    db_pool: PgPool,
}

impl PgSavingsMirror {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SavingsMirror for PgSavingsMirror {
    async fn record_deposit(
        &self,
        borrower_id: Uuid,
        amount: Decimal,
        date: NaiveDate,
        reference: &str,
    ) -> Result<(), MirrorError> {
        sqlx::query(
            r#"
            INSERT INTO savings_transactions (id, borrower_id, kind, amount, txn_date, reference, created_at)
            VALUES ($1, $2, 'deposit', $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(borrower_id)
        .bind(amount)
        .bind(date)
        .bind(reference)
        .bind(Utc::now())
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }
}

/// Mirror a deposit, retrying once with a suffixed reference on a collision
pub async fn mirror_deposit(
    mirror: &dyn SavingsMirror,
    borrower_id: Uuid,
    amount: Decimal,
    date: NaiveDate,
    reference: &str,
) -> Result<(), MirrorError> {
    match mirror
        .record_deposit(borrower_id, amount, date, reference)
        .await
    {
        Err(MirrorError::DuplicateReference(_)) => {
            let suffix = Uuid::new_v4().simple().to_string();
            let retried = format!("{}-{}", reference, &suffix[..6]);
            tracing::debug!(
                reference = %reference,
                retried = %retried,
                "Savings reference collision, retrying"
            );
            mirror
                .record_deposit(borrower_id, amount, date, &retried)
                .await
        }
        other => other,
    }
}
