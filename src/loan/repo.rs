//! Loan persistence

use chrono::Utc;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use super::model::{Borrower, Loan};

pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Loan>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub async fn find_by_reference<'e, E>(
    executor: E,
    reference: &str,
) -> Result<Option<Loan>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE reference = $1")
        .bind(reference)
        .fetch_optional(executor)
        .await
}

/// Read a loan and hold its row lock until the transaction ends.
///
/// Concurrent repayments against the same loan queue up here.
pub async fn lock_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Loan, sqlx::Error> {
    sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_one(conn)
        .await
}

/// Persist `total_paid`, `outstanding` and `status`
pub async fn update_aggregate(conn: &mut PgConnection, loan: &Loan) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE loans
        SET total_paid = $1, outstanding = $2, status = $3, updated_at = $4
        WHERE id = $5
        "#,
    )
    .bind(loan.total_paid)
    .bind(loan.outstanding)
    .bind(loan.status)
    .bind(Utc::now())
    .bind(loan.id)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn find_borrower<'e, E>(executor: E, id: Uuid) -> Result<Option<Borrower>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Borrower>("SELECT id, full_name, phone, email FROM borrowers WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}
