//! Schedule persistence

use chrono::Utc;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use super::model::ScheduleLine;

/// All lines of a loan, oldest due first
pub async fn list_for_loan<'e, E>(
    executor: E,
    loan_id: Uuid,
) -> Result<Vec<ScheduleLine>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, ScheduleLine>(
        r#"
        SELECT * FROM loan_schedule
        WHERE loan_id = $1
        ORDER BY due_date ASC, period ASC
        "#,
    )
    .bind(loan_id)
    .fetch_all(executor)
    .await
}

/// Read one line and hold its row lock until the transaction ends
pub async fn lock_line(
    conn: &mut PgConnection,
    loan_id: Uuid,
    period: i32,
) -> Result<ScheduleLine, sqlx::Error> {
    sqlx::query_as::<_, ScheduleLine>(
        "SELECT * FROM loan_schedule WHERE loan_id = $1 AND period = $2 FOR UPDATE",
    )
    .bind(loan_id)
    .bind(period)
    .fetch_one(conn)
    .await
}

/// Persist the due, paid and status columns of a line
pub async fn update_line(conn: &mut PgConnection, line: &ScheduleLine) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE loan_schedule
        SET principal_due = $1, interest_due = $2, fees_due = $3, penalties_due = $4,
            principal_paid = $5, interest_paid = $6, fees_paid = $7, penalties_paid = $8,
            paid = $9, status = $10, updated_at = $11
        WHERE id = $12
        "#,
    )
    .bind(line.principal_due)
    .bind(line.interest_due)
    .bind(line.fees_due)
    .bind(line.penalties_due)
    .bind(line.principal_paid)
    .bind(line.interest_paid)
    .bind(line.fees_paid)
    .bind(line.penalties_paid)
    .bind(line.paid)
    .bind(line.status)
    .bind(Utc::now())
    .bind(line.id)
    .execute(conn)
    .await?;

    Ok(())
}
