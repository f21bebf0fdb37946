//! Repayment persistence

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::allocation::AllocationLine;

use super::model::{NewRepayment, Repayment, RepaymentStatus};

/// Unique index guarding the gateway idempotency key
pub const GATEWAY_REF_INDEX: &str = "idx_repayments_gateway_ref";

pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Repayment>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Repayment>("SELECT * FROM repayments WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Read a repayment and hold its row lock until the transaction ends
pub async fn lock_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Repayment, sqlx::Error> {
    sqlx::query_as::<_, Repayment>("SELECT * FROM repayments WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_one(conn)
        .await
}

/// Id of the repayment already recorded for a gateway delivery, if any
pub async fn find_by_gateway_ref<'e, E>(
    executor: E,
    gateway: &str,
    gateway_ref: &str,
) -> Result<Option<Uuid>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, (Uuid,)>(
        "SELECT id FROM repayments WHERE gateway = $1 AND gateway_ref = $2",
    )
    .bind(gateway)
    .bind(gateway_ref)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|(id,)| id))
}

pub async fn list_for_loan<'e, E>(
    executor: E,
    loan_id: Uuid,
) -> Result<Vec<Repayment>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Repayment>(
        "SELECT * FROM repayments WHERE loan_id = $1 ORDER BY paid_on DESC, created_at DESC",
    )
    .bind(loan_id)
    .fetch_all(executor)
    .await
}

pub async fn insert<'e, E>(executor: E, new: &NewRepayment) -> Result<Repayment, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let now = Utc::now();
    let approved_at = new.approved_by.as_ref().map(|_| now);

    sqlx::query_as::<_, Repayment>(
        r#"
        INSERT INTO repayments (
            id, loan_id, amount, paid_on, method, status, applied,
            allocation, allocated_total, unallocated, strategy, custom_order,
            waive_penalties, gateway, gateway_ref, reference, receipt_no,
            created_by, approved_by, approved_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
        RETURNING *
        "#,
    )
    .bind(new.id)
    .bind(new.loan_id)
    .bind(new.amount)
    .bind(new.paid_on)
    .bind(&new.method)
    .bind(new.status)
    .bind(new.applied)
    .bind(new.allocation.as_ref().map(Json))
    .bind(new.allocated_total)
    .bind(new.unallocated)
    .bind(new.strategy)
    .bind(&new.custom_order)
    .bind(new.waive_penalties)
    .bind(&new.gateway)
    .bind(&new.gateway_ref)
    .bind(&new.reference)
    .bind(&new.receipt_no)
    .bind(&new.created_by)
    .bind(&new.approved_by)
    .bind(approved_at)
    .bind(now)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub async fn mark_approved(
    conn: &mut PgConnection,
    id: Uuid,
    allocation: &[AllocationLine],
    allocated_total: Decimal,
    unallocated: Decimal,
    receipt_no: &str,
    approved_by: &str,
) -> Result<Repayment, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Repayment>(
        r#"
        UPDATE repayments
        SET status = $1, applied = TRUE, allocation = $2, allocated_total = $3,
            unallocated = $4, receipt_no = $5, approved_by = $6, approved_at = $7,
            updated_at = $7
        WHERE id = $8
        RETURNING *
        "#,
    )
    .bind(RepaymentStatus::Approved)
    .bind(Json(allocation))
    .bind(allocated_total)
    .bind(unallocated)
    .bind(receipt_no)
    .bind(approved_by)
    .bind(now)
    .bind(id)
    .fetch_one(conn)
    .await
}

pub async fn mark_rejected(
    conn: &mut PgConnection,
    id: Uuid,
    reason: Option<&str>,
) -> Result<Repayment, sqlx::Error> {
    sqlx::query_as::<_, Repayment>(
        r#"
        UPDATE repayments
        SET status = $1, rejected_reason = $2, updated_at = $3
        WHERE id = $4
        RETURNING *
        "#,
    )
    .bind(RepaymentStatus::Rejected)
    .bind(reason)
    .bind(Utc::now())
    .bind(id)
    .fetch_one(conn)
    .await
}

/// Mark voided. The stored allocation is kept for the audit trail.
pub async fn mark_voided(
    conn: &mut PgConnection,
    id: Uuid,
    voided_by: &str,
    reason: Option<&str>,
) -> Result<Repayment, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Repayment>(
        r#"
        UPDATE repayments
        SET status = $1, applied = FALSE, voided_by = $2, voided_at = $3,
            void_reason = $4, updated_at = $3
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(RepaymentStatus::Voided)
    .bind(voided_by)
    .bind(now)
    .bind(reason)
    .bind(id)
    .fetch_one(conn)
    .await
}
