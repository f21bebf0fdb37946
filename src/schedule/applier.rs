//! Schedule applier
//!
//! Writes an allocation onto schedule lines (`Direction::Apply`) or takes it
//! back off (`Direction::Reverse`). Every category delta is capped: by the
//! remaining due when applying and by the amount already paid when
//! reversing, so a reversal of an applied allocation restores the line.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::allocation::{line_remaining, AllocationLine, AllocationPlan, Category, CategoryAmounts};
use crate::money::floor_zero;

use super::model::ScheduleLine;
use super::repo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Apply,
    Reverse,
}

impl Direction {
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Apply => Decimal::ONE,
            Direction::Reverse => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Inputs shared by every line of one application
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext {
    pub as_of: NaiveDate,
    pub epsilon: Decimal,
    /// Set when the legacy fallback is enabled, see [`line_remaining`]
    pub legacy_interest_hint: Option<Decimal>,
}

/// Give a legacy line real category dues the first time it is paid into.
///
/// Returns true when the line was changed.
fn backfill_legacy_dues(line: &mut ScheduleLine, hint: Option<Decimal>) -> bool {
    let remaining = line_remaining(line, hint);
    if !remaining.derived {
        return false;
    }
    for category in Category::ALL {
        line.add_due(category, remaining.amounts.get(category));
    }
    true
}

/// Apply one allocation line to a schedule line in memory.
///
/// Returns the signed deltas actually written per category.
pub fn apply_line(
    line: &mut ScheduleLine,
    requested: &CategoryAmounts,
    direction: Direction,
    ctx: &ApplyContext,
) -> CategoryAmounts {
    if direction == Direction::Apply && backfill_legacy_dues(line, ctx.legacy_interest_hint) {
        tracing::warn!(
            loan_id = %line.loan_id,
            period = line.period,
            "Backfilled category dues on legacy schedule line"
        );
    }

    let due = line.due();
    let paid = line.paid_amounts();
    let sign = direction.sign();
    let mut deltas = CategoryAmounts::ZERO;

    for category in Category::ALL {
        let cap = match direction {
            Direction::Apply => floor_zero(due.get(category) - paid.get(category)),
            Direction::Reverse => floor_zero(paid.get(category)),
        };
        let magnitude = requested.get(category).abs().min(cap);
        let delta = sign * magnitude;
        line.set_paid(category, paid.get(category) + delta);
        *deltas.get_mut(category) = delta;
    }

    line.paid = (line.paid + deltas.total()).max(Decimal::ZERO).min(line.total);
    line.refresh_status(ctx.as_of, ctx.epsilon);

    deltas
}

/// Apply an allocation to the locked schedule lines of a loan.
///
/// Must run inside the caller's transaction. Each touched line is locked
/// with `FOR UPDATE` before it is changed. The returned plan holds the
/// magnitudes actually applied or reversed.
pub async fn apply_allocation(
    conn: &mut PgConnection,
    loan_id: Uuid,
    allocation: &[AllocationLine],
    direction: Direction,
    ctx: &ApplyContext,
) -> Result<AllocationPlan, sqlx::Error> {
    let mut effective = Vec::with_capacity(allocation.len());

    for requested in allocation {
        let mut line = repo::lock_line(&mut *conn, loan_id, requested.period).await?;
        let deltas = apply_line(&mut line, &requested.amounts, direction, ctx);
        repo::update_line(&mut *conn, &line).await?;

        let magnitudes = match direction {
            Direction::Apply => deltas,
            Direction::Reverse => deltas.negated(),
        };
        if magnitudes != requested.amounts {
            tracing::warn!(
                loan_id = %loan_id,
                period = requested.period,
                direction = ?direction,
                "Schedule line capped the requested allocation"
            );
        }
        if !magnitudes.is_zero() {
            effective.push(AllocationLine {
                period: requested.period,
                amounts: magnitudes,
            });
        }
    }

    Ok(AllocationPlan::from_lines(effective, Decimal::ZERO))
}
