//! Waterfall allocation of a payment over a loan's schedule
//!
//! The planner is pure: it reads schedule lines and returns an
//! [`AllocationPlan`] without touching storage. Lines are always visited by
//! due date, then period; the strategy only changes the category order
//! inside a line.

use rust_decimal::Decimal;

use crate::money::{floor_zero, round_money, truncate_money};
use crate::schedule::ScheduleLine;

use super::error::AllocationError;
use super::model::{AllocationLine, AllocationPlan, AllocationStrategy, Category, CategoryAmounts};

/// Everything the planner needs besides the schedule
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub amount: Decimal,
    pub strategy: AllocationStrategy,
    pub custom_order: Option<Vec<Category>>,
    pub waive_penalties: bool,
    /// Interest attributed to a legacy line that only carries `total`.
    /// `None` disables the legacy fallback.
    pub legacy_interest_hint: Option<Decimal>,
}

impl PlanRequest {
    pub fn new(amount: Decimal, strategy: AllocationStrategy) -> Self {
        Self {
            amount,
            strategy,
            custom_order: None,
            waive_penalties: false,
            legacy_interest_hint: None,
        }
    }

    pub fn with_custom_order(mut self, order: Vec<Category>) -> Self {
        self.custom_order = Some(order);
        self
    }

    pub fn waiving_penalties(mut self, waive: bool) -> Self {
        self.waive_penalties = waive;
        self
    }

    pub fn with_legacy_hint(mut self, hint: Option<Decimal>) -> Self {
        self.legacy_interest_hint = hint;
        self
    }

    /// Category order after the penalty waiver is applied
    pub fn category_order(&self) -> Result<Vec<Category>, AllocationError> {
        let mut order = self.strategy.category_order(self.custom_order.as_deref())?;
        if self.waive_penalties {
            order.retain(|c| *c != Category::Penalties);
        }
        Ok(order)
    }
}

/// Remaining due of one line as the planner sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRemaining {
    pub amounts: CategoryAmounts,
    /// The amounts were derived by the legacy fallback
    pub derived: bool,
}

/// Remaining due per category of a line.
///
/// Rows whose decomposed dues are exhausted while `total - paid` is still
/// positive fall back to an interest-then-principal split when a hint is
/// given. Decomposed remainders above the aggregate remainder are scaled
/// down to it.
pub fn line_remaining(line: &ScheduleLine, legacy_interest_hint: Option<Decimal>) -> LineRemaining {
    let aggregate = line.aggregate_remaining();
    let decomposed = line.decomposed_remaining();
    let sum = decomposed.total();

    if sum.is_zero() {
        if let (true, Some(hint)) = (aggregate > Decimal::ZERO, legacy_interest_hint) {
            let interest = round_money(aggregate.min(floor_zero(hint)));
            return LineRemaining {
                amounts: CategoryAmounts {
                    interest,
                    principal: aggregate - interest,
                    ..CategoryAmounts::ZERO
                },
                derived: true,
            };
        }
        return LineRemaining {
            amounts: CategoryAmounts::ZERO,
            derived: false,
        };
    }

    if sum > aggregate {
        return LineRemaining {
            amounts: scale_to(decomposed, aggregate),
            derived: false,
        };
    }

    LineRemaining {
        amounts: decomposed,
        derived: false,
    }
}

/// Scale every category proportionally so the amounts sum exactly to `target`.
///
/// Shares are truncated to cents, so no category exceeds its own amount. The
/// residue then goes to the largest shares first, each capped by its headroom.
fn scale_to(amounts: CategoryAmounts, target: Decimal) -> CategoryAmounts {
    let sum = amounts.total();
    if target <= Decimal::ZERO || sum.is_zero() {
        return CategoryAmounts::ZERO;
    }

    let mut scaled = CategoryAmounts::ZERO;
    for category in Category::ALL {
        *scaled.get_mut(category) = truncate_money(amounts.get(category) * target / sum);
    }

    let mut by_size = Category::ALL;
    // stable: ties keep declaration order
    by_size.sort_by(|a, b| scaled.get(*b).cmp(&scaled.get(*a)));

    let mut residue = target - scaled.total();
    for category in by_size {
        if residue <= Decimal::ZERO {
            break;
        }
        let headroom = floor_zero(amounts.get(category) - scaled.get(category));
        let top_up = residue.min(headroom);
        *scaled.get_mut(category) += top_up;
        residue -= top_up;
    }
    scaled
}

/// Distribute `request.amount` over the schedule.
///
/// Each category takes `min(remaining, left)` rounded to cents, oldest line
/// first, until the amount or the schedule is exhausted. What the schedule
/// cannot absorb is returned as `unallocated`.
pub fn plan_allocation(
    schedule: &[ScheduleLine],
    request: &PlanRequest,
) -> Result<AllocationPlan, AllocationError> {
    let amount = round_money(request.amount);
    if amount <= Decimal::ZERO {
        return Err(AllocationError::NonPositiveAmount);
    }
    let order = request.category_order()?;

    let mut lines: Vec<&ScheduleLine> = schedule.iter().collect();
    lines.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.period.cmp(&b.period)));

    let mut left = amount;
    let mut plan = AllocationPlan::default();

    for line in lines {
        if left <= Decimal::ZERO {
            break;
        }

        let remaining = line_remaining(line, request.legacy_interest_hint).amounts;
        let mut share = CategoryAmounts::ZERO;

        for category in &order {
            let take = round_money(remaining.get(*category).min(left));
            if take <= Decimal::ZERO {
                continue;
            }
            left -= take;
            *share.get_mut(*category) += take;
            if left <= Decimal::ZERO {
                break;
            }
        }

        if !share.is_zero() {
            plan.totals.accumulate(&share);
            plan.lines.push(AllocationLine {
                period: line.period,
                amounts: share,
            });
        }
    }

    plan.unallocated = floor_zero(left);

    tracing::debug!(
        requested = %amount,
        allocated = %plan.allocated_total(),
        unallocated = %plan.unallocated,
        periods = plan.lines.len(),
        strategy = %request.strategy,
        "Allocation planned"
    );

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::fixtures::line;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn date(m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, 1).unwrap()
    }

    fn due(principal: Decimal, interest: Decimal) -> CategoryAmounts {
        CategoryAmounts {
            principal,
            interest,
            ..CategoryAmounts::ZERO
        }
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let schedule = vec![line(1, date(1), due(dec!(100), dec!(10)))];
        let request = PlanRequest::new(Decimal::ZERO, AllocationStrategy::OldestDueFirst);
        assert_eq!(
            plan_allocation(&schedule, &request),
            Err(AllocationError::NonPositiveAmount)
        );
    }

    #[test]
    fn test_lines_visited_by_due_date_then_period() {
        // stored out of order on purpose
        let schedule = vec![
            line(3, date(3), due(dec!(50), Decimal::ZERO)),
            line(2, date(1), due(dec!(50), Decimal::ZERO)),
            line(1, date(1), due(dec!(50), Decimal::ZERO)),
        ];
        let request = PlanRequest::new(dec!(75), AllocationStrategy::PrincipalFirst);
        let plan = plan_allocation(&schedule, &request).unwrap();

        let periods: Vec<i32> = plan.lines.iter().map(|l| l.period).collect();
        assert_eq!(periods, vec![1, 2]);
        assert_eq!(plan.lines[1].amounts.principal, dec!(25));
    }

    #[test]
    fn test_excess_is_reported_unallocated() {
        let schedule = vec![line(1, date(1), due(dec!(100), dec!(10)))];
        let request = PlanRequest::new(dec!(125.50), AllocationStrategy::OldestDueFirst);
        let plan = plan_allocation(&schedule, &request).unwrap();

        assert_eq!(plan.allocated_total(), dec!(110));
        assert_eq!(plan.unallocated, dec!(15.50));
    }

    #[test]
    fn test_waived_penalties_are_skipped() {
        let schedule = vec![line(
            1,
            date(1),
            CategoryAmounts {
                principal: dec!(100),
                penalties: dec!(20),
                ..CategoryAmounts::ZERO
            },
        )];
        let request =
            PlanRequest::new(dec!(50), AllocationStrategy::OldestDueFirst).waiving_penalties(true);
        let plan = plan_allocation(&schedule, &request).unwrap();

        assert_eq!(plan.totals.penalties, Decimal::ZERO);
        assert_eq!(plan.totals.principal, dec!(50));
    }

    #[test]
    fn test_drift_guard_scales_to_aggregate_remaining() {
        let mut l = line(1, date(1), due(dec!(90), dec!(10)));
        // aggregate says only 50 is left although categories say 100
        l.paid = dec!(50);
        let remaining = line_remaining(&l, None);

        assert_eq!(remaining.amounts.total(), dec!(50));
        assert_eq!(remaining.amounts.principal, dec!(45));
        assert_eq!(remaining.amounts.interest, dec!(5));
    }

    #[test]
    fn test_drift_guard_rounding_residue_lands_on_largest() {
        let mut l = line(
            1,
            date(1),
            CategoryAmounts {
                principal: dec!(1),
                interest: dec!(1),
                fees: dec!(1),
                ..CategoryAmounts::ZERO
            },
        );
        l.total = dec!(3);
        l.paid = dec!(2);
        let remaining = line_remaining(&l, None).amounts;
        assert_eq!(remaining.total(), dec!(1));
        assert_eq!(remaining.principal, dec!(0.34));
        assert_eq!(remaining.interest, dec!(0.33));
        assert_eq!(remaining.fees, dec!(0.33));
    }

    #[test]
    fn test_drift_guard_never_fills_a_category_with_nothing_due() {
        let mut l = line(
            1,
            date(1),
            CategoryAmounts {
                principal: dec!(0.01),
                interest: dec!(0.01),
                fees: dec!(0.01),
                ..CategoryAmounts::ZERO
            },
        );
        l.total = dec!(0.03);
        l.paid = dec!(0.02);
        let remaining = line_remaining(&l, None).amounts;

        assert_eq!(remaining.total(), dec!(0.01));
        assert_eq!(remaining.penalties, Decimal::ZERO);
        assert_eq!(remaining.principal, dec!(0.01));
    }

    #[test]
    fn test_drift_guard_respects_category_dues() {
        let dues = CategoryAmounts {
            principal: dec!(0.05),
            interest: dec!(0.02),
            fees: dec!(0.01),
            penalties: dec!(0.03),
        };
        let mut target = dec!(0.01);
        while target < dues.total() {
            let mut l = line(1, date(1), dues);
            l.paid = dues.total() - target;
            let remaining = line_remaining(&l, None).amounts;

            assert_eq!(remaining.total(), target);
            for category in Category::ALL {
                assert!(remaining.get(category) >= Decimal::ZERO);
                assert!(remaining.get(category) <= dues.get(category));
            }
            target += dec!(0.01);
        }
    }

    #[test]
    fn test_drifted_line_with_waived_penalties_plans_no_penalties() {
        let mut l = line(
            1,
            date(1),
            CategoryAmounts {
                principal: dec!(0.01),
                interest: dec!(0.01),
                fees: dec!(0.01),
                ..CategoryAmounts::ZERO
            },
        );
        l.total = dec!(0.03);
        l.paid = dec!(0.02);
        let request = PlanRequest::new(dec!(0.01), AllocationStrategy::OldestDueFirst)
            .waiving_penalties(true);
        let plan = plan_allocation(&[l], &request).unwrap();

        assert_eq!(plan.totals.penalties, Decimal::ZERO);
        assert_eq!(plan.allocated_total(), dec!(0.01));
        assert_eq!(plan.unallocated, Decimal::ZERO);
    }

    #[test]
    fn test_legacy_fallback_attributes_interest_first() {
        let mut l = line(1, date(1), CategoryAmounts::ZERO);
        l.total = dec!(110);

        let disabled = line_remaining(&l, None);
        assert!(disabled.amounts.is_zero());

        let remaining = line_remaining(&l, Some(dec!(10)));
        assert!(remaining.derived);
        assert_eq!(remaining.amounts.interest, dec!(10));
        assert_eq!(remaining.amounts.principal, dec!(100));
    }

    #[test]
    fn test_allocations_are_rounded_to_cents() {
        let schedule = vec![line(1, date(1), due(dec!(100), Decimal::ZERO))];
        let request = PlanRequest::new(dec!(33.333), AllocationStrategy::OldestDueFirst);
        let plan = plan_allocation(&schedule, &request).unwrap();
        assert_eq!(plan.totals.principal, dec!(33.33));
        assert_eq!(plan.unallocated, Decimal::ZERO);
    }
}
