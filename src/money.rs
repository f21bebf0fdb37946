//! Money helpers
//!
//! Amounts are `rust_decimal::Decimal` carried at two decimal places, the
//! scale of the `NUMERIC(18, 2)` columns they are stored in.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places of every persisted amount
pub const MONEY_SCALE: u32 = 2;

/// round to the money scale, half away from zero
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// truncate to the money scale, toward zero
pub fn truncate_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToZero)
}

/// clamp negative amounts to zero
pub fn floor_zero(amount: Decimal) -> Decimal {
    amount.max(Decimal::ZERO)
}

/// true when the amount carries more precision than the money scale
pub fn exceeds_scale(amount: Decimal) -> bool {
    amount.normalize().scale() > MONEY_SCALE
}
