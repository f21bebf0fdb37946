//! Loan aggregate updates
//!
//! `total_paid`, `outstanding` and the status of a loan only change here.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::money::floor_zero;

use super::model::{Loan, LoanStatus};

/// Result of applying a paid delta to a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregateChange {
    pub previous_status: LoanStatus,
    pub status: LoanStatus,
    pub total_paid: Decimal,
    pub outstanding: Decimal,
}

impl AggregateChange {
    pub fn transitioned(&self) -> bool {
        self.previous_status != self.status
    }
}

impl Loan {
    /// Balance still owed. Derived when not tracked explicitly.
    pub fn outstanding_balance(&self) -> Decimal {
        match self.outstanding {
            Some(outstanding) => floor_zero(outstanding),
            None => floor_zero(self.principal + self.interest - self.total_paid),
        }
    }

    /// Apply a signed paid delta and run the status transitions.
    ///
    /// - nothing left owed closes the loan unless it is already terminal
    /// - the first positive payment activates it unless it is terminal
    /// - a reversal that reopens a balance on a closed loan makes it active
    pub fn apply_paid_delta(&mut self, delta: Decimal) -> AggregateChange {
        let previous_status = self.status;
        let previous_paid = self.total_paid;

        self.total_paid = floor_zero(self.total_paid + delta);
        if let Some(outstanding) = self.outstanding {
            self.outstanding = Some(floor_zero(outstanding - delta));
        }
        let outstanding = self.outstanding_balance();

        if outstanding.is_zero() && !self.status.is_terminal() {
            self.status = LoanStatus::Closed;
        } else if previous_paid.is_zero() && delta > Decimal::ZERO && !self.status.is_terminal() {
            self.status = LoanStatus::Active;
        } else if delta < Decimal::ZERO
            && self.status == LoanStatus::Closed
            && outstanding > Decimal::ZERO
        {
            self.status = LoanStatus::Active;
        }

        AggregateChange {
            previous_status,
            status: self.status,
            total_paid: self.total_paid,
            outstanding,
        }
    }
}
