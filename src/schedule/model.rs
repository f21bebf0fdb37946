//! Amortization schedule lines

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::allocation::{Category, CategoryAmounts};
use crate::money::floor_zero;

/// Schedule line status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "schedule_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Upcoming,
    Overdue,
    Paid,
}

/// One period of a loan's amortization schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ScheduleLine {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub period: i32,
    pub due_date: NaiveDate,
    pub principal_due: Decimal,
    pub interest_due: Decimal,
    pub fees_due: Decimal,
    pub penalties_due: Decimal,
    pub principal_paid: Decimal,
    pub interest_paid: Decimal,
    pub fees_paid: Decimal,
    pub penalties_paid: Decimal,
    pub paid: Decimal,
    pub total: Decimal,
    pub status: ScheduleStatus,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleLine {
    pub fn due(&self) -> CategoryAmounts {
        CategoryAmounts {
            principal: self.principal_due,
            interest: self.interest_due,
            fees: self.fees_due,
            penalties: self.penalties_due,
        }
    }

    pub fn paid_amounts(&self) -> CategoryAmounts {
        CategoryAmounts {
            principal: self.principal_paid,
            interest: self.interest_paid,
            fees: self.fees_paid,
            penalties: self.penalties_paid,
        }
    }

    pub fn set_paid(&mut self, category: Category, amount: Decimal) {
        match category {
            Category::Principal => self.principal_paid = amount,
            Category::Interest => self.interest_paid = amount,
            Category::Fees => self.fees_paid = amount,
            Category::Penalties => self.penalties_paid = amount,
        }
    }

    pub fn add_due(&mut self, category: Category, amount: Decimal) {
        match category {
            Category::Principal => self.principal_due += amount,
            Category::Interest => self.interest_due += amount,
            Category::Fees => self.fees_due += amount,
            Category::Penalties => self.penalties_due += amount,
        }
    }

    /// `due - paid` per category, floored at zero
    pub fn decomposed_remaining(&self) -> CategoryAmounts {
        let due = self.due();
        let paid = self.paid_amounts();
        let mut remaining = CategoryAmounts::ZERO;
        for category in Category::ALL {
            *remaining.get_mut(category) = floor_zero(due.get(category) - paid.get(category));
        }
        remaining
    }

    /// `total - paid`, floored at zero
    pub fn aggregate_remaining(&self) -> Decimal {
        floor_zero(self.total - self.paid)
    }

    /// Recompute the status from the paid aggregate and the as-of date
    pub fn refresh_status(&mut self, as_of: NaiveDate, epsilon: Decimal) {
        self.status = if self.paid >= self.total - epsilon {
            ScheduleStatus::Paid
        } else if self.due_date < as_of {
            ScheduleStatus::Overdue
        } else {
            ScheduleStatus::Upcoming
        };
    }
}
