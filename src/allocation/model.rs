//! Allocation data structures shared by the planner and the schedule applier

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::AllocationError;

/// A due category of a schedule line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Principal,
    Interest,
    Fees,
    Penalties,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Principal,
        Category::Interest,
        Category::Fees,
        Category::Penalties,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Principal => "principal",
            Category::Interest => "interest",
            Category::Fees => "fees",
            Category::Penalties => "penalties",
        }
    }

    /// Parse a comma separated category list such as `"fees,interest,principal"`
    pub fn parse_order(list: &str) -> Result<Vec<Category>, AllocationError> {
        let mut order = Vec::new();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let category = Category::from_str(name)?;
            if order.contains(&category) {
                return Err(AllocationError::DuplicateCategory(name.to_string()));
            }
            order.push(category);
        }
        if order.is_empty() {
            return Err(AllocationError::EmptyCustomOrder);
        }
        Ok(order)
    }

    pub fn format_order(order: &[Category]) -> String {
        order
            .iter()
            .map(Category::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl FromStr for Category {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "principal" => Ok(Category::Principal),
            "interest" => Ok(Category::Interest),
            "fees" | "fee" => Ok(Category::Fees),
            "penalties" | "penalty" => Ok(Category::Penalties),
            other => Err(AllocationError::UnknownCategory(other.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category visitation order inside a schedule line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "allocation_strategy", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    #[default]
    OldestDueFirst,
    PrincipalFirst,
    InterestFirst,
    FeesFirst,
    Custom,
}

/// penalties, interest, fees, principal
const DEFAULT_ORDER: [Category; 4] = [
    Category::Penalties,
    Category::Interest,
    Category::Fees,
    Category::Principal,
];

impl AllocationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStrategy::OldestDueFirst => "oldest_due_first",
            AllocationStrategy::PrincipalFirst => "principal_first",
            AllocationStrategy::InterestFirst => "interest_first",
            AllocationStrategy::FeesFirst => "fees_first",
            AllocationStrategy::Custom => "custom",
        }
    }

    /// Resolve the category order for this strategy.
    ///
    /// The `*_first` strategies promote one category to the front of the
    /// default order. `Custom` uses exactly the categories given.
    pub fn category_order(
        &self,
        custom: Option<&[Category]>,
    ) -> Result<Vec<Category>, AllocationError> {
        let promote = |first: Category| {
            let mut order = vec![first];
            order.extend(DEFAULT_ORDER.iter().copied().filter(|c| *c != first));
            order
        };

        match self {
            AllocationStrategy::OldestDueFirst => Ok(DEFAULT_ORDER.to_vec()),
            AllocationStrategy::PrincipalFirst => Ok(promote(Category::Principal)),
            AllocationStrategy::InterestFirst => Ok(promote(Category::Interest)),
            AllocationStrategy::FeesFirst => Ok(promote(Category::Fees)),
            AllocationStrategy::Custom => match custom {
                Some(order) if !order.is_empty() => Ok(order.to_vec()),
                Some(_) => Err(AllocationError::EmptyCustomOrder),
                None => Err(AllocationError::MissingCustomOrder),
            },
        }
    }
}

impl FromStr for AllocationStrategy {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oldest_due_first" => Ok(AllocationStrategy::OldestDueFirst),
            "principal_first" => Ok(AllocationStrategy::PrincipalFirst),
            "interest_first" => Ok(AllocationStrategy::InterestFirst),
            "fees_first" => Ok(AllocationStrategy::FeesFirst),
            "custom" => Ok(AllocationStrategy::Custom),
            other => Err(AllocationError::UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One amount per category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CategoryAmounts {
    #[serde(default)]
    pub principal: Decimal,
    #[serde(default)]
    pub interest: Decimal,
    #[serde(default)]
    pub fees: Decimal,
    #[serde(default)]
    pub penalties: Decimal,
}

impl CategoryAmounts {
    pub const ZERO: CategoryAmounts = CategoryAmounts {
        principal: Decimal::ZERO,
        interest: Decimal::ZERO,
        fees: Decimal::ZERO,
        penalties: Decimal::ZERO,
    };

    pub fn get(&self, category: Category) -> Decimal {
        match category {
            Category::Principal => self.principal,
            Category::Interest => self.interest,
            Category::Fees => self.fees,
            Category::Penalties => self.penalties,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut Decimal {
        match category {
            Category::Principal => &mut self.principal,
            Category::Interest => &mut self.interest,
            Category::Fees => &mut self.fees,
            Category::Penalties => &mut self.penalties,
        }
    }

    pub fn total(&self) -> Decimal {
        self.principal + self.interest + self.fees + self.penalties
    }

    pub fn is_zero(&self) -> bool {
        Category::ALL.iter().all(|c| self.get(*c).is_zero())
    }

    pub fn accumulate(&mut self, other: &CategoryAmounts) {
        for category in Category::ALL {
            *self.get_mut(category) += other.get(category);
        }
    }

    pub fn negated(&self) -> CategoryAmounts {
        CategoryAmounts {
            principal: -self.principal,
            interest: -self.interest,
            fees: -self.fees,
            penalties: -self.penalties,
        }
    }
}

/// The share of a payment assigned to one schedule period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub period: i32,
    #[serde(flatten)]
    pub amounts: CategoryAmounts,
}

/// Output of the allocation planner
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub lines: Vec<AllocationLine>,
    pub totals: CategoryAmounts,
    /// Part of the requested amount the schedule could not absorb
    pub unallocated: Decimal,
}

impl AllocationPlan {
    /// Rebuild a plan from persisted lines, recomputing the totals
    pub fn from_lines(lines: Vec<AllocationLine>, unallocated: Decimal) -> Self {
        let mut totals = CategoryAmounts::ZERO;
        for line in &lines {
            totals.accumulate(&line.amounts);
        }
        Self {
            lines,
            totals,
            unallocated,
        }
    }

    pub fn allocated_total(&self) -> Decimal {
        self.totals.total()
    }
}
