//! Repayment records, request and response contracts

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::allocation::{AllocationLine, AllocationPlan, AllocationStrategy, CategoryAmounts};
use crate::loan::LoanStatus;
use crate::money::exceeds_scale;

/// Repayment status
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "repayment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RepaymentStatus {
    Pending,
    Approved,
    Rejected,
    Voided,
}

impl RepaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepaymentStatus::Pending => "pending",
            RepaymentStatus::Approved => "approved",
            RepaymentStatus::Rejected => "rejected",
            RepaymentStatus::Voided => "voided",
        }
    }

    /// pending -> approved | rejected | voided, approved -> voided
    pub fn can_transition_to(&self, next: RepaymentStatus) -> bool {
        use RepaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Pending, Voided) | (Approved, Voided)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RepaymentStatus::Rejected | RepaymentStatus::Voided)
    }
}

/// Repayment model. Rows are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Repayment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub amount: Decimal,
    pub paid_on: NaiveDate,
    pub method: String,
    pub status: RepaymentStatus,
    pub applied: bool,
    pub allocation: Option<Json<Vec<AllocationLine>>>,
    pub allocated_total: Decimal,
    pub unallocated: Decimal,
    pub strategy: AllocationStrategy,
    pub custom_order: Option<String>,
    pub waive_penalties: bool,
    pub gateway: Option<String>,
    pub gateway_ref: Option<String>,
    pub reference: Option<String>,
    pub receipt_no: Option<String>,
    pub created_by: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_reason: Option<String>,
    pub voided_by: Option<String>,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Repayment {
    /// Stored allocation lines, empty when none was computed yet
    pub fn allocation_lines(&self) -> &[AllocationLine] {
        self.allocation.as_ref().map(|j| j.0.as_slice()).unwrap_or(&[])
    }

    pub fn stored_plan(&self) -> AllocationPlan {
        AllocationPlan::from_lines(self.allocation_lines().to_vec(), self.unallocated)
    }
}

/// Columns of a repayment at insert time
#[derive(Debug, Clone)]
pub struct NewRepayment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub amount: Decimal,
    pub paid_on: NaiveDate,
    pub method: String,
    pub status: RepaymentStatus,
    pub applied: bool,
    pub allocation: Option<Vec<AllocationLine>>,
    pub allocated_total: Decimal,
    pub unallocated: Decimal,
    pub strategy: AllocationStrategy,
    pub custom_order: Option<String>,
    pub waive_penalties: bool,
    pub gateway: Option<String>,
    pub gateway_ref: Option<String>,
    pub reference: Option<String>,
    pub receipt_no: Option<String>,
    pub created_by: Option<String>,
    pub approved_by: Option<String>,
}

pub(crate) fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("amount_must_be_positive"));
    }
    if exceeds_scale(*amount) {
        return Err(ValidationError::new("amount_has_more_than_two_decimals"));
    }
    Ok(())
}

/// Request to record a repayment against a loan
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRepaymentRequest {
    #[validate(custom = "validate_positive_amount")]
    pub amount: Decimal,
    pub date: NaiveDate,
    #[validate(length(min = 1, max = 50))]
    pub method: String,
    #[validate(length(max = 100))]
    pub reference: Option<String>,
    pub strategy: Option<AllocationStrategy>,
    #[validate(length(min = 1, max = 100))]
    pub custom_order: Option<String>,
    pub waive_penalties: Option<bool>,
}

/// One row of a queued (batch) import. The loan is named by id or reference.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QueueRepaymentRow {
    pub loan_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100))]
    pub loan_reference: Option<String>,
    #[validate(custom = "validate_positive_amount")]
    pub amount: Decimal,
    pub date: NaiveDate,
    #[validate(length(min = 1, max = 50))]
    pub method: String,
    #[validate(length(max = 100))]
    pub reference: Option<String>,
    pub strategy: Option<AllocationStrategy>,
    #[validate(length(min = 1, max = 100))]
    pub custom_order: Option<String>,
    pub waive_penalties: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueRepaymentsRequest {
    pub rows: Vec<QueueRepaymentRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRow {
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repayment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRepaymentsResponse {
    pub queued: usize,
    pub failed: usize,
    pub rows: Vec<QueuedRow>,
}

/// Optional note attached to reject and void
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ReasonRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Printable summary of an applied repayment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: Uuid,
    pub receipt_no: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub allocation: Vec<AllocationLine>,
    pub totals: CategoryAmounts,
}

impl Receipt {
    pub fn for_repayment(repayment: &Repayment, currency: &str) -> Option<Self> {
        let receipt_no = repayment.receipt_no.clone()?;
        let plan = repayment.stored_plan();
        Some(Self {
            id: repayment.id,
            receipt_no,
            date: repayment.paid_on,
            amount: repayment.amount,
            currency: currency.to_string(),
            allocation: plan.lines,
            totals: plan.totals,
        })
    }
}

/// `RCP-YYYYMMDD-XXXXXXXX`
pub fn receipt_number(date: NaiveDate, id: Uuid) -> String {
    let simple = id.simple().to_string().to_uppercase();
    format!("RCP-{}-{}", date.format("%Y%m%d"), &simple[..8])
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRepaymentResponse {
    pub repayment_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
    pub totals: CategoryAmounts,
    pub unallocated: Decimal,
    pub loan_status: LoanStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub allocation: Vec<AllocationLine>,
    pub totals: CategoryAmounts,
    pub unallocated: Decimal,
}

impl From<AllocationPlan> for PreviewResponse {
    fn from(plan: AllocationPlan) -> Self {
        Self {
            allocation: plan.lines,
            totals: plan.totals,
            unallocated: plan.unallocated,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub id: Uuid,
    pub status: RepaymentStatus,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoidResponse {
    pub id: Uuid,
    pub status: RepaymentStatus,
    pub reversed: CategoryAmounts,
    pub loan_status: LoanStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal) -> CreateRepaymentRequest {
        CreateRepaymentRequest {
            amount,
            date: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            method: "cash".to_string(),
            reference: None,
            strategy: None,
            custom_order: None,
            waive_penalties: None,
        }
    }

    #[test]
    fn test_transitions() {
        use RepaymentStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Voided));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Voided.can_transition_to(Voided));
        assert!(Voided.is_terminal());
        assert!(!Approved.is_terminal());
    }

    #[test]
    fn test_create_request_validation() {
        assert!(request(dec!(150)).validate().is_ok());
        assert!(request(Decimal::ZERO).validate().is_err());
        assert!(request(dec!(-5)).validate().is_err());
        assert!(request(dec!(10.001)).validate().is_err());

        let mut req = request(dec!(10));
        req.method = String::new();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_request_deserializes_camel_case() {
        let req: CreateRepaymentRequest = serde_json::from_str(
            r#"{"amount": 150, "date": "2024-04-02", "method": "cash",
                "strategy": "custom", "customOrder": "fees,interest,principal",
                "waivePenalties": true}"#,
        )
        .unwrap();
        assert_eq!(req.amount, dec!(150));
        assert_eq!(req.strategy, Some(AllocationStrategy::Custom));
        assert_eq!(req.custom_order.as_deref(), Some("fees,interest,principal"));
        assert_eq!(req.waive_penalties, Some(true));
    }

    #[test]
    fn test_receipt_number_format() {
        let id = Uuid::parse_str("a1b2c3d4-0000-0000-0000-000000000000").unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 4, 2).unwrap();
        assert_eq!(receipt_number(date, id), "RCP-20240402-A1B2C3D4");
    }
}
