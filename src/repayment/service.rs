//! Repayment service layer - lifecycle of repayments against loans
//!
//! Every mutating operation runs in one transaction and takes its row locks
//! in the same order: loan, then repayment, then schedule lines. Capability
//! and existence checks run before the transaction is opened.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::allocation::{
    plan_allocation, AllocationLine, AllocationPlan, AllocationStrategy, Category,
    CategoryAmounts, PlanRequest,
};
use crate::auth::{Actor, Capability};
use crate::config::{EngineConfig, OverpaymentPolicy};
use crate::gateway::GatewayPayment;
use crate::loan::{self, AggregateChange, Loan};
use crate::money::{floor_zero, round_money};
use crate::schedule::{self, apply_allocation, ApplyContext, Direction, ScheduleLine};
use crate::side_effects::{mirror_deposit, Notifier, SavingsMirror};

use super::error::RepaymentError;
use super::model::{
    receipt_number, CreateRepaymentRequest, CreateRepaymentResponse, NewRepayment,
    PreviewResponse, QueueRepaymentRow, QueueRepaymentsRequest, QueueRepaymentsResponse,
    QueuedRow, ReasonRequest, Receipt, Repayment, RepaymentStatus, StatusResponse, VoidResponse,
};
use super::repo;

/// Result of a gateway delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Recorded(Uuid),
    /// The `(gateway, gateway_ref)` pair was already recorded
    Duplicate,
}

/// Allocation settings of one repayment, validated
#[derive(Debug, Clone)]
struct AllocationOptions {
    strategy: AllocationStrategy,
    custom_order: Option<Vec<Category>>,
    waive_penalties: bool,
}

impl AllocationOptions {
    fn resolve(
        strategy: AllocationStrategy,
        custom_order: Option<&str>,
        waive_penalties: bool,
    ) -> Result<Self, RepaymentError> {
        let custom_order = custom_order.map(Category::parse_order).transpose()?;
        // a custom strategy without an order fails here, before any lock
        strategy.category_order(custom_order.as_deref())?;

        Ok(Self {
            strategy,
            custom_order,
            waive_penalties,
        })
    }

    fn plan_request(&self, amount: Decimal, legacy_hint: Option<Decimal>) -> PlanRequest {
        let mut request = PlanRequest::new(amount, self.strategy)
            .waiving_penalties(self.waive_penalties)
            .with_legacy_hint(legacy_hint);
        if let Some(order) = &self.custom_order {
            request = request.with_custom_order(order.clone());
        }
        request
    }

    fn stored_order(&self) -> Option<String> {
        self.custom_order.as_deref().map(Category::format_order)
    }
}

/// A repayment recorded and applied in one step
struct DirectRepayment {
    amount: Decimal,
    paid_on: NaiveDate,
    method: String,
    reference: Option<String>,
    options: AllocationOptions,
    gateway: Option<String>,
    gateway_ref: Option<String>,
}

/// What applying a repayment did to the schedule and the loan
struct Settlement {
    plan: AllocationPlan,
    change: AggregateChange,
}

fn ensure_accepts_repayments(loan: &Loan) -> Result<(), RepaymentError> {
    if loan.status.accepts_repayments() {
        Ok(())
    } else {
        Err(RepaymentError::StateConflict(format!(
            "loan {} is {:?} and does not accept repayments",
            loan.reference, loan.status
        )))
    }
}

fn ensure_transition(repayment: &Repayment, next: RepaymentStatus) -> Result<(), RepaymentError> {
    if repayment.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(RepaymentError::StateConflict(format!(
            "repayment {} is {} and cannot become {}",
            repayment.id,
            repayment.status.as_str(),
            next.as_str()
        )))
    }
}

/// Repayment service for recording, approving and reversing repayments
#[derive(Clone)]
pub struct RepaymentService {
    db_pool: PgPool,
    engine: Arc<EngineConfig>,
    notifier: Arc<dyn Notifier>,
    savings: Arc<dyn SavingsMirror>,
}

impl RepaymentService {
    pub fn new(
        db_pool: PgPool,
        engine: Arc<EngineConfig>,
        notifier: Arc<dyn Notifier>,
        savings: Arc<dyn SavingsMirror>,
    ) -> Self {
        Self {
            db_pool,
            engine,
            notifier,
            savings,
        }
    }

    /// Record a repayment and apply it to the schedule immediately
    pub async fn create_repayment(
        &self,
        actor: &Actor,
        loan_id: Uuid,
        request: CreateRepaymentRequest,
    ) -> Result<CreateRepaymentResponse, RepaymentError> {
        actor.require(Capability::RecordRepayment)?;
        request.validate()?;
        let options = AllocationOptions::resolve(
            request.strategy.unwrap_or(self.engine.default_strategy),
            request.custom_order.as_deref(),
            request.waive_penalties.unwrap_or(false),
        )?;
        let loan = self.find_loan(loan_id).await?;

        let direct = DirectRepayment {
            amount: request.amount,
            paid_on: request.date,
            method: request.method,
            reference: request.reference,
            options,
            gateway: None,
            gateway_ref: None,
        };
        let (repayment, settlement, loan) = self
            .record_direct(actor, loan.id, direct, self.engine.overpayment_policy)
            .await?;

        tracing::info!(
            repayment_id = %repayment.id,
            loan_id = %loan.id,
            amount = %repayment.amount,
            allocated = %repayment.allocated_total,
            loan_status = ?settlement.change.status,
            actor = %actor.id,
            "Repayment recorded"
        );

        self.after_commit(&loan, &repayment).await;

        Ok(CreateRepaymentResponse {
            repayment_id: repayment.id,
            receipt: Receipt::for_repayment(&repayment, &loan.currency),
            totals: settlement.plan.totals,
            unallocated: settlement.plan.unallocated,
            loan_status: settlement.change.status,
        })
    }

    /// Compute the allocation a repayment would get, without writing anything
    pub async fn preview(
        &self,
        actor: &Actor,
        loan_id: Uuid,
        request: CreateRepaymentRequest,
    ) -> Result<PreviewResponse, RepaymentError> {
        actor.require(Capability::RecordRepayment)?;
        request.validate()?;
        let options = AllocationOptions::resolve(
            request.strategy.unwrap_or(self.engine.default_strategy),
            request.custom_order.as_deref(),
            request.waive_penalties.unwrap_or(false),
        )?;
        let loan = self.find_loan(loan_id).await?;

        let schedule = schedule::repo::list_for_loan(&self.db_pool, loan.id).await?;
        let hint = self.legacy_hint(&loan, &schedule);
        let plan = plan_allocation(&schedule, &options.plan_request(request.amount, hint))?;

        Ok(plan.into())
    }

    /// Queue repayments for approval. Rows succeed or fail independently.
    pub async fn queue_batch(
        &self,
        actor: &Actor,
        request: QueueRepaymentsRequest,
    ) -> Result<QueueRepaymentsResponse, RepaymentError> {
        actor.require(Capability::RecordRepayment)?;
        if request.rows.is_empty() {
            return Err(RepaymentError::Validation("batch has no rows".to_string()));
        }

        let mut rows = Vec::with_capacity(request.rows.len());
        for (index, row) in request.rows.into_iter().enumerate() {
            let number = index + 1;
            match self.queue_row(actor, row).await {
                Ok(id) => rows.push(QueuedRow {
                    row: number,
                    repayment_id: Some(id),
                    error: None,
                }),
                Err(err) => {
                    tracing::debug!(row = number, error = %err, "Queued repayment row rejected");
                    rows.push(QueuedRow {
                        row: number,
                        repayment_id: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        let queued = rows.iter().filter(|r| r.repayment_id.is_some()).count();
        let failed = rows.len() - queued;
        tracing::info!(queued, failed, actor = %actor.id, "Repayment batch queued");

        Ok(QueueRepaymentsResponse {
            queued,
            failed,
            rows,
        })
    }

    async fn queue_row(
        &self,
        actor: &Actor,
        row: QueueRepaymentRow,
    ) -> Result<Uuid, RepaymentError> {
        row.validate()?;
        let options = AllocationOptions::resolve(
            row.strategy.unwrap_or(self.engine.default_strategy),
            row.custom_order.as_deref(),
            row.waive_penalties.unwrap_or(false),
        )?;

        let loan = match (row.loan_id, row.loan_reference.as_deref()) {
            (Some(id), _) => self.find_loan(id).await?,
            (None, Some(reference)) => loan::repo::find_by_reference(&self.db_pool, reference)
                .await?
                .ok_or_else(|| {
                    RepaymentError::Referential(format!("no loan with reference '{}'", reference))
                })?,
            (None, None) => {
                return Err(RepaymentError::Validation(
                    "row names neither loanId nor loanReference".to_string(),
                ))
            }
        };
        ensure_accepts_repayments(&loan)?;

        let new = NewRepayment {
            id: Uuid::new_v4(),
            loan_id: loan.id,
            amount: row.amount,
            paid_on: row.date,
            method: row.method,
            status: RepaymentStatus::Pending,
            applied: false,
            allocation: None,
            allocated_total: Decimal::ZERO,
            unallocated: Decimal::ZERO,
            strategy: options.strategy,
            custom_order: options.stored_order(),
            waive_penalties: options.waive_penalties,
            gateway: None,
            gateway_ref: None,
            reference: row.reference,
            receipt_no: None,
            created_by: Some(actor.id.clone()),
            approved_by: None,
        };
        let repayment = repo::insert(&self.db_pool, &new).await?;

        Ok(repayment.id)
    }

    /// Apply a pending repayment
    pub async fn approve(&self, actor: &Actor, id: Uuid) -> Result<StatusResponse, RepaymentError> {
        actor.require(Capability::ApproveRepayment)?;
        let found = self.find_repayment(id).await?;

        let mut tx = self.db_pool.begin().await?;
        let mut loan = loan::repo::lock_by_id(&mut *tx, found.loan_id).await?;
        let repayment = repo::lock_by_id(&mut *tx, id).await?;
        ensure_transition(&repayment, RepaymentStatus::Approved)?;
        ensure_accepts_repayments(&loan)?;

        let options = AllocationOptions::resolve(
            repayment.strategy,
            repayment.custom_order.as_deref(),
            repayment.waive_penalties,
        )?;
        let settlement = self
            .settle(
                &mut tx,
                &mut loan,
                &options,
                repayment.amount,
                Some(repayment.allocation_lines()),
                self.engine.overpayment_policy,
            )
            .await?;

        let receipt_no = receipt_number(repayment.paid_on, repayment.id);
        let approved = repo::mark_approved(
            &mut tx,
            id,
            &settlement.plan.lines,
            settlement.plan.allocated_total(),
            settlement.plan.unallocated,
            &receipt_no,
            &actor.id,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            repayment_id = %id,
            loan_id = %loan.id,
            allocated = %approved.allocated_total,
            loan_status = ?settlement.change.status,
            actor = %actor.id,
            "Repayment approved"
        );

        self.after_commit(&loan, &approved).await;

        Ok(StatusResponse {
            id,
            status: approved.status,
            applied: approved.applied,
            receipt: Receipt::for_repayment(&approved, &loan.currency),
        })
    }

    /// Reject a pending repayment. Nothing is applied.
    pub async fn reject(
        &self,
        actor: &Actor,
        id: Uuid,
        request: ReasonRequest,
    ) -> Result<StatusResponse, RepaymentError> {
        actor.require(Capability::ApproveRepayment)?;
        request.validate()?;
        let found = self.find_repayment(id).await?;

        let mut tx = self.db_pool.begin().await?;
        loan::repo::lock_by_id(&mut *tx, found.loan_id).await?;
        let repayment = repo::lock_by_id(&mut *tx, id).await?;
        ensure_transition(&repayment, RepaymentStatus::Rejected)?;

        let rejected = repo::mark_rejected(&mut tx, id, request.reason.as_deref()).await?;
        tx.commit().await?;

        tracing::info!(repayment_id = %id, actor = %actor.id, "Repayment rejected");

        Ok(StatusResponse {
            id,
            status: rejected.status,
            applied: rejected.applied,
            receipt: None,
        })
    }

    /// Void a repayment, reversing its allocation when it was applied
    pub async fn void(
        &self,
        actor: &Actor,
        id: Uuid,
        request: ReasonRequest,
    ) -> Result<VoidResponse, RepaymentError> {
        actor.require(Capability::VoidRepayment)?;
        request.validate()?;
        let found = self.find_repayment(id).await?;

        let mut tx = self.db_pool.begin().await?;
        let mut loan = loan::repo::lock_by_id(&mut *tx, found.loan_id).await?;
        let repayment = repo::lock_by_id(&mut *tx, id).await?;
        ensure_transition(&repayment, RepaymentStatus::Voided)?;

        let (reversed, loan_status) = if repayment.applied {
            let ctx = ApplyContext {
                as_of: Utc::now().date_naive(),
                epsilon: self.engine.settle_epsilon,
                legacy_interest_hint: None,
            };
            let reversed = apply_allocation(
                &mut tx,
                loan.id,
                repayment.allocation_lines(),
                Direction::Reverse,
                &ctx,
            )
            .await?;
            let change = loan.apply_paid_delta(-reversed.allocated_total());
            loan::repo::update_aggregate(&mut tx, &loan).await?;
            (reversed.totals, change.status)
        } else {
            (CategoryAmounts::ZERO, loan.status)
        };

        let voided = repo::mark_voided(&mut tx, id, &actor.id, request.reason.as_deref()).await?;
        tx.commit().await?;

        tracing::info!(
            repayment_id = %id,
            loan_id = %loan.id,
            reversed = %reversed.total(),
            loan_status = ?loan_status,
            actor = %actor.id,
            "Repayment voided"
        );

        Ok(VoidResponse {
            id,
            status: voided.status,
            reversed,
            loan_status,
        })
    }

    pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<Repayment, RepaymentError> {
        actor.require(Capability::ViewRepayments)?;
        self.find_repayment(id).await
    }

    pub async fn list_for_loan(
        &self,
        actor: &Actor,
        loan_id: Uuid,
    ) -> Result<Vec<Repayment>, RepaymentError> {
        actor.require(Capability::ViewRepayments)?;
        let loan = self.find_loan(loan_id).await?;
        Ok(repo::list_for_loan(&self.db_pool, loan.id).await?)
    }

    pub async fn schedule(
        &self,
        actor: &Actor,
        loan_id: Uuid,
    ) -> Result<Vec<ScheduleLine>, RepaymentError> {
        actor.require(Capability::ViewRepayments)?;
        let loan = self.find_loan(loan_id).await?;
        Ok(schedule::repo::list_for_loan(&self.db_pool, loan.id).await?)
    }

    /// Record a verified gateway payment. Redeliveries are a no-op.
    pub async fn ingest_gateway_payment(
        &self,
        payment: GatewayPayment,
    ) -> Result<IngestOutcome, RepaymentError> {
        if repo::find_by_gateway_ref(&self.db_pool, &payment.gateway, &payment.gateway_ref)
            .await?
            .is_some()
        {
            tracing::info!(
                gateway = %payment.gateway,
                gateway_ref = %payment.gateway_ref,
                "Duplicate gateway delivery ignored"
            );
            return Ok(IngestOutcome::Duplicate);
        }

        let loan = loan::repo::find_by_reference(&self.db_pool, &payment.loan_reference)
            .await?
            .ok_or_else(|| {
                RepaymentError::Referential(format!(
                    "no loan with reference '{}'",
                    payment.loan_reference
                ))
            })?;
        if !loan.currency.eq_ignore_ascii_case(&payment.currency) {
            return Err(RepaymentError::Validation(format!(
                "currency {} does not match loan currency {}",
                payment.currency, loan.currency
            )));
        }

        let actor = Actor::gateway(&payment.gateway);
        let direct = DirectRepayment {
            amount: payment.amount,
            paid_on: payment.paid_at.date(),
            method: payment.gateway.clone(),
            reference: Some(payment.gateway_ref.clone()),
            options: AllocationOptions::resolve(self.engine.default_strategy, None, false)?,
            gateway: Some(payment.gateway.clone()),
            gateway_ref: Some(payment.gateway_ref.clone()),
        };

        // money already moved, so excess is kept as unallocated
        match self
            .record_direct(&actor, loan.id, direct, OverpaymentPolicy::Record)
            .await
        {
            Ok((repayment, settlement, loan)) => {
                if settlement.plan.unallocated > Decimal::ZERO {
                    tracing::warn!(
                        repayment_id = %repayment.id,
                        loan_id = %loan.id,
                        unallocated = %settlement.plan.unallocated,
                        "Gateway payment exceeds the remaining schedule"
                    );
                }
                tracing::info!(
                    repayment_id = %repayment.id,
                    loan_id = %loan.id,
                    gateway = %payment.gateway,
                    gateway_ref = %payment.gateway_ref,
                    amount = %repayment.amount,
                    "Gateway repayment recorded"
                );
                self.after_commit(&loan, &repayment).await;
                Ok(IngestOutcome::Recorded(repayment.id))
            }
            Err(err) if err.is_constraint(repo::GATEWAY_REF_INDEX) => {
                tracing::info!(
                    gateway = %payment.gateway,
                    gateway_ref = %payment.gateway_ref,
                    "Concurrent duplicate gateway delivery ignored"
                );
                Ok(IngestOutcome::Duplicate)
            }
            Err(err) => Err(err),
        }
    }

    /// Lock, allocate, apply and persist an approved repayment in one transaction
    async fn record_direct(
        &self,
        actor: &Actor,
        loan_id: Uuid,
        direct: DirectRepayment,
        policy: OverpaymentPolicy,
    ) -> Result<(Repayment, Settlement, Loan), RepaymentError> {
        let mut tx = self.db_pool.begin().await?;
        let mut loan = loan::repo::lock_by_id(&mut *tx, loan_id).await?;
        ensure_accepts_repayments(&loan)?;

        let settlement = self
            .settle(&mut tx, &mut loan, &direct.options, direct.amount, None, policy)
            .await?;

        let id = Uuid::new_v4();
        let new = NewRepayment {
            id,
            loan_id,
            amount: direct.amount,
            paid_on: direct.paid_on,
            method: direct.method,
            status: RepaymentStatus::Approved,
            applied: true,
            allocation: Some(settlement.plan.lines.clone()),
            allocated_total: settlement.plan.allocated_total(),
            unallocated: settlement.plan.unallocated,
            strategy: direct.options.strategy,
            custom_order: direct.options.stored_order(),
            waive_penalties: direct.options.waive_penalties,
            gateway: direct.gateway,
            gateway_ref: direct.gateway_ref,
            reference: direct.reference,
            receipt_no: Some(receipt_number(direct.paid_on, id)),
            created_by: Some(actor.id.clone()),
            approved_by: Some(actor.id.clone()),
        };
        let repayment = repo::insert(&mut *tx, &new).await?;
        tx.commit().await?;

        Ok((repayment, settlement, loan))
    }

    /// Allocate `amount` (or reuse `stored`), write it onto the schedule and
    /// update the loan aggregate. The loan row must already be locked.
    async fn settle(
        &self,
        conn: &mut PgConnection,
        loan: &mut Loan,
        options: &AllocationOptions,
        amount: Decimal,
        stored: Option<&[AllocationLine]>,
        policy: OverpaymentPolicy,
    ) -> Result<Settlement, RepaymentError> {
        let schedule = schedule::repo::list_for_loan(&mut *conn, loan.id).await?;
        let hint = self.legacy_hint(loan, &schedule);

        let requested = match stored {
            Some(lines) if !lines.is_empty() => {
                let allocated: Decimal = lines.iter().map(|l| l.amounts.total()).sum();
                AllocationPlan::from_lines(lines.to_vec(), floor_zero(amount - allocated))
            }
            _ => plan_allocation(&schedule, &options.plan_request(amount, hint))?,
        };

        if requested.unallocated > Decimal::ZERO && matches!(policy, OverpaymentPolicy::Reject) {
            return Err(RepaymentError::Validation(format!(
                "amount exceeds the remaining schedule by {}",
                requested.unallocated
            )));
        }

        let ctx = ApplyContext {
            as_of: Utc::now().date_naive(),
            epsilon: self.engine.settle_epsilon,
            legacy_interest_hint: hint,
        };
        let mut applied =
            apply_allocation(&mut *conn, loan.id, &requested.lines, Direction::Apply, &ctx).await?;
        applied.unallocated = floor_zero(round_money(amount - applied.allocated_total()));

        let change = loan.apply_paid_delta(applied.allocated_total());
        loan::repo::update_aggregate(&mut *conn, loan).await?;

        if change.transitioned() {
            tracing::info!(
                loan_id = %loan.id,
                from = ?change.previous_status,
                to = ?change.status,
                "Loan status changed"
            );
        }

        Ok(Settlement {
            plan: applied,
            change,
        })
    }

    /// Interest share attributed to legacy lines, when the fallback is on
    fn legacy_hint(&self, loan: &Loan, schedule: &[ScheduleLine]) -> Option<Decimal> {
        if !self.engine.legacy_schedule_fallback || schedule.is_empty() {
            return None;
        }
        Some(round_money(loan.interest / Decimal::from(schedule.len())))
    }

    async fn find_loan(&self, id: Uuid) -> Result<Loan, RepaymentError> {
        loan::repo::find_by_id(&self.db_pool, id)
            .await?
            .ok_or_else(|| RepaymentError::not_found("loan", id))
    }

    async fn find_repayment(&self, id: Uuid) -> Result<Repayment, RepaymentError> {
        repo::find_by_id(&self.db_pool, id)
            .await?
            .ok_or_else(|| RepaymentError::not_found("repayment", id))
    }

    /// Notify the borrower and mirror the deposit. Failures are only logged.
    async fn after_commit(&self, loan: &Loan, repayment: &Repayment) {
        let borrower = match loan::repo::find_borrower(&self.db_pool, loan.borrower_id).await {
            Ok(Some(borrower)) => borrower,
            Ok(None) => {
                tracing::warn!(loan_id = %loan.id, "Borrower missing, skipping side effects");
                return;
            }
            Err(e) => {
                tracing::warn!(loan_id = %loan.id, error = %e, "Borrower lookup failed");
                return;
            }
        };

        if let Err(e) = self
            .notifier
            .notify(&borrower, repayment.amount, &loan.reference, &repayment.method)
            .await
        {
            tracing::warn!(
                repayment_id = %repayment.id,
                error = %e,
                "Repayment notification failed"
            );
        }

        if self.engine.mirror_to_savings {
            let reference = repayment
                .receipt_no
                .clone()
                .unwrap_or_else(|| repayment.id.to_string());
            if let Err(e) = mirror_deposit(
                self.savings.as_ref(),
                borrower.id,
                repayment.amount,
                repayment.paid_on,
                &reference,
            )
            .await
            {
                tracing::warn!(repayment_id = %repayment.id, error = %e, "Savings mirror failed");
            }
        }
    }
}
