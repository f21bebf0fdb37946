//! Repayment lifecycle against a real Postgres database.
//!
//! Run with `TEST_DATABASE_URL` pointing at a scratch database and
//! `cargo test -- --ignored`.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveDateTime};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use sqlx::PgPool;
    use uuid::Uuid;

    use microlend_server::auth::{Actor, Role};
    use microlend_server::config::{EngineConfig, OverpaymentPolicy};
    use microlend_server::db::run_migrations;
    use microlend_server::gateway::GatewayPayment;
    use microlend_server::loan::{self, LoanStatus};
    use microlend_server::repayment::{
        CreateRepaymentRequest, IngestOutcome, QueueRepaymentRow, QueueRepaymentsRequest,
        ReasonRequest, RepaymentError, RepaymentService, RepaymentStatus,
    };
    use microlend_server::schedule::{self, ScheduleStatus};
    use microlend_server::side_effects::{PgSavingsMirror, TracingNotifier};

    /// Helper to create a migrated test database pool
    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/microlend_test".to_string());

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");
        run_migrations(&pool).await.expect("Failed to migrate");
        pool
    }

    fn service(pool: &PgPool, engine: EngineConfig) -> RepaymentService {
        RepaymentService::new(
            pool.clone(),
            Arc::new(engine),
            Arc::new(TracingNotifier),
            Arc::new(PgSavingsMirror::new(pool.clone())),
        )
    }

    fn officer() -> Actor {
        Actor::new("officer-1", Role::LoanOfficer)
    }

    fn manager() -> Actor {
        Actor::new("manager-1", Role::Manager)
    }

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2031, month, day).unwrap()
    }

    /// Seed an approved loan of 200 + 20 with two periods of 100 + 10.
    /// Returns the loan id and its reference.
    async fn seed_loan(pool: &PgPool) -> (Uuid, String) {
        let borrower_id = Uuid::new_v4();
        sqlx::query("INSERT INTO borrowers (id, full_name, phone) VALUES ($1, $2, $3)")
            .bind(borrower_id)
            .bind("Test Borrower")
            .bind("+254700000000")
            .execute(pool)
            .await
            .unwrap();

        let loan_id = Uuid::new_v4();
        let reference = format!("LN-{}", &loan_id.simple().to_string()[..8]);
        sqlx::query(
            r#"
            INSERT INTO loans (id, borrower_id, reference, principal, interest, currency,
                               total_paid, outstanding, status)
            VALUES ($1, $2, $3, 200, 20, 'KES', 0, 220, 'approved')
            "#,
        )
        .bind(loan_id)
        .bind(borrower_id)
        .bind(&reference)
        .execute(pool)
        .await
        .unwrap();

        for (period, due_date) in [(1, date(2, 1)), (2, date(3, 1))] {
            sqlx::query(
                r#"
                INSERT INTO loan_schedule (id, loan_id, period, due_date, principal_due,
                                           interest_due, total)
                VALUES ($1, $2, $3, $4, 100, 10, 110)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(loan_id)
            .bind(period)
            .bind(due_date)
            .execute(pool)
            .await
            .unwrap();
        }

        (loan_id, reference)
    }

    fn create_request(amount: Decimal) -> CreateRepaymentRequest {
        CreateRepaymentRequest {
            amount,
            date: date(1, 15),
            method: "cash".to_string(),
            reference: None,
            strategy: None,
            custom_order: None,
            waive_penalties: None,
        }
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_direct_repayment_updates_schedule_and_loan() {
        let pool = setup_test_db().await;
        let (loan_id, _) = seed_loan(&pool).await;
        let service = service(&pool, EngineConfig::default());

        let mut request = create_request(dec!(150));
        request.strategy = Some(microlend_server::allocation::AllocationStrategy::InterestFirst);
        let response = service
            .create_repayment(&officer(), loan_id, request)
            .await
            .unwrap();

        assert_eq!(response.totals.principal, dec!(130));
        assert_eq!(response.totals.interest, dec!(20));
        assert_eq!(response.loan_status, LoanStatus::Active);
        let receipt = response.receipt.expect("approved repayment has a receipt");
        assert!(receipt.receipt_no.starts_with("RCP-20310115-"));

        let lines = schedule::repo::list_for_loan(&pool, loan_id).await.unwrap();
        assert_eq!(lines[0].status, ScheduleStatus::Paid);
        assert_eq!(lines[1].paid, dec!(40));

        let loan = loan::repo::find_by_id(&pool, loan_id).await.unwrap().unwrap();
        assert_eq!(loan.total_paid, dec!(150));
        assert_eq!(loan.outstanding, Some(dec!(70)));

        let mirrored: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM savings_transactions WHERE reference = $1",
        )
        .bind(&receipt.receipt_no)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(mirrored.0, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_void_reverses_full_payment() {
        let pool = setup_test_db().await;
        let (loan_id, _) = seed_loan(&pool).await;
        let service = service(&pool, EngineConfig::default());

        let created = service
            .create_repayment(&officer(), loan_id, create_request(dec!(220)))
            .await
            .unwrap();
        assert_eq!(created.loan_status, LoanStatus::Closed);

        let voided = service
            .void(&manager(), created.repayment_id, ReasonRequest::default())
            .await
            .unwrap();
        assert_eq!(voided.status, RepaymentStatus::Voided);
        assert_eq!(voided.reversed.total(), dec!(220));
        assert_eq!(voided.loan_status, LoanStatus::Active);

        let lines = schedule::repo::list_for_loan(&pool, loan_id).await.unwrap();
        assert!(lines.iter().all(|l| l.paid.is_zero() && l.status != ScheduleStatus::Paid));

        let loan = loan::repo::find_by_id(&pool, loan_id).await.unwrap().unwrap();
        assert_eq!(loan.total_paid, Decimal::ZERO);
        assert_eq!(loan.outstanding, Some(dec!(220)));

        let again = service
            .void(&manager(), created.repayment_id, ReasonRequest::default())
            .await;
        assert!(matches!(again, Err(RepaymentError::StateConflict(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_overpayment_is_rejected_without_side_effects() {
        let pool = setup_test_db().await;
        let (loan_id, _) = seed_loan(&pool).await;
        let service = service(&pool, EngineConfig::default());

        let result = service
            .create_repayment(&officer(), loan_id, create_request(dec!(500)))
            .await;
        assert!(matches!(result, Err(RepaymentError::Validation(_))));

        let loan = loan::repo::find_by_id(&pool, loan_id).await.unwrap().unwrap();
        assert_eq!(loan.total_paid, Decimal::ZERO);
        assert_eq!(loan.status, LoanStatus::Approved);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_overpayment_recorded_when_configured() {
        let pool = setup_test_db().await;
        let (loan_id, _) = seed_loan(&pool).await;
        let engine = EngineConfig {
            overpayment_policy: OverpaymentPolicy::Record,
            ..EngineConfig::default()
        };
        let service = service(&pool, engine);

        let response = service
            .create_repayment(&officer(), loan_id, create_request(dec!(250)))
            .await
            .unwrap();
        assert_eq!(response.totals.total(), dec!(220));
        assert_eq!(response.unallocated, dec!(30));
        assert_eq!(response.loan_status, LoanStatus::Closed);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_queued_repayment_approval_and_rejection() {
        let pool = setup_test_db().await;
        let (loan_id, reference) = seed_loan(&pool).await;
        let service = service(&pool, EngineConfig::default());

        let row = |amount: Decimal, by_reference: bool| QueueRepaymentRow {
            loan_id: if by_reference { None } else { Some(loan_id) },
            loan_reference: if by_reference { Some(reference.clone()) } else { None },
            amount,
            date: date(1, 20),
            method: "bank".to_string(),
            reference: None,
            strategy: None,
            custom_order: None,
            waive_penalties: None,
        };
        let mut unknown = row(dec!(5), true);
        unknown.loan_reference = Some("LN-DOES-NOT-EXIST".to_string());

        let batch = service
            .queue_batch(
                &officer(),
                QueueRepaymentsRequest {
                    rows: vec![row(dec!(50), false), row(dec!(20), true), unknown],
                },
            )
            .await
            .unwrap();
        assert_eq!(batch.queued, 2);
        assert_eq!(batch.failed, 1);
        assert!(batch.rows[2].error.is_some());

        // queuing does not touch the schedule
        let loan = loan::repo::find_by_id(&pool, loan_id).await.unwrap().unwrap();
        assert_eq!(loan.total_paid, Decimal::ZERO);

        let first = batch.rows[0].repayment_id.unwrap();
        let second = batch.rows[1].repayment_id.unwrap();

        let unauthorized = service.approve(&officer(), first).await;
        assert!(matches!(unauthorized, Err(RepaymentError::Authorization(_))));

        let approved = service.approve(&manager(), first).await.unwrap();
        assert_eq!(approved.status, RepaymentStatus::Approved);
        assert!(approved.applied);
        assert!(approved.receipt.is_some());

        let rejected = service
            .reject(
                &manager(),
                second,
                ReasonRequest {
                    reason: Some("duplicate slip".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, RepaymentStatus::Rejected);

        let reject_approved = service
            .reject(&manager(), first, ReasonRequest::default())
            .await;
        assert!(matches!(reject_approved, Err(RepaymentError::StateConflict(_))));

        let loan = loan::repo::find_by_id(&pool, loan_id).await.unwrap().unwrap();
        assert_eq!(loan.total_paid, dec!(50));
        assert_eq!(loan.status, LoanStatus::Active);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_gateway_redelivery_is_ignored() {
        let pool = setup_test_db().await;
        let (loan_id, reference) = seed_loan(&pool).await;
        let service = service(&pool, EngineConfig::default());

        let payment = GatewayPayment {
            loan_reference: reference,
            amount: dec!(60),
            currency: "KES".to_string(),
            paid_at: NaiveDateTime::parse_from_str("20310115093000", "%Y%m%d%H%M%S").unwrap(),
            gateway: "mobile".to_string(),
            gateway_ref: format!("QK{}", &Uuid::new_v4().simple().to_string()[..8]),
        };

        let first = service.ingest_gateway_payment(payment.clone()).await.unwrap();
        assert!(matches!(first, IngestOutcome::Recorded(_)));

        let second = service.ingest_gateway_payment(payment).await.unwrap();
        assert_eq!(second, IngestOutcome::Duplicate);

        let loan = loan::repo::find_by_id(&pool, loan_id).await.unwrap().unwrap();
        assert_eq!(loan.total_paid, dec!(60));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_gateway_payment_for_unknown_loan() {
        let pool = setup_test_db().await;
        let service = service(&pool, EngineConfig::default());

        let payment = GatewayPayment {
            loan_reference: "LN-NOPE".to_string(),
            amount: dec!(10),
            currency: "KES".to_string(),
            paid_at: NaiveDateTime::parse_from_str("20310115093000", "%Y%m%d%H%M%S").unwrap(),
            gateway: "mobile".to_string(),
            gateway_ref: Uuid::new_v4().to_string(),
        };
        let result = service.ingest_gateway_payment(payment).await;
        assert!(matches!(result, Err(RepaymentError::Referential(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_concurrent_repayments_never_overallocate() {
        let pool = setup_test_db().await;
        let (loan_id, _) = seed_loan(&pool).await;
        let engine = EngineConfig {
            overpayment_policy: OverpaymentPolicy::Record,
            ..EngineConfig::default()
        };
        let service = Arc::new(service(&pool, engine));

        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move {
                    service
                        .create_repayment(&officer(), loan_id, create_request(dec!(150)))
                        .await
                })
            })
            .collect();

        let mut allocated = Decimal::ZERO;
        for task in tasks {
            let response = task.await.unwrap().unwrap();
            allocated += response.totals.total();
        }
        assert_eq!(allocated, dec!(220));

        let lines = schedule::repo::list_for_loan(&pool, loan_id).await.unwrap();
        assert!(lines.iter().all(|l| l.paid <= l.total));

        let loan = loan::repo::find_by_id(&pool, loan_id).await.unwrap().unwrap();
        assert_eq!(loan.outstanding, Some(Decimal::ZERO));
        assert_eq!(loan.status, LoanStatus::Closed);
    }
}
