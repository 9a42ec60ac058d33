// core/loan-service/src/sweep.rs
// Overdue sweep: daily job grading delinquency and sending reminders

use chrono::{DateTime, Utc};
use lendhand_common::{
    audit, domain::Loan, AuditAction, LoanHealth, MetricsTimer, ServiceMetrics,
};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::mailer::{compose_borrower_reminder, compose_lender_reminder, Mailer};

pub fn days_late(now: DateTime<Utc>, payback_date: DateTime<Utc>) -> i64 {
    (now - payback_date).num_days()
}

/// Health band for a late loan. Loans not yet late stay out of here; the
/// sweep only grades FUNDED loans whose payback date has passed.
pub fn grade_health(days_late: i64) -> LoanHealth {
    if days_late > 30 {
        LoanHealth::Defaulted
    } else if days_late > 14 {
        LoanHealth::Failing
    } else {
        LoanHealth::Behind
    }
}

#[derive(Debug, Default, Serialize)]
pub struct SweepSummary {
    pub marked_overdue: usize,
    pub reminders_sent: usize,
    pub reminder_failures: usize,
}

#[derive(Debug, sqlx::FromRow)]
struct OverdueLoanRow {
    id: Uuid,
    lender_id: Uuid,
    borrower_id: Uuid,
    total_payable: f64,
    payback_date: DateTime<Utc>,
    health: LoanHealth,
    lender_name: String,
    lender_email: String,
    borrower_name: String,
    borrower_email: String,
}

/// One sweep pass. Marks FUNDED loans past their payback date OVERDUE with a
/// graded health, then reminds both parties of every OVERDUE loan. Reminders
/// repeat every run on purpose; suppression was considered and rejected (see
/// DESIGN.md). Only repayment settlement moves a loan out of OVERDUE.
pub async fn run_sweep_once(
    pool: &PgPool,
    mailer: &Mailer,
    metrics: &ServiceMetrics,
) -> Result<SweepSummary, sqlx::Error> {
    let timer = MetricsTimer::start();
    let now = Utc::now();
    let mut summary = SweepSummary::default();

    // 1. FUNDED loans past due become OVERDUE with a health grade. Health is
    // monotone: an already-worse grade is never improved.
    let due: Vec<Loan> = sqlx::query_as(
        "SELECT * FROM loans WHERE status = 'FUNDED' AND payback_date < $1",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;

    for loan in &due {
        let late = days_late(now, loan.payback_date);
        let health = loan.health.worst(grade_health(late));

        let updated = sqlx::query(
            "UPDATE loans SET status = 'OVERDUE', health = $1, updated_at = NOW() \
             WHERE id = $2 AND status = 'FUNDED'",
        )
        .bind(health)
        .bind(loan.id)
        .execute(pool)
        .await?;

        if updated.rows_affected() > 0 {
            summary.marked_overdue += 1;
            metrics.loans_marked_overdue_total.inc();
            metrics.record_loan_transition("OVERDUE");
            tracing::info!(loan_id = %loan.id, days_late = late, health = %health, "loan marked overdue");
            audit::record(
                pool,
                None,
                AuditAction::SweepMarkedOverdue,
                serde_json::json!({
                    "loanId": loan.id,
                    "daysLate": late,
                    "health": health.as_str(),
                }),
            );
        }
    }

    // 2. Remind both parties of every OVERDUE loan.
    let overdue: Vec<OverdueLoanRow> = sqlx::query_as(
        "SELECT l.id, l.lender_id, l.borrower_id, l.total_payable, l.payback_date, l.health, \
                lu.full_name AS lender_name, lu.email AS lender_email, \
                bu.full_name AS borrower_name, bu.email AS borrower_email \
         FROM loans l \
         JOIN users lu ON lu.id = l.lender_id \
         JOIN users bu ON bu.id = l.borrower_id \
         WHERE l.status = 'OVERDUE'",
    )
    .fetch_all(pool)
    .await?;

    for row in &overdue {
        let late = days_late(now, row.payback_date);
        let payback = row.payback_date.format("%Y-%m-%d").to_string();

        let (subject, body) = compose_borrower_reminder(
            &row.borrower_name,
            &row.lender_name,
            &row.lender_email,
            row.total_payable,
            &payback,
            late,
            row.health.as_str(),
        );
        match mailer.send(&row.borrower_email, &subject, &body).await {
            Ok(()) => summary.reminders_sent += 1,
            Err(e) => {
                summary.reminder_failures += 1;
                tracing::warn!(loan_id = %row.id, error = e, "borrower reminder failed");
            }
        }

        let (subject, body) = compose_lender_reminder(
            &row.lender_name,
            &row.borrower_name,
            &row.borrower_email,
            row.total_payable,
            &payback,
            late,
            row.health.as_str(),
        );
        match mailer.send(&row.lender_email, &subject, &body).await {
            Ok(()) => summary.reminders_sent += 1,
            Err(e) => {
                summary.reminder_failures += 1;
                tracing::warn!(loan_id = %row.id, error = e, "lender reminder failed");
            }
        }

        let message = format!(
            "Loan of ${} is overdue by {} days (health: {}).",
            row.total_payable,
            late,
            row.health.as_str()
        );
        for user_id in [row.borrower_id, row.lender_id] {
            let inserted = sqlx::query(
                "INSERT INTO notifications (user_id, loan_id, kind, message) VALUES ($1, $2, $3, $4)",
            )
            .bind(user_id)
            .bind(row.id)
            .bind("LOAN_OVERDUE")
            .bind(&message)
            .execute(pool)
            .await;
            if let Err(e) = inserted {
                tracing::warn!(loan_id = %row.id, error = %e, "overdue notification insert failed");
            }
        }
    }

    metrics.sweep_duration_seconds.observe(timer.elapsed_seconds());
    tracing::info!(
        marked_overdue = summary.marked_overdue,
        reminders_sent = summary.reminders_sent,
        "sweep complete"
    );
    Ok(summary)
}

/// Spawn the sweep on a fixed cadence. A single global task; the window is
/// long and every query is idempotent, so no overlap guard is needed.
pub fn spawn_sweep(
    pool: PgPool,
    mailer: Mailer,
    metrics: ServiceMetrics,
    interval_secs: u64,
) {
    let interval = tokio::time::Duration::from_secs(interval_secs);
    tokio::spawn(async move {
        loop {
            if let Err(e) = run_sweep_once(&pool, &mailer, &metrics).await {
                tracing::error!(error = %e, "overdue sweep failed");
            }
            tokio::time::sleep(interval).await;
        }
    });
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_health_bands() {
        assert_eq!(grade_health(1), LoanHealth::Behind);
        assert_eq!(grade_health(14), LoanHealth::Behind);
        assert_eq!(grade_health(15), LoanHealth::Failing);
        assert_eq!(grade_health(20), LoanHealth::Failing);
        assert_eq!(grade_health(30), LoanHealth::Failing);
        assert_eq!(grade_health(31), LoanHealth::Defaulted);
        assert_eq!(grade_health(90), LoanHealth::Defaulted);
    }

    #[test]
    fn test_days_late_floors_partial_days() {
        let payback = Utc::now() - Duration::hours(47);
        assert_eq!(days_late(Utc::now(), payback), 1);
    }

    #[test]
    fn test_grade_never_improves_existing_health() {
        // A loan already DEFAULTED must not regress to BEHIND even if the
        // computed band is milder.
        let graded = LoanHealth::Defaulted.worst(grade_health(2));
        assert_eq!(graded, LoanHealth::Defaulted);
    }
}
