// core/common/src/audit.rs
// Fire-and-forget append-only audit sink

use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    LoanCreated,
    LoanDenied,
    LoanFunded,
    LoanCompleted,
    PaymentInitiated,
    PaymentProofSubmitted,
    PaymentConfirmed,
    PaymentDisputed,
    SweepMarkedOverdue,
    ReconciliationAnomaly,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::LoanCreated => "LOAN_CREATED",
            AuditAction::LoanDenied => "LOAN_DENIED",
            AuditAction::LoanFunded => "LOAN_FUNDED",
            AuditAction::LoanCompleted => "LOAN_COMPLETED",
            AuditAction::PaymentInitiated => "PAYMENT_INITIATED",
            AuditAction::PaymentProofSubmitted => "PAYMENT_PROOF_SUBMITTED",
            AuditAction::PaymentConfirmed => "PAYMENT_CONFIRMED",
            AuditAction::PaymentDisputed => "PAYMENT_DISPUTED",
            AuditAction::SweepMarkedOverdue => "SWEEP_MARKED_OVERDUE",
            AuditAction::ReconciliationAnomaly => "RECONCILIATION_ANOMALY",
        }
    }
}

/// Append an audit entry without blocking or failing the caller. The insert
/// runs on a detached task; a sink failure is logged and dropped.
pub fn record(
    pool: &PgPool,
    user_id: Option<Uuid>,
    action: AuditAction,
    details: serde_json::Value,
) {
    let pool = pool.clone();
    tokio::spawn(async move {
        let result = sqlx::query(
            "INSERT INTO audit_logs (user_id, action, details) VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(action.as_str())
        .bind(details.to_string())
        .execute(&pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(action = action.as_str(), error = %e, "audit sink write failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_names() {
        assert_eq!(AuditAction::LoanCreated.as_str(), "LOAN_CREATED");
        assert_eq!(AuditAction::PaymentDisputed.as_str(), "PAYMENT_DISPUTED");
        assert_eq!(
            AuditAction::ReconciliationAnomaly.as_str(),
            "RECONCILIATION_ANOMALY"
        );
    }
}
