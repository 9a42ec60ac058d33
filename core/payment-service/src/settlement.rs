// core/payment-service/src/settlement.rs
// Settlement engine: the authoritative decision point for payment terminal
// states and the loan transitions they imply. All loan mutations here run
// under the loan's row lock so concurrent settlements serialize per loan.

use lendhand_common::{
    audit, domain::{Loan, Payment, PaymentAccount},
    log_reconciliation_anomaly, log_settlement, AuditAction, LoanStatus, PartyRole,
    PaymentMethod, ServiceError, ServiceMetrics,
};
use sqlx::PgPool;
use uuid::Uuid;

// ============================================================================
// MANUAL DUAL-ATTESTATION DECISION TABLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationDecision {
    /// A dispute from either party overrides everything, including a prior
    /// opposite confirmation.
    Disputed,
    /// Both-sided attestation reached, or the receiver's confirmation of
    /// receipt stood in for the payer's flag (fast-path).
    Confirmed,
    /// First of two confirmations; waiting on the other party.
    StillPending,
}

/// Evaluate one confirm/dispute call against the payment's stored flags.
/// `lender_confirmed` / `borrower_confirmed` are the flags as stored before
/// this call. Rules, in order: dispute wins; other party already confirmed
/// wins; the receiving party confirming receipt wins without the payer's
/// flag; otherwise keep waiting.
pub fn decide_confirmation(
    receiver_role: PartyRole,
    lender_confirmed: bool,
    borrower_confirmed: bool,
    confirmer: PartyRole,
    confirmed: bool,
) -> ConfirmationDecision {
    if !confirmed {
        return ConfirmationDecision::Disputed;
    }

    let other_already_confirmed = match confirmer {
        PartyRole::Lender => borrower_confirmed,
        PartyRole::Borrower => lender_confirmed,
    };
    if other_already_confirmed {
        return ConfirmationDecision::Confirmed;
    }

    // Receiver fast-path: a lender confirming a borrower->lender repayment,
    // or a borrower confirming a lender->borrower funding disbursement.
    if confirmer == receiver_role {
        return ConfirmationDecision::Confirmed;
    }

    ConfirmationDecision::StillPending
}

/// Confirmation notes accumulate; they are appended with a role tag, never
/// overwritten.
pub fn append_note(existing: Option<&str>, role: PartyRole, note: &str) -> String {
    match existing {
        Some(prior) if !prior.is_empty() => format!("{}\n{}: {}", prior, role, note),
        _ => format!("{}: {}", role, note),
    }
}

/// True when the repaid aggregate says this payment was redundant: the loan
/// was already covered before it landed. Funds have moved, so this is an
/// anomaly to report, not an error to raise.
pub fn is_overshoot_anomaly(total_repaid: f64, total_payable: f64, last_amount: f64) -> bool {
    total_repaid > total_payable && total_repaid - last_amount >= total_payable
}

// ============================================================================
// ACCOUNT RESOLUTION
// ============================================================================

#[derive(Debug, Default)]
pub struct ResolvedAccounts {
    pub from_account: Option<PaymentAccount>,
    pub to_account: Option<PaymentAccount>,
}

async fn default_account(
    pool: &PgPool,
    user_id: Uuid,
    account_type: lendhand_common::AccountType,
) -> Result<Option<PaymentAccount>, ServiceError> {
    let account = sqlx::query_as::<_, PaymentAccount>(
        "SELECT * FROM payment_accounts \
         WHERE user_id = $1 AND account_type = $2 AND is_default \
         LIMIT 1",
    )
    .bind(user_id)
    .bind(account_type)
    .fetch_optional(pool)
    .await?;
    Ok(account)
}

/// Card charges collect funds through the processor; the inter-party leg
/// still settles over CashApp when both sides have one registered, so those
/// accounts are attached when present but never required.
pub async fn optional_cashapp_accounts(
    pool: &PgPool,
    loan: &Loan,
    payer_role: PartyRole,
) -> Result<ResolvedAccounts, ServiceError> {
    let cashapp = lendhand_common::AccountType::Cashapp;
    Ok(ResolvedAccounts {
        from_account: default_account(pool, loan.party(payer_role), cashapp).await?,
        to_account: default_account(pool, loan.party(payer_role.opposite()), cashapp).await?,
    })
}

/// Resolve both parties' default accounts for rails that need them. Missing
/// accounts fail before any mutation, naming the party that must act.
pub async fn resolve_accounts(
    pool: &PgPool,
    loan: &Loan,
    method: PaymentMethod,
    payer_role: PartyRole,
) -> Result<ResolvedAccounts, ServiceError> {
    let Some(account_type) = method.account_type().filter(|_| method.requires_accounts()) else {
        return Ok(ResolvedAccounts::default());
    };

    let receiver_role = payer_role.opposite();

    let from_account = default_account(pool, loan.party(payer_role), account_type).await?;
    let Some(from_account) = from_account else {
        return Err(ServiceError::MissingAccount {
            role: payer_role.as_str().to_lowercase(),
        });
    };

    let to_account = default_account(pool, loan.party(receiver_role), account_type).await?;
    let Some(to_account) = to_account else {
        return Err(ServiceError::MissingAccount {
            role: receiver_role.as_str().to_lowercase(),
        });
    };

    Ok(ResolvedAccounts {
        from_account: Some(from_account),
        to_account: Some(to_account),
    })
}

// ============================================================================
// PAYMENT TERMINAL-STATE TRANSITIONS
// ============================================================================

/// Mark a payment terminally successful. The update is guarded by the prior
/// transfer state; a payment that already completed is returned unchanged so
/// repeated confirmations stay idempotent.
pub async fn complete_payment(
    pool: &PgPool,
    metrics: &ServiceMetrics,
    payment_id: Uuid,
    external_transaction_id: Option<&str>,
) -> Result<Payment, ServiceError> {
    let updated = sqlx::query_as::<_, Payment>(
        "UPDATE payments \
         SET confirmed = TRUE, transfer_status = 'COMPLETED', \
             external_transaction_id = COALESCE($2, external_transaction_id) \
         WHERE id = $1 AND transfer_status IN ('PENDING', 'PROCESSING') \
         RETURNING *",
    )
    .bind(payment_id)
    .bind(external_transaction_id)
    .fetch_optional(pool)
    .await?;

    if let Some(payment) = updated {
        metrics.record_settlement("completed");
        log_settlement(payment.id, payment.loan_id, "completed");
        return Ok(payment);
    }

    let existing = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
        .bind(payment_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Payment not found".to_string()))?;

    match existing.transfer_status {
        lendhand_common::TransferStatus::Completed => Ok(existing),
        _ => Err(ServiceError::Conflict(format!(
            "Payment cannot complete from state {:?}",
            existing.transfer_status
        ))),
    }
}

/// Mark a payment failed after a rail rejection. The loan is never touched.
pub async fn fail_payment(
    pool: &PgPool,
    metrics: &ServiceMetrics,
    payment_id: Uuid,
) -> Result<(), ServiceError> {
    sqlx::query(
        "UPDATE payments SET transfer_status = 'FAILED' \
         WHERE id = $1 AND transfer_status IN ('PENDING', 'PROCESSING')",
    )
    .bind(payment_id)
    .execute(pool)
    .await?;
    metrics.record_settlement("failed");
    Ok(())
}

// ============================================================================
// LOAN LIFECYCLE
// ============================================================================

/// Apply the loan-side consequence of a terminally successful payment.
/// Failures here must not roll back the already-recorded confirmation: they
/// are logged as reconciliation anomalies and swallowed.
pub async fn apply_loan_lifecycle(pool: &PgPool, metrics: &ServiceMetrics, payment: &Payment) {
    if let Err(e) = try_apply_loan_lifecycle(pool, metrics, payment).await {
        metrics.reconciliation_anomalies_total.inc();
        log_reconciliation_anomaly(
            payment.loan_id,
            &format!(
                "lifecycle update failed after confirmed payment {}: {}",
                payment.id, e
            ),
        );
        audit::record(
            pool,
            None,
            AuditAction::ReconciliationAnomaly,
            serde_json::json!({
                "loanId": payment.loan_id,
                "paymentId": payment.id,
                "error": e.to_string(),
            }),
        );
    }
}

async fn try_apply_loan_lifecycle(
    pool: &PgPool,
    metrics: &ServiceMetrics,
    payment: &Payment,
) -> Result<(), ServiceError> {
    let mut tx = pool.begin().await?;

    // Serialize per loan: everything from the aggregate read to the status
    // write happens under the loan's row lock.
    let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
        .bind(payment.loan_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Loan not found".to_string()))?;

    if payment.is_funding() {
        if loan.status == LoanStatus::Funded {
            tx.commit().await?;
            return Ok(());
        }
        if !loan.status.can_transition_to(LoanStatus::Funded) {
            tx.commit().await?;
            metrics.reconciliation_anomalies_total.inc();
            log_reconciliation_anomaly(
                loan.id,
                &format!(
                    "funding payment {} confirmed while loan is {}",
                    payment.id, loan.status
                ),
            );
            return Ok(());
        }

        sqlx::query("UPDATE loans SET status = 'FUNDED', updated_at = NOW() WHERE id = $1")
            .bind(loan.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        metrics.record_loan_transition("FUNDED");
        tracing::info!(loan_id = %loan.id, payment_id = %payment.id, "loan funded");
        audit::record(
            pool,
            None,
            AuditAction::LoanFunded,
            serde_json::json!({ "loanId": loan.id, "paymentId": payment.id }),
        );
        let _ = notify(
            pool,
            loan.borrower_id,
            Some(loan.id),
            "LOAN_FUNDED",
            &format!("Your loan of ${} has been funded.", loan.amount),
        )
        .await;
        return Ok(());
    }

    // Repayment: always a fresh full aggregate over confirmed borrower->lender
    // payments, re-derivable from payment history alone.
    let total_repaid: f64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0.0) FROM payments \
         WHERE loan_id = $1 AND confirmed \
         AND payer_role = 'BORROWER' AND receiver_role = 'LENDER'",
    )
    .bind(loan.id)
    .fetch_one(&mut *tx)
    .await?;

    if total_repaid < loan.total_payable {
        tx.commit().await?;
        tracing::info!(
            loan_id = %loan.id,
            total_repaid = total_repaid,
            total_payable = loan.total_payable,
            "repayment recorded, loan not yet covered"
        );
        return Ok(());
    }

    if loan.status == LoanStatus::Completed {
        tx.commit().await?;
        return Ok(());
    }
    if !loan.status.can_transition_to(LoanStatus::Completed) {
        tx.commit().await?;
        metrics.reconciliation_anomalies_total.inc();
        log_reconciliation_anomaly(
            loan.id,
            &format!(
                "repayments cover total_payable but loan is {} (payment {})",
                loan.status, payment.id
            ),
        );
        return Ok(());
    }

    let disputed_payments: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payments \
         WHERE loan_id = $1 AND manual_confirmation_status = 'DISPUTED'",
    )
    .bind(loan.id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE loans SET status = 'COMPLETED', updated_at = NOW() WHERE id = $1")
        .bind(loan.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    metrics.record_loan_transition("COMPLETED");
    tracing::info!(
        loan_id = %loan.id,
        total_repaid = total_repaid,
        total_payable = loan.total_payable,
        "loan completed"
    );
    audit::record(
        pool,
        None,
        AuditAction::LoanCompleted,
        serde_json::json!({
            "loanId": loan.id,
            "totalRepaid": total_repaid,
            "totalPayable": loan.total_payable,
        }),
    );

    if is_overshoot_anomaly(total_repaid, loan.total_payable, payment.amount) {
        metrics.reconciliation_anomalies_total.inc();
        log_reconciliation_anomaly(
            loan.id,
            &format!(
                "repaid total ${} exceeds payable ${} before payment {}",
                total_repaid, loan.total_payable, payment.id
            ),
        );
    }
    if disputed_payments > 0 {
        metrics.reconciliation_anomalies_total.inc();
        log_reconciliation_anomaly(
            loan.id,
            &format!(
                "loan completed with {} disputed payment(s) outstanding",
                disputed_payments
            ),
        );
    }

    let message = format!("Loan of ${} has been fully repaid.", loan.amount);
    for user_id in [loan.lender_id, loan.borrower_id] {
        let _ = notify(pool, user_id, Some(loan.id), "LOAN_COMPLETED", &message).await;
    }

    Ok(())
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

pub async fn notify(
    pool: &PgPool,
    user_id: Uuid,
    loan_id: Option<Uuid>,
    kind: &str,
    message: &str,
) -> Result<(), ServiceError> {
    sqlx::query("INSERT INTO notifications (user_id, loan_id, kind, message) VALUES ($1, $2, $3, $4)")
        .bind(user_id)
        .bind(loan_id)
        .bind(kind)
        .bind(message)
        .execute(pool)
        .await?;
    Ok(())
}

/// The dual-attestation fan-out: CONFIRMED tells both parties, DISPUTED tells
/// the non-disputer, a partial confirmation tells whoever has not responded.
pub async fn notify_confirmation_outcome(
    pool: &PgPool,
    loan: &Loan,
    payment: &Payment,
    confirmer: PartyRole,
    decision: ConfirmationDecision,
) {
    let other_user = loan.party(confirmer.opposite());
    let result = match decision {
        ConfirmationDecision::Confirmed => {
            let message = format!(
                "Payment of ${} has been confirmed by both parties.",
                payment.amount
            );
            let mut result = notify(pool, loan.lender_id, Some(loan.id), "PAYMENT_CONFIRMED", &message).await;
            if result.is_ok() {
                result =
                    notify(pool, loan.borrower_id, Some(loan.id), "PAYMENT_CONFIRMED", &message).await;
            }
            result
        }
        ConfirmationDecision::Disputed => {
            notify(
                pool,
                other_user,
                Some(loan.id),
                "PAYMENT_DISPUTED",
                &format!(
                    "Payment of ${} has been disputed. Please review.",
                    payment.amount
                ),
            )
            .await
        }
        ConfirmationDecision::StillPending => {
            notify(
                pool,
                other_user,
                Some(loan.id),
                "PAYMENT_CONFIRMED",
                &format!(
                    "Payment of ${} has been confirmed by {}. Waiting for your confirmation.",
                    payment.amount, confirmer
                ),
            )
            .await
        }
    };

    if let Err(e) = result {
        tracing::warn!(payment_id = %payment.id, error = %e, "confirmation notification failed");
    }
}

/// Record the confirmer's flag and the decision's fields in one guarded
/// statement under the payment row lock taken by the caller's transaction.
pub fn confirmation_update_sql(confirmer: PartyRole, decision: ConfirmationDecision) -> String {
    let flag_column = match confirmer {
        PartyRole::Lender => "lender_confirmed",
        PartyRole::Borrower => "borrower_confirmed",
    };
    let outcome = match decision {
        ConfirmationDecision::Disputed => {
            "manual_confirmation_status = 'DISPUTED', confirmed = FALSE"
        }
        ConfirmationDecision::Confirmed => {
            "manual_confirmation_status = 'CONFIRMED', confirmed = TRUE, transfer_status = 'COMPLETED'"
        }
        ConfirmationDecision::StillPending => {
            "manual_confirmation_status = 'PENDING_CONFIRMATION'"
        }
    };
    format!(
        "UPDATE payments SET {} = $2, confirmation_note = $3, {} WHERE id = $1 RETURNING *",
        flag_column, outcome
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // Repayment: borrower pays, lender receives.
    const REPAYMENT_RECEIVER: PartyRole = PartyRole::Lender;
    // Funding: lender pays, borrower receives.
    const FUNDING_RECEIVER: PartyRole = PartyRole::Borrower;

    #[test]
    fn test_dispute_overrides_prior_confirmation() {
        // Lender already confirmed; borrower disputes anyway.
        let decision =
            decide_confirmation(REPAYMENT_RECEIVER, true, false, PartyRole::Borrower, false);
        assert_eq!(decision, ConfirmationDecision::Disputed);
    }

    #[test]
    fn test_dispute_from_either_party() {
        let decision =
            decide_confirmation(FUNDING_RECEIVER, false, true, PartyRole::Lender, false);
        assert_eq!(decision, ConfirmationDecision::Disputed);
    }

    #[test]
    fn test_both_flags_confirm() {
        // Borrower confirmed earlier; lender's confirmation closes it.
        let decision =
            decide_confirmation(FUNDING_RECEIVER, false, true, PartyRole::Lender, true);
        assert_eq!(decision, ConfirmationDecision::Confirmed);
    }

    #[test]
    fn test_receiver_fast_path_repayment() {
        // Lender confirms receipt of a repayment; borrower's flag untouched.
        let decision =
            decide_confirmation(REPAYMENT_RECEIVER, false, false, PartyRole::Lender, true);
        assert_eq!(decision, ConfirmationDecision::Confirmed);
    }

    #[test]
    fn test_receiver_fast_path_funding() {
        // Borrower confirms receipt of funding; lender's flag untouched.
        let decision =
            decide_confirmation(FUNDING_RECEIVER, false, false, PartyRole::Borrower, true);
        assert_eq!(decision, ConfirmationDecision::Confirmed);
    }

    #[test]
    fn test_payer_confirmation_alone_stays_pending() {
        // Borrower (payer) confirms their own repayment; still waiting.
        let decision =
            decide_confirmation(REPAYMENT_RECEIVER, false, false, PartyRole::Borrower, true);
        assert_eq!(decision, ConfirmationDecision::StillPending);

        // Lender (payer) confirms their own funding; still waiting.
        let decision =
            decide_confirmation(FUNDING_RECEIVER, false, false, PartyRole::Lender, true);
        assert_eq!(decision, ConfirmationDecision::StillPending);
    }

    #[test]
    fn test_append_note_tags_and_accumulates() {
        let first = append_note(None, PartyRole::Borrower, "sent via cashapp");
        assert_eq!(first, "BORROWER: sent via cashapp");
        let second = append_note(Some(&first), PartyRole::Lender, "received");
        assert_eq!(second, "BORROWER: sent via cashapp\nLENDER: received");
    }

    #[test]
    fn test_overshoot_detection() {
        // 30 + 25 against 55: exact cover, no anomaly.
        assert!(!is_overshoot_anomaly(55.0, 55.0, 25.0));
        // 55 already repaid, then another 20 lands: anomaly.
        assert!(is_overshoot_anomaly(75.0, 55.0, 20.0));
        // 40 + 20 against 55: overshoot of 5 from the covering payment is fine.
        assert!(!is_overshoot_anomaly(60.0, 55.0, 20.0));
    }

    #[test]
    fn test_confirmation_update_sql_shapes() {
        let sql = confirmation_update_sql(PartyRole::Lender, ConfirmationDecision::Confirmed);
        assert!(sql.contains("lender_confirmed = $2"));
        assert!(sql.contains("'CONFIRMED'"));
        assert!(sql.contains("transfer_status = 'COMPLETED'"));

        let sql = confirmation_update_sql(PartyRole::Borrower, ConfirmationDecision::Disputed);
        assert!(sql.contains("borrower_confirmed = $2"));
        assert!(sql.contains("'DISPUTED'"));
        assert!(sql.contains("confirmed = FALSE"));

        let sql = confirmation_update_sql(PartyRole::Borrower, ConfirmationDecision::StillPending);
        assert!(sql.contains("'PENDING_CONFIRMATION'"));
        assert!(!sql.contains("transfer_status"));
    }
}
