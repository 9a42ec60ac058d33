// core/payment-service/src/handlers.rs
// HTTP surface of the settlement engine

use actix_web::{web, HttpResponse};
use lendhand_common::{
    audit, domain::{Loan, Payment, PaymentAccount},
    validate_amount, validate_note, AuditAction, LenderTerm, PartyRole, PaymentMethod,
    ServiceError, ServiceMetrics,
};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::paypal::PayPalClient;
use crate::settlement::{
    self, append_note, decide_confirmation, ConfirmationDecision,
};
use crate::stripe::StripeClient;

// ============================================================================
// REQUEST SHAPES
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub loan_id: Uuid,
    pub amount: f64,
    pub method: PaymentMethod,
    pub payer_role: PartyRole,
    pub receiver_role: PartyRole,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmStripeRequest {
    pub payment_intent_id: String,
    pub payment_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPayPalRequest {
    /// Provider-side payment id from the create call.
    pub payment_id: String,
    pub payer_id: String,
    pub db_payment_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitManualProofRequest {
    pub payment_id: Uuid,
    pub transaction_id: Option<String>,
    pub note: Option<String>,
    pub screenshot_path: Option<String>,
    pub user_role: PartyRole,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmManualPaymentRequest {
    pub payment_id: Uuid,
    pub confirmed: bool,
    pub user_role: PartyRole,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatePaymentMethodsRequest {
    pub lender_term_id: Uuid,
    pub borrower_id: Uuid,
}

// ============================================================================
// HELPERS
// ============================================================================

async fn fetch_loan(pool: &PgPool, loan_id: Uuid) -> Result<Loan, ServiceError> {
    sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
        .bind(loan_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Loan not found".to_string()))
}

async fn fetch_payment(pool: &PgPool, payment_id: Uuid) -> Result<Payment, ServiceError> {
    sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
        .bind(payment_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Payment not found".to_string()))
}

async fn fetch_account(
    pool: &PgPool,
    account_id: Option<Uuid>,
) -> Result<Option<PaymentAccount>, ServiceError> {
    let Some(account_id) = account_id else {
        return Ok(None);
    };
    let account = sqlx::query_as::<_, PaymentAccount>(
        "SELECT * FROM payment_accounts WHERE id = $1",
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?;
    Ok(account)
}

// ============================================================================
// INITIATE PAYMENT
// ============================================================================

pub async fn initiate_payment(
    pool: web::Data<PgPool>,
    metrics: web::Data<ServiceMetrics>,
    stripe: web::Data<StripeClient>,
    paypal: web::Data<PayPalClient>,
    request: web::Json<InitiatePaymentRequest>,
) -> Result<HttpResponse, ServiceError> {
    validate_amount(request.amount)?;
    if request.payer_role == request.receiver_role {
        return Err(ServiceError::Validation(
            "payerRole and receiverRole must be opposite parties".to_string(),
        ));
    }

    let loan = fetch_loan(pool.get_ref(), request.loan_id).await?;

    let accounts = if request.method == PaymentMethod::Card {
        settlement::optional_cashapp_accounts(pool.get_ref(), &loan, request.payer_role).await?
    } else {
        settlement::resolve_accounts(pool.get_ref(), &loan, request.method, request.payer_role)
            .await?
    };

    let payment: Payment = sqlx::query_as(
        "INSERT INTO payments ( \
            loan_id, amount, method, payer_role, receiver_role, \
            confirmed, transfer_status, manual_confirmation_status, \
            from_account_id, to_account_id \
         ) VALUES ($1, $2, $3, $4, $5, FALSE, 'PENDING', $6, $7, $8) \
         RETURNING *",
    )
    .bind(loan.id)
    .bind(request.amount)
    .bind(request.method)
    .bind(request.payer_role)
    .bind(request.receiver_role)
    .bind(request.method.initial_manual_status())
    .bind(accounts.from_account.as_ref().map(|a| a.id))
    .bind(accounts.to_account.as_ref().map(|a| a.id))
    .fetch_one(pool.get_ref())
    .await?;

    metrics.record_initiation(request.method.as_str());
    audit::record(
        pool.get_ref(),
        Some(loan.party(request.payer_role)),
        AuditAction::PaymentInitiated,
        serde_json::json!({
            "paymentId": payment.id,
            "loanId": loan.id,
            "amount": payment.amount,
            "method": payment.method.as_str(),
        }),
    );

    // Manual rails record intent only; settlement is driven by the
    // dual-attestation calls. Lender-initiated funding advances the loan
    // immediately (accepted design risk: the loan reads FUNDED before money
    // has verifiably moved).
    if request.method.is_manual() {
        if request.payer_role == PartyRole::Lender {
            let updated = sqlx::query(
                "UPDATE loans SET status = 'FUNDED', updated_at = NOW() \
                 WHERE id = $1 AND status = 'PENDING'",
            )
            .bind(loan.id)
            .execute(pool.get_ref())
            .await?;
            if updated.rows_affected() > 0 {
                metrics.record_loan_transition("FUNDED");
                tracing::info!(loan_id = %loan.id, method = %request.method, "loan funded at manual initiation");
            }
        }
        return Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "payment": payment,
            "requiresManualConfirmation": true,
            "message": format!(
                "Please proceed with the manual {} transfer and provide confirmation",
                request.method
            ),
        })));
    }

    match request.method {
        PaymentMethod::InternalWallet => {
            let transaction_id = format!("internal_{}", Uuid::new_v4().simple());
            let completed = settlement::complete_payment(
                pool.get_ref(),
                metrics.get_ref(),
                payment.id,
                Some(&transaction_id),
            )
            .await?;
            settlement::apply_loan_lifecycle(pool.get_ref(), metrics.get_ref(), &completed).await;

            Ok(HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "payment": completed,
                "transactionId": transaction_id,
            })))
        }
        PaymentMethod::Card => {
            let description = format!(
                "{} to {} payment for loan {}",
                request.payer_role, request.receiver_role, loan.id
            );
            let intent = match stripe.create_payment_intent(request.amount, &description).await {
                Ok(intent) => intent,
                Err(e) => {
                    settlement::fail_payment(pool.get_ref(), metrics.get_ref(), payment.id).await?;
                    return Err(e);
                }
            };

            sqlx::query("UPDATE payments SET external_transaction_id = $2 WHERE id = $1")
                .bind(payment.id)
                .bind(&intent.id)
                .execute(pool.get_ref())
                .await?;

            Ok(HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "payment": payment,
                "clientSecret": intent.client_secret,
                "transactionId": intent.id,
                "requiresAction": true,
            })))
        }
        PaymentMethod::Paypal => {
            let created = match paypal
                .create_payment(request.amount, request.payer_role, request.receiver_role, loan.id)
                .await
            {
                Ok(created) => created,
                Err(e) => {
                    settlement::fail_payment(pool.get_ref(), metrics.get_ref(), payment.id).await?;
                    return Err(e);
                }
            };

            sqlx::query("UPDATE payments SET external_transaction_id = $2 WHERE id = $1")
                .bind(payment.id)
                .bind(&created.payment_id)
                .execute(pool.get_ref())
                .await?;

            Ok(HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "payment": payment,
                "approvalUrl": created.approval_url,
                "paymentId": created.payment_id,
                "requiresAction": true,
            })))
        }
        // Manual methods returned above.
        PaymentMethod::Cashapp | PaymentMethod::Zelle => unreachable!(),
    }
}

// ============================================================================
// TWO-PHASE CONFIRMATIONS
// ============================================================================

pub async fn confirm_stripe(
    pool: web::Data<PgPool>,
    metrics: web::Data<ServiceMetrics>,
    stripe: web::Data<StripeClient>,
    request: web::Json<ConfirmStripeRequest>,
) -> Result<HttpResponse, ServiceError> {
    let intent = stripe.retrieve_intent(&request.payment_intent_id).await?;
    if !intent.succeeded() {
        return Err(ServiceError::ExternalRail(format!(
            "Payment status: {}",
            intent.status
        )));
    }

    // Existence check before mutation; 404 beats a silent no-op here.
    let payment = fetch_payment(pool.get_ref(), request.payment_id).await?;
    let completed = settlement::complete_payment(
        pool.get_ref(),
        metrics.get_ref(),
        payment.id,
        Some(&intent.id),
    )
    .await?;

    // The card charge collects the funds; the actual rail transfer between
    // the parties' accounts is still manual, so tell the payer what to send.
    let loan = fetch_loan(pool.get_ref(), completed.loan_id).await?;
    let from_account = fetch_account(pool.get_ref(), completed.from_account_id).await?;
    let to_account = fetch_account(pool.get_ref(), completed.to_account_id).await?;
    if let (Some(_), Some(to_account)) = (from_account, to_account) {
        if let Some(handle) = &to_account.cash_app_handle {
            let counterparty = completed.receiver_role.as_str().to_lowercase();
            let purpose = if completed.is_funding() {
                "loan funding"
            } else {
                "loan repayment"
            };
            let message = format!(
                "Please manually send ${} via CashApp to {} ({}) to complete the {}.",
                completed.amount, handle, counterparty, purpose
            );
            if let Err(e) = settlement::notify(
                pool.get_ref(),
                loan.party(completed.payer_role),
                Some(loan.id),
                "PAYMENT_CONFIRMED",
                &message,
            )
            .await
            {
                tracing::warn!(payment_id = %completed.id, error = %e, "transfer notification failed");
            }
        }
    }

    settlement::apply_loan_lifecycle(pool.get_ref(), metrics.get_ref(), &completed).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "payment": completed,
    })))
}

pub async fn confirm_paypal(
    pool: web::Data<PgPool>,
    metrics: web::Data<ServiceMetrics>,
    paypal: web::Data<PayPalClient>,
    request: web::Json<ConfirmPayPalRequest>,
) -> Result<HttpResponse, ServiceError> {
    let executed = paypal
        .execute_payment(&request.payment_id, &request.payer_id)
        .await?;

    let payment = fetch_payment(pool.get_ref(), request.db_payment_id).await?;

    // Funds are with the platform; the payout leg is still outstanding.
    sqlx::query(
        "UPDATE payments \
         SET confirmed = TRUE, transfer_status = 'PROCESSING', external_transaction_id = $2 \
         WHERE id = $1 AND transfer_status = 'PENDING'",
    )
    .bind(payment.id)
    .bind(&executed.transaction_id)
    .execute(pool.get_ref())
    .await?;

    let to_account = fetch_account(pool.get_ref(), payment.to_account_id).await?;
    let recipient_email = to_account.and_then(|a| a.paypal_email);

    let completed = if payment.is_funding() {
        match recipient_email {
            // No registered payout destination; the charge stands, the
            // payout is resolved out of band.
            None => {
                settlement::complete_payment(pool.get_ref(), metrics.get_ref(), payment.id, None)
                    .await?
            }
            Some(email) => {
                match paypal
                    .send_payout(
                        payment.amount,
                        &email,
                        payment.payer_role,
                        payment.receiver_role,
                        payment.loan_id,
                    )
                    .await
                {
                    Ok(receipt) => {
                        settlement::complete_payment(
                            pool.get_ref(),
                            metrics.get_ref(),
                            payment.id,
                            Some(&receipt.payout_batch_id),
                        )
                        .await?
                    }
                    Err(e) => {
                        settlement::fail_payment(pool.get_ref(), metrics.get_ref(), payment.id)
                            .await?;
                        tracing::warn!(payment_id = %payment.id, error = %e, "funding payout failed");
                        return Err(e);
                    }
                }
            }
        }
    } else {
        let completed =
            settlement::complete_payment(pool.get_ref(), metrics.get_ref(), payment.id, None)
                .await?;
        // Repayment reached the platform; forward it to the lender's
        // registered address when one exists. A payout failure here does not
        // undo the repayment.
        if let Some(email) = recipient_email {
            match paypal
                .send_payout(
                    payment.amount,
                    &email,
                    payment.payer_role,
                    payment.receiver_role,
                    payment.loan_id,
                )
                .await
            {
                Ok(receipt) => {
                    sqlx::query(
                        "UPDATE payments SET external_transaction_id = $2 WHERE id = $1",
                    )
                    .bind(payment.id)
                    .bind(&receipt.payout_batch_id)
                    .execute(pool.get_ref())
                    .await?;
                }
                Err(e) => {
                    tracing::warn!(payment_id = %payment.id, error = %e, "repayment payout to lender failed");
                }
            }
        }
        completed
    };

    settlement::apply_loan_lifecycle(pool.get_ref(), metrics.get_ref(), &completed).await;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "payment": completed,
    })))
}

// ============================================================================
// MANUAL DUAL-ATTESTATION
// ============================================================================

pub async fn submit_manual_proof(
    pool: web::Data<PgPool>,
    request: web::Json<SubmitManualProofRequest>,
) -> Result<HttpResponse, ServiceError> {
    if let Some(note) = &request.note {
        validate_note(note)?;
    }

    let payment = fetch_payment(pool.get_ref(), request.payment_id).await?;
    if !payment.method.is_manual() {
        return Err(ServiceError::Validation(format!(
            "{} payments do not take manual proof",
            payment.method
        )));
    }

    // Re-submission overwrites whichever proof fields are provided.
    let updated: Payment = sqlx::query_as(
        "UPDATE payments SET \
            external_transaction_id = COALESCE($2, external_transaction_id), \
            confirmation_note = COALESCE($3, confirmation_note), \
            confirmation_screenshot = COALESCE($4, confirmation_screenshot), \
            manual_confirmation_status = 'PENDING_CONFIRMATION' \
         WHERE id = $1 RETURNING *",
    )
    .bind(payment.id)
    .bind(request.transaction_id.as_deref())
    .bind(request.note.as_deref())
    .bind(request.screenshot_path.as_deref())
    .fetch_one(pool.get_ref())
    .await?;

    let loan = fetch_loan(pool.get_ref(), payment.loan_id).await?;
    let submitter = loan.party(request.user_role);
    let counterparty = loan.party(request.user_role.opposite());

    audit::record(
        pool.get_ref(),
        Some(submitter),
        AuditAction::PaymentProofSubmitted,
        serde_json::json!({
            "paymentId": payment.id,
            "amount": payment.amount,
            "submittedBy": request.user_role.as_str(),
        }),
    );

    settlement::notify(
        pool.get_ref(),
        counterparty,
        Some(loan.id),
        "PAYMENT_PROOF_SUBMITTED",
        &format!(
            "Payment proof submitted for {} payment of ${}. Please review and confirm.",
            payment.method, payment.amount
        ),
    )
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Payment proof submitted successfully",
        "payment": updated,
    })))
}

pub async fn confirm_manual_payment(
    pool: web::Data<PgPool>,
    metrics: web::Data<ServiceMetrics>,
    request: web::Json<ConfirmManualPaymentRequest>,
) -> Result<HttpResponse, ServiceError> {
    if let Some(note) = &request.note {
        validate_note(note)?;
    }

    // The decision reads the stored flags, so flag read and write happen
    // under the payment's row lock to keep racing confirmations serialized.
    let mut tx = pool.begin().await?;

    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1 FOR UPDATE")
        .bind(request.payment_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Payment not found".to_string()))?;

    if !payment.method.is_manual() {
        return Err(ServiceError::Validation(format!(
            "{} payments are not manually confirmed",
            payment.method
        )));
    }

    let decision = decide_confirmation(
        payment.receiver_role,
        payment.lender_confirmed,
        payment.borrower_confirmed,
        request.user_role,
        request.confirmed,
    );

    let new_note = match request.note.as_deref().map(str::trim) {
        Some(note) if !note.is_empty() => Some(append_note(
            payment.confirmation_note.as_deref(),
            request.user_role,
            note,
        )),
        _ => payment.confirmation_note.clone(),
    };

    let sql = settlement::confirmation_update_sql(request.user_role, decision);
    let updated: Payment = sqlx::query_as(&sql)
        .bind(payment.id)
        .bind(request.confirmed)
        .bind(new_note.as_deref())
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    let loan = fetch_loan(pool.get_ref(), updated.loan_id).await?;
    let confirmer_id = loan.party(request.user_role);

    match decision {
        ConfirmationDecision::Confirmed => {
            metrics.record_settlement("completed");
            settlement::apply_loan_lifecycle(pool.get_ref(), metrics.get_ref(), &updated).await;
            audit::record(
                pool.get_ref(),
                Some(confirmer_id),
                AuditAction::PaymentConfirmed,
                serde_json::json!({
                    "paymentId": updated.id,
                    "amount": updated.amount,
                    "confirmedBy": request.user_role.as_str(),
                }),
            );
        }
        ConfirmationDecision::Disputed => {
            metrics.record_settlement("disputed");
            audit::record(
                pool.get_ref(),
                Some(confirmer_id),
                AuditAction::PaymentDisputed,
                serde_json::json!({
                    "paymentId": updated.id,
                    "amount": updated.amount,
                    "disputedBy": request.user_role.as_str(),
                }),
            );
        }
        ConfirmationDecision::StillPending => {}
    }

    settlement::notify_confirmation_outcome(
        pool.get_ref(),
        &loan,
        &updated,
        request.user_role,
        decision,
    )
    .await;

    let verb = if request.confirmed { "confirmed" } else { "disputed" };
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": format!("Payment {} successfully", verb),
        "payment": updated,
    })))
}

// ============================================================================
// QUERIES
// ============================================================================

pub async fn get_loan_payments(
    pool: web::Data<PgPool>,
    loan_id: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let payments: Vec<Payment> = sqlx::query_as(
        "SELECT * FROM payments WHERE loan_id = $1 ORDER BY created_at DESC",
    )
    .bind(*loan_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "payments": payments })))
}

pub async fn get_payment_details(
    pool: web::Data<PgPool>,
    payment_id: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let payment = fetch_payment(pool.get_ref(), *payment_id).await?;
    let loan = fetch_loan(pool.get_ref(), payment.loan_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "payment": payment,
        "loan": loan,
    })))
}

pub async fn validate_payment_methods(
    pool: web::Data<PgPool>,
    request: web::Json<ValidatePaymentMethodsRequest>,
) -> Result<HttpResponse, ServiceError> {
    let term = sqlx::query_as::<_, LenderTerm>("SELECT * FROM lender_terms WHERE id = $1")
        .bind(request.lender_term_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| ServiceError::NotFound("Lender term not found".to_string()))?;

    let preferred: Vec<PaymentMethod> = term
        .preferred_payment_methods
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();

    if preferred.is_empty() || !term.require_matching_payment_method {
        return Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "valid": true,
            "message": "All payment methods allowed",
        })));
    }

    let accounts: Vec<PaymentAccount> = sqlx::query_as(
        "SELECT * FROM payment_accounts WHERE user_id = $1 AND is_verified",
    )
    .bind(request.borrower_id)
    .fetch_all(pool.get_ref())
    .await?;

    let borrower_types: Vec<_> = accounts.iter().map(|a| a.account_type).collect();
    let valid = preferred.iter().any(|method| {
        method
            .account_type()
            .map_or(false, |t| borrower_types.contains(&t))
    });

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "valid": valid,
        "preferredMethods": preferred,
        "borrowerMethods": borrower_types,
        "message": if valid {
            "Borrower has matching payment method"
        } else {
            "Borrower does not have any of the preferred payment methods"
        },
    })))
}
