// core/payment-service/src/accounts.rs
// Payment-account CRUD, scoped to the authenticated user

use actix_web::{web, HttpResponse};
use lendhand_common::{
    domain::PaymentAccount, validate_cashtag, validate_email, validate_zelle_contact,
    AccountType, AuthedUser, ServiceError,
};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub account_type: AccountType,
    pub cash_app_handle: Option<String>,
    pub paypal_email: Option<String>,
    pub zelle_contact: Option<String>,
    pub account_nickname: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    pub account_nickname: Option<String>,
    pub is_default: Option<bool>,
}

fn rail_identifier_name(account_type: AccountType) -> &'static str {
    match account_type {
        AccountType::Cashapp => "CashApp handle",
        AccountType::Paypal => "PayPal email",
        AccountType::Zelle => "Zelle contact",
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map_or(false, |code| code == "23505")
}

pub async fn list_accounts(
    pool: web::Data<PgPool>,
    user: AuthedUser,
) -> Result<HttpResponse, ServiceError> {
    let accounts: Vec<PaymentAccount> = sqlx::query_as(
        "SELECT * FROM payment_accounts WHERE user_id = $1 \
         ORDER BY is_default DESC, created_at DESC",
    )
    .bind(user.0)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "paymentAccounts": accounts })))
}

pub async fn create_account(
    pool: web::Data<PgPool>,
    user: AuthedUser,
    request: web::Json<CreateAccountRequest>,
) -> Result<HttpResponse, ServiceError> {
    // Rail-specific identifier shape, checked before any write.
    match request.account_type {
        AccountType::Cashapp => {
            let handle = request.cash_app_handle.as_deref().ok_or_else(|| {
                ServiceError::Validation(
                    "CashApp handle is required (e.g. $johndoe)".to_string(),
                )
            })?;
            validate_cashtag(handle)?;
        }
        AccountType::Paypal => {
            let email = request.paypal_email.as_deref().ok_or_else(|| {
                ServiceError::Validation("PayPal email address is required".to_string())
            })?;
            validate_email(email)?;
        }
        AccountType::Zelle => {
            let contact = request.zelle_contact.as_deref().ok_or_else(|| {
                ServiceError::Validation("Zelle contact is required".to_string())
            })?;
            validate_zelle_contact(contact)?;
        }
    }

    let mut tx = pool.begin().await?;

    // Setting a new default atomically clears any prior default of the same
    // rail for this user.
    if request.is_default {
        sqlx::query(
            "UPDATE payment_accounts SET is_default = FALSE \
             WHERE user_id = $1 AND account_type = $2",
        )
        .bind(user.0)
        .bind(request.account_type)
        .execute(&mut *tx)
        .await?;
    }

    let inserted = sqlx::query_as::<_, PaymentAccount>(
        "INSERT INTO payment_accounts ( \
            user_id, account_type, cash_app_handle, paypal_email, zelle_contact, \
            account_nickname, is_default, is_verified \
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE) \
         RETURNING *",
    )
    .bind(user.0)
    .bind(request.account_type)
    .bind(request.cash_app_handle.as_deref())
    .bind(request.paypal_email.as_deref())
    .bind(request.zelle_contact.as_deref())
    .bind(request.account_nickname.as_deref())
    .bind(request.is_default)
    .fetch_one(&mut *tx)
    .await;

    let account = match inserted {
        Ok(account) => account,
        Err(e) if is_unique_violation(&e) => {
            return Err(ServiceError::Conflict(format!(
                "This {} is already linked to your account",
                rail_identifier_name(request.account_type)
            )));
        }
        Err(e) => return Err(e.into()),
    };

    tx.commit().await?;

    tracing::info!(account_id = %account.id, account_type = account.account_type.as_str(), "payment account added");
    Ok(HttpResponse::Created().json(serde_json::json!({ "paymentAccount": account })))
}

pub async fn update_account(
    pool: web::Data<PgPool>,
    user: AuthedUser,
    account_id: web::Path<Uuid>,
    request: web::Json<UpdateAccountRequest>,
) -> Result<HttpResponse, ServiceError> {
    let account = sqlx::query_as::<_, PaymentAccount>(
        "SELECT * FROM payment_accounts WHERE id = $1 AND user_id = $2",
    )
    .bind(*account_id)
    .bind(user.0)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| ServiceError::NotFound("Payment account not found".to_string()))?;

    let mut tx = pool.begin().await?;

    if request.is_default == Some(true) {
        sqlx::query(
            "UPDATE payment_accounts SET is_default = FALSE \
             WHERE user_id = $1 AND account_type = $2 AND id <> $3",
        )
        .bind(user.0)
        .bind(account.account_type)
        .bind(account.id)
        .execute(&mut *tx)
        .await?;
    }

    let updated: PaymentAccount = sqlx::query_as(
        "UPDATE payment_accounts SET \
            account_nickname = COALESCE($2, account_nickname), \
            is_default = COALESCE($3, is_default) \
         WHERE id = $1 RETURNING *",
    )
    .bind(account.id)
    .bind(request.account_nickname.as_deref())
    .bind(request.is_default)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "paymentAccount": updated })))
}

pub async fn delete_account(
    pool: web::Data<PgPool>,
    user: AuthedUser,
    account_id: web::Path<Uuid>,
) -> Result<HttpResponse, ServiceError> {
    let deleted = sqlx::query("DELETE FROM payment_accounts WHERE id = $1 AND user_id = $2")
        .bind(*account_id)
        .bind(user.0)
        .execute(pool.get_ref())
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(ServiceError::NotFound(
            "Payment account not found".to_string(),
        ));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Payment account deleted successfully"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rail_identifier_names() {
        assert_eq!(rail_identifier_name(AccountType::Cashapp), "CashApp handle");
        assert_eq!(rail_identifier_name(AccountType::Paypal), "PayPal email");
        assert_eq!(rail_identifier_name(AccountType::Zelle), "Zelle contact");
    }
}
