// core/payment-service/src/paypal.rs
// Payout-network rail client. Funding is a two-call flow (create, then
// execute with the payer's approval id); a successful funding execution is
// followed by a payout to the receiver's registered address.

use lendhand_common::{PartyRole, ServiceError};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub payment_id: String,
    pub approval_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExecutedPayment {
    pub transaction_id: String,
}

#[derive(Debug, Clone)]
pub struct PayoutReceipt {
    pub payout_batch_id: String,
}

#[derive(Clone)]
pub struct PayPalClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    api_base: String,
    frontend_url: String,
}

impl PayPalClient {
    pub fn new(
        client_id: String,
        client_secret: String,
        api_base: String,
        frontend_url: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            client_secret,
            api_base,
            frontend_url,
        }
    }

    pub fn from_env() -> Self {
        let environment =
            std::env::var("PAYPAL_ENVIRONMENT").unwrap_or_else(|_| "sandbox".to_string());
        let api_base = if environment == "live" {
            "https://api.paypal.com".to_string()
        } else {
            "https://api.sandbox.paypal.com".to_string()
        };
        Self::new(
            std::env::var("PAYPAL_CLIENT_ID").unwrap_or_default(),
            std::env::var("PAYPAL_CLIENT_SECRET").unwrap_or_default(),
            api_base,
            std::env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:5173".to_string()),
        )
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        if self.client_id.trim().is_empty() || self.client_secret.trim().is_empty() {
            return Err(ServiceError::ExternalRail(
                "PayPal credentials are required".to_string(),
            ));
        }

        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(self.client_id.trim(), Some(self.client_secret.trim()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ServiceError::ExternalRail(format!("PayPal unreachable: {}", e)))?;

        if !response.status().is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            return Err(ServiceError::ExternalRail(format!(
                "PayPal auth failed: {}",
                body.get("error_description")
                    .or_else(|| body.get("error"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown error")
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalRail(format!("Invalid PayPal response: {}", e)))?;
        Ok(token.access_token)
    }

    /// Create a payment awaiting payer approval. Returns the provider payment
    /// id and the URL the payer must visit to approve it.
    pub async fn create_payment(
        &self,
        amount: f64,
        payer_role: PartyRole,
        receiver_role: PartyRole,
        loan_id: Uuid,
    ) -> Result<CreatedPayment, ServiceError> {
        let token = self.access_token().await?;

        let return_url = match payer_role {
            PartyRole::Lender => format!("{}/lender-dashboard", self.frontend_url),
            PartyRole::Borrower => format!("{}/borrower-dashboard", self.frontend_url),
        };

        let body = serde_json::json!({
            "intent": "sale",
            "payer": { "payment_method": "paypal" },
            "transactions": [{
                "amount": { "total": format_amount(amount), "currency": "USD" },
                "description": format!("{} to {} payment for loan {}", payer_role, receiver_role, loan_id),
                "custom": format!("loan_{}", loan_id),
            }],
            "redirect_urls": { "return_url": return_url, "cancel_url": return_url },
        });

        let response = self
            .client
            .post(format!("{}/v1/payments/payment", self.api_base))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalRail(format!("PayPal unreachable: {}", e)))?;

        let status = response.status();
        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalRail(format!("Invalid PayPal response: {}", e)))?;

        if !status.is_success() {
            return Err(ServiceError::ExternalRail(remote_message(
                &result,
                "PayPal payment creation failed",
            )));
        }

        let payment_id = result
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ServiceError::ExternalRail("PayPal response missing payment id".to_string())
            })?
            .to_string();

        Ok(CreatedPayment {
            approval_url: find_approval_url(&result),
            payment_id,
        })
    }

    /// Execute an approved payment. Authoritative only when the remote state
    /// comes back "approved".
    pub async fn execute_payment(
        &self,
        payment_id: &str,
        payer_id: &str,
    ) -> Result<ExecutedPayment, ServiceError> {
        let token = self.access_token().await?;

        let response = self
            .client
            .post(format!(
                "{}/v1/payments/payment/{}/execute",
                self.api_base, payment_id
            ))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "payer_id": payer_id }))
            .send()
            .await
            .map_err(|e| ServiceError::ExternalRail(format!("PayPal unreachable: {}", e)))?;

        let status = response.status();
        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalRail(format!("Invalid PayPal response: {}", e)))?;

        if !status.is_success() {
            return Err(ServiceError::ExternalRail(remote_message(
                &result,
                "PayPal payment execution failed",
            )));
        }

        let state = result.get("state").and_then(|v| v.as_str()).unwrap_or("");
        if state != "approved" {
            return Err(ServiceError::ExternalRail(format!(
                "PayPal payment not approved (state: {})",
                state
            )));
        }

        Ok(ExecutedPayment {
            transaction_id: result
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or(payment_id)
                .to_string(),
        })
    }

    /// Push funds to the receiver's registered address via the payouts API.
    pub async fn send_payout(
        &self,
        amount: f64,
        recipient_email: &str,
        payer_role: PartyRole,
        receiver_role: PartyRole,
        loan_id: Uuid,
    ) -> Result<PayoutReceipt, ServiceError> {
        let token = self.access_token().await?;

        let body = serde_json::json!({
            "sender_batch_header": {
                "sender_batch_id": format!("loan_{}_{}", loan_id, Uuid::new_v4().simple()),
                "email_subject": "You have a payment from Lendhand",
                "email_message": format!("Payment from {} for loan {}", payer_role, loan_id),
            },
            "items": [{
                "recipient_type": "EMAIL",
                "amount": { "value": format_amount(amount), "currency": "USD" },
                "receiver": recipient_email,
                "note": format!("{} to {} payment for loan {}", payer_role, receiver_role, loan_id),
            }],
        });

        let response = self
            .client
            .post(format!("{}/v1/payments/payouts", self.api_base))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalRail(format!("PayPal unreachable: {}", e)))?;

        let status = response.status();
        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalRail(format!("Invalid PayPal response: {}", e)))?;

        if !status.is_success() {
            return Err(ServiceError::ExternalRail(remote_message(
                &result,
                "PayPal payout failed",
            )));
        }

        let payout_batch_id = result
            .get("batch_header")
            .and_then(|h| h.get("payout_batch_id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ServiceError::ExternalRail("PayPal payout response missing batch id".to_string())
            })?
            .to_string();

        tracing::info!(amount = amount, recipient = recipient_email, "PayPal payout sent");
        Ok(PayoutReceipt { payout_batch_id })
    }
}

pub fn format_amount(amount: f64) -> String {
    format!("{:.2}", amount)
}

fn find_approval_url(result: &serde_json::Value) -> Option<String> {
    result
        .get("links")?
        .as_array()?
        .iter()
        .find(|link| link.get("rel").and_then(|r| r.as_str()) == Some("approval_url"))?
        .get("href")?
        .as_str()
        .map(str::to_string)
}

fn remote_message(result: &serde_json::Value, fallback: &str) -> String {
    result
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or(fallback)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount_two_decimals() {
        assert_eq!(format_amount(50.0), "50.00");
        assert_eq!(format_amount(12.5), "12.50");
        assert_eq!(format_amount(0.015), "0.01");
    }

    #[test]
    fn test_find_approval_url() {
        let result = serde_json::json!({
            "id": "PAY-123",
            "links": [
                { "rel": "self", "href": "https://api.sandbox.paypal.com/PAY-123" },
                { "rel": "approval_url", "href": "https://sandbox.paypal.com/approve?token=EC-1" },
                { "rel": "execute", "href": "https://api.sandbox.paypal.com/PAY-123/execute" }
            ]
        });
        assert_eq!(
            find_approval_url(&result).as_deref(),
            Some("https://sandbox.paypal.com/approve?token=EC-1")
        );
        assert!(find_approval_url(&serde_json::json!({ "links": [] })).is_none());
        assert!(find_approval_url(&serde_json::json!({})).is_none());
    }

    #[test]
    fn test_remote_message_fallback() {
        let body = serde_json::json!({ "message": "Payee account is restricted" });
        assert_eq!(remote_message(&body, "fallback"), "Payee account is restricted");
        assert_eq!(remote_message(&serde_json::json!({}), "fallback"), "fallback");
    }
}
