// core/payment-service/src/stripe.rs
// Card-processor rail client. Two-phase: create a payment intent, then the
// client completes it and we retrieve the authoritative status.

use lendhand_common::ServiceError;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub status: String,
}

impl PaymentIntent {
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: String, api_base: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key,
            api_base,
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
        )
    }

    fn ensure_key(&self) -> Result<(), ServiceError> {
        if self.secret_key.trim().is_empty() {
            return Err(ServiceError::ExternalRail(
                "Stripe secret key is required".to_string(),
            ));
        }
        if !self.secret_key.starts_with("sk_") {
            return Err(ServiceError::ExternalRail(
                "Invalid Stripe secret key format".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a pending intent. The returned client secret lets the payer
    /// complete the charge client-side; nothing has settled yet.
    pub async fn create_payment_intent(
        &self,
        amount: f64,
        description: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        self.ensure_key()?;

        let cents = amount_to_cents(amount);
        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[
                ("amount", cents.to_string()),
                ("currency", "usd".to_string()),
                ("description", description.to_string()),
                ("automatic_payment_methods[enabled]", "true".to_string()),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::ExternalRail(format!("Stripe unreachable: {}", e)))?;

        parse_stripe_response(response).await
    }

    /// Retrieve an intent. Authoritative only when status == "succeeded".
    pub async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, ServiceError> {
        self.ensure_key()?;

        let response = self
            .client
            .get(format!("{}/v1/payment_intents/{}", self.api_base, intent_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalRail(format!("Stripe unreachable: {}", e)))?;

        parse_stripe_response(response).await
    }
}

pub fn amount_to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

async fn parse_stripe_response(response: reqwest::Response) -> Result<PaymentIntent, ServiceError> {
    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| ServiceError::ExternalRail(format!("Invalid Stripe response: {}", e)))?;

    if !status.is_success() {
        return Err(ServiceError::ExternalRail(extract_error_message(&body)));
    }

    serde_json::from_value(body)
        .map_err(|e| ServiceError::ExternalRail(format!("Invalid Stripe response: {}", e)))
}

fn extract_error_message(body: &serde_json::Value) -> String {
    body.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("Payment processing failed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_to_cents() {
        assert_eq!(amount_to_cents(50.0), 5000);
        assert_eq!(amount_to_cents(0.01), 1);
        assert_eq!(amount_to_cents(10.555), 1056);
        assert_eq!(amount_to_cents(19.99), 1999);
    }

    #[test]
    fn test_extract_error_message() {
        let body = serde_json::json!({
            "error": { "message": "Your card was declined." }
        });
        assert_eq!(extract_error_message(&body), "Your card was declined.");
        assert_eq!(
            extract_error_message(&serde_json::json!({})),
            "Payment processing failed"
        );
    }

    #[test]
    fn test_intent_deserializes() {
        let intent: PaymentIntent = serde_json::from_value(serde_json::json!({
            "id": "pi_123",
            "client_secret": "pi_123_secret_abc",
            "status": "requires_payment_method"
        }))
        .unwrap();
        assert_eq!(intent.id, "pi_123");
        assert!(!intent.succeeded());
    }

    #[test]
    fn test_missing_key_rejected() {
        let client = StripeClient::new(String::new(), "https://api.stripe.com".to_string());
        assert!(client.ensure_key().is_err());
        let client = StripeClient::new("pk_wrong".to_string(), "https://api.stripe.com".to_string());
        assert!(client.ensure_key().is_err());
        let client = StripeClient::new("sk_test_abc".to_string(), "https://api.stripe.com".to_string());
        assert!(client.ensure_key().is_ok());
    }
}
