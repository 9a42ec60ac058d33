// core/loan-service/src/mailer.rs
// Outbound reminder email via an HTTP mail relay

use serde::Serialize;

#[derive(Debug, Serialize)]
struct MailMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

#[derive(Clone)]
pub struct Mailer {
    client: reqwest::Client,
    relay_url: Option<String>,
    from: String,
}

impl Mailer {
    pub fn new(relay_url: Option<String>, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            relay_url: relay_url.filter(|u| !u.is_empty()),
            from,
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            std::env::var("MAIL_RELAY_URL").ok(),
            std::env::var("MAIL_FROM").unwrap_or_else(|_| "noreply@lendhand.app".to_string()),
        )
    }

    /// Send one message through the relay. With no relay configured the
    /// message is logged and dropped so development runs stay quiet.
    pub async fn send(&self, to: &str, subject: &str, text: &str) -> Result<(), String> {
        let Some(relay_url) = &self.relay_url else {
            tracing::info!(to = to, subject = subject, "mail relay not configured, skipping send");
            return Ok(());
        };

        let response = self
            .client
            .post(relay_url)
            .json(&MailMessage {
                from: &self.from,
                to,
                subject,
                text,
            })
            .send()
            .await
            .map_err(|e| format!("mail relay unreachable: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("mail relay returned {}", response.status()));
        }
        Ok(())
    }
}

/// Subject and body of the overdue reminder sent to the borrower.
pub fn compose_borrower_reminder(
    borrower_name: &str,
    lender_name: &str,
    lender_email: &str,
    total_payable: f64,
    payback_date: &str,
    days_late: i64,
    health: &str,
) -> (String, String) {
    let subject = format!("Your loan is overdue by {} days", days_late);
    let body = format!(
        "Dear {},\n\
         Your loan with these details:\n\
         Amount: ${}\n\
         Lender: {} ({})\n\
         Payback Date: {}\n\
         Is overdue by {} days. Current health status: {}.\n\
         Please take necessary actions to address this issue.\n\
         If you have already made the payment, please disregard this message.\n\
         Regards,\n\
         The Lendhand Team",
        borrower_name, total_payable, lender_name, lender_email, payback_date, days_late, health
    );
    (subject, body)
}

/// Subject and body of the overdue reminder sent to the lender.
pub fn compose_lender_reminder(
    lender_name: &str,
    borrower_name: &str,
    borrower_email: &str,
    total_payable: f64,
    payback_date: &str,
    days_late: i64,
    health: &str,
) -> (String, String) {
    let subject = format!("Your borrower's loan is overdue by {} days", days_late);
    let body = format!(
        "Dear {},\n\
         Your borrower's loan with these details:\n\
         Amount: ${}\n\
         Borrower: {} ({})\n\
         Payback Date: {}\n\
         Is overdue by {} days. Current health status: {}.\n\
         We have already contacted the borrower regarding this issue.\n\
         If the borrower has already made the payment, please disregard this message.\n\
         Regards,\n\
         The Lendhand Team",
        lender_name, total_payable, borrower_name, borrower_email, payback_date, days_late, health
    );
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_borrower_reminder_mentions_days_and_health() {
        let (subject, body) = compose_borrower_reminder(
            "Ada",
            "Grace",
            "grace@example.com",
            55.0,
            "2026-07-17",
            20,
            "FAILING",
        );
        assert_eq!(subject, "Your loan is overdue by 20 days");
        assert!(body.contains("overdue by 20 days"));
        assert!(body.contains("FAILING"));
        assert!(body.contains("grace@example.com"));
    }

    #[test]
    fn test_lender_reminder_addresses_lender() {
        let (subject, body) = compose_lender_reminder(
            "Grace",
            "Ada",
            "ada@example.com",
            55.0,
            "2026-07-17",
            3,
            "BEHIND",
        );
        assert!(subject.contains("borrower's loan"));
        assert!(body.starts_with("Dear Grace"));
        assert!(body.contains("ada@example.com"));
    }

    #[tokio::test]
    async fn test_send_without_relay_is_noop() {
        let mailer = Mailer::new(None, "noreply@lendhand.app".to_string());
        assert!(mailer.send("x@example.com", "s", "t").await.is_ok());
    }
}
