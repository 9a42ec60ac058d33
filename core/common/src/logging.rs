// core/common/src/logging.rs
// Structured logging and the reconciliation-anomaly channel

use tracing::{error, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use uuid::Uuid;

/// Initialize structured JSON logging for a service.
pub fn init_logging(service_name: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true),
        )
        .init();

    info!(service = service_name, "Logging initialized");
}

/// Initialize pretty console logging (for development).
pub fn init_console_logging(service_name: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().pretty().with_target(true))
        .init();

    info!(service = service_name, "Console logging initialized");
}

/// Generate a correlation ID for request tracing.
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Log a settlement outcome for a payment.
pub fn log_settlement(payment_id: Uuid, loan_id: Uuid, outcome: &str) {
    info!(
        payment_id = %payment_id,
        loan_id = %loan_id,
        outcome = outcome,
        "Payment settled"
    );
}

/// Reconciliation anomalies are never surfaced to the caller; funds have
/// already moved. They land here and in the audit sink for operator review.
pub fn log_reconciliation_anomaly(loan_id: Uuid, detail: &str) {
    error!(
        loan_id = %loan_id,
        detail = detail,
        anomaly = true,
        "Reconciliation anomaly"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_request_id_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
