// core/common/src/metrics.rs
// Prometheus metrics for loan and settlement operations

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};
use std::time::Instant;

#[derive(Clone)]
pub struct ServiceMetrics {
    // HTTP metrics
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,

    // Error metrics
    pub errors_total: IntCounterVec,

    // Settlement metrics
    pub payments_initiated_total: IntCounterVec,
    pub payments_settled_total: IntCounterVec,
    pub loan_transitions_total: IntCounterVec,
    pub reconciliation_anomalies_total: IntCounter,

    // Sweep metrics
    pub sweep_duration_seconds: Histogram,
    pub loans_marked_overdue_total: IntCounter,
}

impl ServiceMetrics {
    pub fn new(registry: &Registry, service_name: &str) -> Result<Self, prometheus::Error> {
        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests")
                .namespace(service_name),
            &["method", "endpoint", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .namespace(service_name)
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["method", "endpoint"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        let errors_total = IntCounterVec::new(
            Opts::new("errors_total", "Total number of errors").namespace(service_name),
            &["type", "operation"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let payments_initiated_total = IntCounterVec::new(
            Opts::new("payments_initiated_total", "Payments initiated, by rail")
                .namespace(service_name),
            &["method"],
        )?;
        registry.register(Box::new(payments_initiated_total.clone()))?;

        let payments_settled_total = IntCounterVec::new(
            Opts::new("payments_settled_total", "Payments reaching a terminal state")
                .namespace(service_name),
            &["outcome"],
        )?;
        registry.register(Box::new(payments_settled_total.clone()))?;

        let loan_transitions_total = IntCounterVec::new(
            Opts::new("loan_transitions_total", "Loan status transitions applied")
                .namespace(service_name),
            &["to_status"],
        )?;
        registry.register(Box::new(loan_transitions_total.clone()))?;

        let reconciliation_anomalies_total = IntCounter::with_opts(
            Opts::new(
                "reconciliation_anomalies_total",
                "Aggregate inconsistencies detected during settlement",
            )
            .namespace(service_name),
        )?;
        registry.register(Box::new(reconciliation_anomalies_total.clone()))?;

        let sweep_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("sweep_duration_seconds", "Overdue sweep run duration")
                .namespace(service_name)
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;
        registry.register(Box::new(sweep_duration_seconds.clone()))?;

        let loans_marked_overdue_total = IntCounter::with_opts(
            Opts::new(
                "loans_marked_overdue_total",
                "Loans transitioned to OVERDUE by the sweep",
            )
            .namespace(service_name),
        )?;
        registry.register(Box::new(loans_marked_overdue_total.clone()))?;

        Ok(Self {
            http_requests_total,
            http_request_duration_seconds,
            errors_total,
            payments_initiated_total,
            payments_settled_total,
            loan_transitions_total,
            reconciliation_anomalies_total,
            sweep_duration_seconds,
            loans_marked_overdue_total,
        })
    }

    pub fn record_http_request(&self, method: &str, endpoint: &str, status: u16, duration: f64) {
        self.http_requests_total
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration);
    }

    pub fn record_error(&self, error_type: &str, operation: &str) {
        self.errors_total
            .with_label_values(&[error_type, operation])
            .inc();
    }

    pub fn record_initiation(&self, method: &str) {
        self.payments_initiated_total
            .with_label_values(&[method])
            .inc();
    }

    pub fn record_settlement(&self, outcome: &str) {
        self.payments_settled_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_loan_transition(&self, to_status: &str) {
        self.loan_transitions_total
            .with_label_values(&[to_status])
            .inc();
    }
}

/// Timer to measure operation duration
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_once() {
        let registry = Registry::new();
        let metrics = ServiceMetrics::new(&registry, "test_service").unwrap();
        metrics.record_initiation("CASHAPP");
        metrics.record_settlement("completed");
        metrics.record_loan_transition("FUNDED");
        metrics.reconciliation_anomalies_total.inc();
        assert!(!registry.gather().is_empty());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        let _first = ServiceMetrics::new(&registry, "svc").unwrap();
        assert!(ServiceMetrics::new(&registry, "svc").is_err());
    }

    #[test]
    fn test_timer_measures_elapsed() {
        let timer = MetricsTimer::start();
        assert!(timer.elapsed_seconds() >= 0.0);
    }
}
