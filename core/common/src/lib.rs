// core/common/src/lib.rs
// Lendhand Common Library - shared functionality across services

pub mod audit;
pub mod auth;
pub mod domain;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod validation;

// Re-export commonly used items
pub use audit::AuditAction;
pub use auth::{AuthError, AuthedUser, Claims, JwtManager};
pub use domain::{
    AccountType, LenderTerm, Loan, LoanHealth, LoanStatus, ManualConfirmationStatus,
    Notification, PartyRole, Payment, PaymentAccount, PaymentMethod, Relationship,
    RelationshipStatus, TransferStatus, User, UserRole,
};
pub use error::{ErrorResponse, ServiceError};
pub use logging::{
    generate_request_id, init_console_logging, init_logging, log_reconciliation_anomaly,
    log_settlement,
};
pub use metrics::{MetricsTimer, ServiceMetrics};
pub use validation::{
    validate_amount, validate_cashtag, validate_email, validate_note, validate_payback_days,
    validate_zelle_contact, ValidationError,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_imports() {
        let _ = JwtManager::new("test".to_string());
        let _ = generate_request_id();
        assert!(LoanStatus::Pending.can_transition_to(LoanStatus::Funded));
    }
}
