// core/common/src/domain.rs
// Closed domain enumerations, transition tables and row types shared by
// loan-service and payment-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ENUMERATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Lender,
    Borrower,
    Both,
}

/// Which side of a loan a payment party is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "party_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyRole {
    Lender,
    Borrower,
}

impl PartyRole {
    pub fn opposite(self) -> PartyRole {
        match self {
            PartyRole::Lender => PartyRole::Borrower,
            PartyRole::Borrower => PartyRole::Lender,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PartyRole::Lender => "LENDER",
            PartyRole::Borrower => "BORROWER",
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "loan_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Pending,
    Funded,
    Overdue,
    Completed,
    Denied,
}

impl LoanStatus {
    /// Legal transitions. Funded -> Funded is an idempotent no-op so that a
    /// second funding confirmation cannot fail.
    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Pending, Funded)
                | (Pending, Denied)
                | (Funded, Funded)
                | (Funded, Overdue)
                | (Funded, Completed)
                | (Overdue, Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Pending => "PENDING",
            LoanStatus::Funded => "FUNDED",
            LoanStatus::Overdue => "OVERDUE",
            LoanStatus::Completed => "COMPLETED",
            LoanStatus::Denied => "DENIED",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delinquency grade, independent of lifecycle status. Declaration order is
/// severity order; a loan's health never improves while it is delinquent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "loan_health", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanHealth {
    Good,
    Behind,
    Failing,
    Defaulted,
}

impl LoanHealth {
    pub fn worst(self, other: LoanHealth) -> LoanHealth {
        self.max(other)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoanHealth::Good => "GOOD",
            LoanHealth::Behind => "BEHIND",
            LoanHealth::Failing => "FAILING",
            LoanHealth::Defaulted => "DEFAULTED",
        }
    }
}

impl fmt::Display for LoanHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transfer_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn can_transition_to(self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "manual_confirmation_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ManualConfirmationStatus {
    None,
    PendingUpload,
    PendingConfirmation,
    Confirmed,
    Disputed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "relationship_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipStatus {
    Confirmed,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cashapp,
    Zelle,
    Paypal,
    InternalWallet,
    Card,
}

impl PaymentMethod {
    /// Manual rails settle through human dual-attestation, not a remote call.
    pub fn is_manual(self) -> bool {
        matches!(self, PaymentMethod::Cashapp | PaymentMethod::Zelle)
    }

    /// Rails that need a registered payment account on both sides.
    pub fn requires_accounts(self) -> bool {
        matches!(self, PaymentMethod::Cashapp | PaymentMethod::Paypal)
    }

    /// The registered-account rail this method settles over, if any.
    pub fn account_type(self) -> Option<AccountType> {
        match self {
            PaymentMethod::Cashapp => Some(AccountType::Cashapp),
            PaymentMethod::Zelle => Some(AccountType::Zelle),
            PaymentMethod::Paypal => Some(AccountType::Paypal),
            PaymentMethod::InternalWallet | PaymentMethod::Card => None,
        }
    }

    /// Initial manual-confirmation state for a freshly created payment.
    pub fn initial_manual_status(self) -> ManualConfirmationStatus {
        if self.is_manual() {
            ManualConfirmationStatus::PendingUpload
        } else {
            ManualConfirmationStatus::None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cashapp => "CASHAPP",
            PaymentMethod::Zelle => "ZELLE",
            PaymentMethod::Paypal => "PAYPAL",
            PaymentMethod::InternalWallet => "INTERNAL_WALLET",
            PaymentMethod::Card => "CARD",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "account_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Cashapp,
    Zelle,
    Paypal,
}

impl AccountType {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountType::Cashapp => "CASHAPP",
            AccountType::Zelle => "ZELLE",
            AccountType::Paypal => "PAYPAL",
        }
    }
}

// ============================================================================
// ROW TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LenderTerm {
    pub id: Uuid,
    pub lender_id: Uuid,
    pub max_loan_amount: f64,
    pub loan_multiple: Option<f64>,
    pub max_payback_days: i32,
    pub fee_per10_short: f64,
    pub fee_per10_long: f64,
    pub allow_multiple_loans: bool,
    pub invite_token: String,
    /// JSON array of method names, stored as text.
    pub preferred_payment_methods: Option<String>,
    pub require_matching_payment_method: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Relationship {
    pub id: Uuid,
    pub lender_id: Uuid,
    pub borrower_id: Uuid,
    pub status: RelationshipStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Loan {
    pub id: Uuid,
    pub lender_id: Uuid,
    pub borrower_id: Uuid,
    pub lender_term_id: Option<Uuid>,
    pub amount: f64,
    pub fee_amount: f64,
    /// amount + fee_amount, fixed at creation.
    pub total_payable: f64,
    pub date_borrowed: DateTime<Utc>,
    pub payback_date: DateTime<Utc>,
    pub status: LoanStatus,
    pub health: LoanHealth,
    pub agreed_payment_method: Option<PaymentMethod>,
    pub agreed_payment_account_id: Option<Uuid>,
    pub signed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// The user id occupying the given side of this loan.
    pub fn party(&self, role: PartyRole) -> Uuid {
        match role {
            PartyRole::Lender => self.lender_id,
            PartyRole::Borrower => self.borrower_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub amount: f64,
    pub method: PaymentMethod,
    pub payer_role: PartyRole,
    pub receiver_role: PartyRole,
    pub confirmed: bool,
    pub transfer_status: TransferStatus,
    pub manual_confirmation_status: ManualConfirmationStatus,
    pub lender_confirmed: bool,
    pub borrower_confirmed: bool,
    pub external_transaction_id: Option<String>,
    pub confirmation_note: Option<String>,
    pub confirmation_screenshot: Option<String>,
    pub from_account_id: Option<Uuid>,
    pub to_account_id: Option<Uuid>,
    pub payment_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// A funding payment moves money lender -> borrower.
    pub fn is_funding(&self) -> bool {
        self.payer_role == PartyRole::Lender && self.receiver_role == PartyRole::Borrower
    }

    /// A repayment moves money borrower -> lender.
    pub fn is_repayment(&self) -> bool {
        self.payer_role == PartyRole::Borrower && self.receiver_role == PartyRole::Lender
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_type: AccountType,
    pub cash_app_handle: Option<String>,
    pub paypal_email: Option<String>,
    pub zelle_contact: Option<String>,
    pub account_nickname: Option<String>,
    pub is_default: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub loan_id: Option<Uuid>,
    pub kind: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loan_status_legal_transitions() {
        assert!(LoanStatus::Pending.can_transition_to(LoanStatus::Funded));
        assert!(LoanStatus::Pending.can_transition_to(LoanStatus::Denied));
        assert!(LoanStatus::Funded.can_transition_to(LoanStatus::Overdue));
        assert!(LoanStatus::Funded.can_transition_to(LoanStatus::Completed));
        assert!(LoanStatus::Overdue.can_transition_to(LoanStatus::Completed));
    }

    #[test]
    fn test_loan_status_funded_is_idempotent() {
        assert!(LoanStatus::Funded.can_transition_to(LoanStatus::Funded));
    }

    #[test]
    fn test_loan_status_illegal_transitions() {
        assert!(!LoanStatus::Completed.can_transition_to(LoanStatus::Funded));
        assert!(!LoanStatus::Completed.can_transition_to(LoanStatus::Overdue));
        assert!(!LoanStatus::Denied.can_transition_to(LoanStatus::Funded));
        assert!(!LoanStatus::Overdue.can_transition_to(LoanStatus::Funded));
        assert!(!LoanStatus::Pending.can_transition_to(LoanStatus::Completed));
        assert!(!LoanStatus::Pending.can_transition_to(LoanStatus::Overdue));
    }

    #[test]
    fn test_health_severity_order() {
        assert!(LoanHealth::Good < LoanHealth::Behind);
        assert!(LoanHealth::Behind < LoanHealth::Failing);
        assert!(LoanHealth::Failing < LoanHealth::Defaulted);
    }

    #[test]
    fn test_health_never_improves() {
        assert_eq!(
            LoanHealth::Failing.worst(LoanHealth::Behind),
            LoanHealth::Failing
        );
        assert_eq!(
            LoanHealth::Behind.worst(LoanHealth::Defaulted),
            LoanHealth::Defaulted
        );
        assert_eq!(LoanHealth::Good.worst(LoanHealth::Good), LoanHealth::Good);
    }

    #[test]
    fn test_transfer_status_transitions() {
        assert!(TransferStatus::Pending.can_transition_to(TransferStatus::Completed));
        assert!(TransferStatus::Processing.can_transition_to(TransferStatus::Completed));
        assert!(TransferStatus::Pending.can_transition_to(TransferStatus::Failed));
        assert!(!TransferStatus::Completed.can_transition_to(TransferStatus::Pending));
        assert!(!TransferStatus::Failed.can_transition_to(TransferStatus::Completed));
    }

    #[test]
    fn test_manual_rails() {
        assert!(PaymentMethod::Cashapp.is_manual());
        assert!(PaymentMethod::Zelle.is_manual());
        assert!(!PaymentMethod::Paypal.is_manual());
        assert!(!PaymentMethod::InternalWallet.is_manual());
        assert!(!PaymentMethod::Card.is_manual());
    }

    #[test]
    fn test_initial_manual_status() {
        assert_eq!(
            PaymentMethod::Zelle.initial_manual_status(),
            ManualConfirmationStatus::PendingUpload
        );
        assert_eq!(
            PaymentMethod::Card.initial_manual_status(),
            ManualConfirmationStatus::None
        );
    }

    #[test]
    fn test_party_role_opposite() {
        assert_eq!(PartyRole::Lender.opposite(), PartyRole::Borrower);
        assert_eq!(PartyRole::Borrower.opposite(), PartyRole::Lender);
    }

    #[test]
    fn test_enum_serde_wire_format() {
        assert_eq!(
            serde_json::to_string(&PaymentMethod::InternalWallet).unwrap(),
            "\"INTERNAL_WALLET\""
        );
        assert_eq!(
            serde_json::to_string(&ManualConfirmationStatus::PendingUpload).unwrap(),
            "\"PENDING_UPLOAD\""
        );
        let status: LoanStatus = serde_json::from_str("\"OVERDUE\"").unwrap();
        assert_eq!(status, LoanStatus::Overdue);
    }
}
