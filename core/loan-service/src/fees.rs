// core/loan-service/src/fees.rs
// Fee & term engine: loan pricing from a lender's terms

use chrono::{DateTime, Duration, Utc};
use lendhand_common::{
    domain::LenderTerm, validate_amount, validate_payback_days, ServiceError,
};

pub const DEFAULT_FEE_PER10_SHORT: f64 = 1.0;
pub const DEFAULT_FEE_PER10_LONG: f64 = 2.0;
/// Paybacks at or under this many days use the short-term fee rate.
pub const SHORT_PAYBACK_DAYS: i32 = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct FeeQuote {
    pub fee_amount: f64,
    pub total_payable: f64,
    pub payback_date: DateTime<Utc>,
}

/// Price a loan request. Term limits are enforced here so a loan can never be
/// created outside the lender's published policy.
pub fn quote(
    amount: f64,
    payback_days: i32,
    term: Option<&LenderTerm>,
    now: DateTime<Utc>,
) -> Result<FeeQuote, ServiceError> {
    validate_amount(amount)?;
    validate_payback_days(payback_days)?;

    if let Some(term) = term {
        if amount > term.max_loan_amount {
            return Err(ServiceError::Validation(format!(
                "amount exceeds lender's maximum of ${}",
                term.max_loan_amount
            )));
        }
        if payback_days > term.max_payback_days {
            return Err(ServiceError::Validation(format!(
                "payback days exceeds lender's maximum of {}",
                term.max_payback_days
            )));
        }
        if let Some(multiple) = term.loan_multiple {
            let ratio = amount / multiple;
            if (ratio - ratio.round()).abs() > 1e-9 {
                return Err(ServiceError::Validation(format!(
                    "amount must be a multiple of ${}",
                    multiple
                )));
            }
        }
    }

    let fee_per10 = match term {
        Some(term) if payback_days <= SHORT_PAYBACK_DAYS => term.fee_per10_short,
        Some(term) => term.fee_per10_long,
        None if payback_days <= SHORT_PAYBACK_DAYS => DEFAULT_FEE_PER10_SHORT,
        None => DEFAULT_FEE_PER10_LONG,
    };

    let fee_amount = (amount / 10.0) * fee_per10;
    Ok(FeeQuote {
        fee_amount,
        total_payable: amount + fee_amount,
        payback_date: now + Duration::days(payback_days as i64),
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn term(short: f64, long: f64) -> LenderTerm {
        LenderTerm {
            id: Uuid::new_v4(),
            lender_id: Uuid::new_v4(),
            max_loan_amount: 500.0,
            loan_multiple: None,
            max_payback_days: 60,
            fee_per10_short: short,
            fee_per10_long: long,
            allow_multiple_loans: false,
            invite_token: "inv_test".to_string(),
            preferred_payment_methods: None,
            require_matching_payment_method: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_short_payback_with_term() {
        // 50 over 7 days at 1 per 10 -> fee 5, total 55
        let q = quote(50.0, 7, Some(&term(1.0, 2.0)), Utc::now()).unwrap();
        assert_eq!(q.fee_amount, 5.0);
        assert_eq!(q.total_payable, 55.0);
    }

    #[test]
    fn test_long_payback_uses_long_rate() {
        let q = quote(50.0, 8, Some(&term(1.0, 2.0)), Utc::now()).unwrap();
        assert_eq!(q.fee_amount, 10.0);
        assert_eq!(q.total_payable, 60.0);
    }

    #[test]
    fn test_default_rates_without_term() {
        let short = quote(100.0, 7, None, Utc::now()).unwrap();
        assert_eq!(short.fee_amount, 10.0);
        let long = quote(100.0, 14, None, Utc::now()).unwrap();
        assert_eq!(long.fee_amount, 20.0);
    }

    #[test]
    fn test_payback_date_offset() {
        let now = Utc::now();
        let q = quote(50.0, 14, None, now).unwrap();
        assert_eq!(q.payback_date, now + Duration::days(14));
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(quote(0.0, 7, None, Utc::now()).is_err());
        assert!(quote(-5.0, 7, None, Utc::now()).is_err());
        assert!(quote(50.0, 0, None, Utc::now()).is_err());
    }

    #[test]
    fn test_term_limits_enforced() {
        let t = term(1.0, 2.0);
        assert!(quote(501.0, 7, Some(&t), Utc::now()).is_err());
        assert!(quote(50.0, 61, Some(&t), Utc::now()).is_err());
    }

    #[test]
    fn test_loan_multiple_enforced() {
        let mut t = term(1.0, 2.0);
        t.loan_multiple = Some(25.0);
        assert!(quote(50.0, 7, Some(&t), Utc::now()).is_ok());
        assert!(quote(60.0, 7, Some(&t), Utc::now()).is_err());
    }
}
