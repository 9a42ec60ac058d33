// core/common/src/validation.rs
// Input validation for loan and payment operations

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid payback days: {0}")]
    InvalidPaybackDays(String),
    #[error("Invalid CashApp handle: {0}")]
    InvalidCashtag(String),
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
    #[error("Invalid Zelle contact: {0}")]
    InvalidZelleContact(String),
    #[error("Input too long: {field} exceeds {max} characters")]
    InputTooLong { field: String, max: usize },
    #[error("Required field missing: {0}")]
    MissingField(String),
}

// Platform limits
const MAX_LOAN_DOLLARS: f64 = 25_000.0;
const MAX_PAYBACK_DAYS: i32 = 365;
const MAX_CASHTAG_LENGTH: usize = 21; // "$" + 20 chars
const MAX_EMAIL_LENGTH: usize = 255;
const MAX_NOTE_LENGTH: usize = 2_000;

/// Validate a dollar amount for a loan or a payment.
pub fn validate_amount(amount: f64) -> Result<(), ValidationError> {
    if !amount.is_finite() {
        return Err(ValidationError::InvalidAmount(
            "amount must be a finite number".to_string(),
        ));
    }
    if amount <= 0.0 {
        return Err(ValidationError::InvalidAmount(
            "amount must be greater than zero".to_string(),
        ));
    }
    if amount > MAX_LOAN_DOLLARS {
        return Err(ValidationError::InvalidAmount(format!(
            "amount exceeds platform maximum (${})",
            MAX_LOAN_DOLLARS
        )));
    }
    Ok(())
}

pub fn validate_payback_days(days: i32) -> Result<(), ValidationError> {
    if days <= 0 {
        return Err(ValidationError::InvalidPaybackDays(
            "payback days must be positive".to_string(),
        ));
    }
    if days > MAX_PAYBACK_DAYS {
        return Err(ValidationError::InvalidPaybackDays(format!(
            "payback days exceeds maximum ({})",
            MAX_PAYBACK_DAYS
        )));
    }
    Ok(())
}

/// Validate a CashApp cashtag: "$" followed by a letter then letters/digits.
pub fn validate_cashtag(handle: &str) -> Result<(), ValidationError> {
    if handle.len() > MAX_CASHTAG_LENGTH {
        return Err(ValidationError::InputTooLong {
            field: "cashAppHandle".to_string(),
            max: MAX_CASHTAG_LENGTH,
        });
    }
    let re = Regex::new(r"^\$[a-zA-Z][a-zA-Z0-9_]{0,19}$")
        .map_err(|_| ValidationError::InvalidCashtag("regex error".to_string()))?;
    if !re.is_match(handle) {
        return Err(ValidationError::InvalidCashtag(
            "must start with $ followed by a letter (e.g. $johndoe)".to_string(),
        ));
    }
    Ok(())
}

/// Validate an email-shaped identifier (PayPal address, user email).
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::InputTooLong {
            field: "email".to_string(),
            max: MAX_EMAIL_LENGTH,
        });
    }
    let re = Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .map_err(|_| ValidationError::InvalidEmail("regex error".to_string()))?;
    if !re.is_match(email) {
        return Err(ValidationError::InvalidEmail(
            "must be in format user@domain.tld".to_string(),
        ));
    }
    Ok(())
}

/// A Zelle contact is either an email address or a 10+ digit phone number.
pub fn validate_zelle_contact(contact: &str) -> Result<(), ValidationError> {
    if validate_email(contact).is_ok() {
        return Ok(());
    }
    let digits: String = contact.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() >= 10 && contact.chars().all(|c| c.is_ascii_digit() || "+-() ".contains(c)) {
        return Ok(());
    }
    Err(ValidationError::InvalidZelleContact(
        "must be an email address or phone number".to_string(),
    ))
}

/// Cap free-text note length before it is appended to a payment record.
pub fn validate_note(note: &str) -> Result<(), ValidationError> {
    if note.len() > MAX_NOTE_LENGTH {
        return Err(ValidationError::InputTooLong {
            field: "note".to_string(),
            max: MAX_NOTE_LENGTH,
        });
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_amount_valid() {
        assert!(validate_amount(50.0).is_ok());
        assert!(validate_amount(0.01).is_ok());
        assert!(validate_amount(25_000.0).is_ok());
    }

    #[test]
    fn test_validate_amount_invalid() {
        assert!(validate_amount(0.0).is_err());
        assert!(validate_amount(-10.0).is_err());
        assert!(validate_amount(25_000.01).is_err());
        assert!(validate_amount(f64::NAN).is_err());
        assert!(validate_amount(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_payback_days() {
        assert!(validate_payback_days(7).is_ok());
        assert!(validate_payback_days(365).is_ok());
        assert!(validate_payback_days(0).is_err());
        assert!(validate_payback_days(-3).is_err());
        assert!(validate_payback_days(366).is_err());
    }

    #[test]
    fn test_validate_cashtag_valid() {
        assert!(validate_cashtag("$johndoe").is_ok());
        assert!(validate_cashtag("$a").is_ok());
        assert!(validate_cashtag("$Jane_Doe99").is_ok());
    }

    #[test]
    fn test_validate_cashtag_invalid() {
        assert!(validate_cashtag("johndoe").is_err());
        assert!(validate_cashtag("$").is_err());
        assert!(validate_cashtag("$9starts_with_digit").is_err());
        assert!(validate_cashtag("$way_too_long_handle_over_limit").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("a.b+c@sub.domain.co").is_ok());
        assert!(validate_email("notanemail").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
    }

    #[test]
    fn test_validate_zelle_contact() {
        assert!(validate_zelle_contact("user@example.com").is_ok());
        assert!(validate_zelle_contact("555-867-5309").is_ok());
        assert!(validate_zelle_contact("+1 (555) 867-5309").is_ok());
        assert!(validate_zelle_contact("12345").is_err());
        assert!(validate_zelle_contact("not a contact").is_err());
    }

    #[test]
    fn test_validate_note_length() {
        assert!(validate_note("looks good, received in full").is_ok());
        assert!(validate_note(&"x".repeat(2_001)).is_err());
    }
}
