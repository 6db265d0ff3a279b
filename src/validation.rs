/// Input validation and normalization
use crate::error::{GateError, GateResult};
use validator::ValidateEmail;

/// Validate an email address format
pub fn validate_email(email: &str) -> GateResult<()> {
    if !email.validate_email() {
        return Err(GateError::Validation("Invalid email format".to_string()));
    }
    Ok(())
}

/// Require a non-empty field after trimming, returning the trimmed value
pub fn require_field<'a>(value: &'a str, field: &str) -> GateResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(GateError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed)
}

/// Normalize a phone handle to a consistent international-prefix format.
///
/// Strips spaces, dashes and a leading "+", drops leading zeros, and
/// prepends the default country code when the number carries no
/// international prefix yet.
pub fn normalize_phone(raw: &str, default_country_code: &str) -> GateResult<String> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(GateError::Validation(
            "Phone number must contain only digits".to_string(),
        ));
    }

    let without_zeros = cleaned.trim_start_matches('0');
    if without_zeros.is_empty() {
        return Err(GateError::Validation("Invalid phone number".to_string()));
    }

    // A 10-digit local number gets the default country code; anything else
    // is assumed to carry its prefix already.
    if without_zeros.len() == 10 {
        Ok(format!("{}{}", default_country_code, without_zeros))
    } else {
        Ok(without_zeros.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email_accepts_plain_address() {
        assert!(validate_email("alice@example.com").is_ok());
    }

    #[test]
    fn test_validate_email_rejects_garbage() {
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("").is_err());
        assert!(validate_email("a@").is_err());
    }

    #[test]
    fn test_require_field_trims() {
        assert_eq!(require_field("  Alice ", "name").unwrap(), "Alice");
        assert!(require_field("   ", "name").is_err());
    }

    #[test]
    fn test_normalize_phone_adds_country_code() {
        assert_eq!(normalize_phone("9876543210", "91").unwrap(), "919876543210");
    }

    #[test]
    fn test_normalize_phone_strips_leading_zeros() {
        assert_eq!(
            normalize_phone("09876543210", "91").unwrap(),
            "919876543210"
        );
    }

    #[test]
    fn test_normalize_phone_keeps_existing_prefix() {
        assert_eq!(
            normalize_phone("+91 98765 43210", "91").unwrap(),
            "919876543210"
        );
        assert_eq!(
            normalize_phone("919876543210", "91").unwrap(),
            "919876543210"
        );
    }

    #[test]
    fn test_normalize_phone_rejects_non_digits() {
        assert!(normalize_phone("98x6543210", "91").is_err());
        assert!(normalize_phone("", "91").is_err());
        assert!(normalize_phone("0000", "91").is_err());
    }
}
