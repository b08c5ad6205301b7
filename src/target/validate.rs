//! Destination address validation.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

/// Optional leading `+`, then 10 to 13 digits.
pub const PHONE_NUMBER_PATTERN: &str = r"^\+?[0-9]{10,13}$";

static PHONE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PHONE_NUMBER_PATTERN).expect("phone number pattern compiles"));

/// Validate a user-entered destination address.
pub fn validate_phone_number(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    if !PHONE_NUMBER_RE.is_match(value) {
        return Err(ValidationError::InvalidPhoneNumber {
            value: value.to_string(),
        });
    }
    Ok(())
}
