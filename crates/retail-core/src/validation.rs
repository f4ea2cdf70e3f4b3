//! # Validation Module
//!
//! Input checks that run before any remote write.
//!
//! ## Usage
//! ```rust
//! use retail_core::validation::{validate_email, validate_new_password};
//!
//! assert!(validate_email("aina@example.com").is_ok());
//! assert!(validate_new_password("Secret123", "Secret123").is_ok());
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::ValidationError;
use crate::MAX_PROFILE_PICTURE_BYTES;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Minimum password length for invitation acceptance.
pub const MIN_PASSWORD_LEN: usize = 8;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

fn email_regex() -> &'static Regex {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern compiles"))
}

// =============================================================================
// String Validators
// =============================================================================

/// Trims `value` and rejects it when empty.
pub fn require<'a>(field: &str, value: Option<&'a str>) -> ValidationResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::required(field)),
    }
}

/// Validates an email address (`something@domain.tld`, no whitespace).
pub fn validate_email(email: &str) -> ValidationResult<()> {
    if email.trim().is_empty() {
        return Err(ValidationError::required("email"));
    }
    if !email_regex().is_match(email.trim()) {
        return Err(ValidationError::InvalidFormat {
            field: "email".to_string(),
            reason: "Invalid email format".to_string(),
        });
    }
    Ok(())
}

/// Validates a new password and its confirmation.
///
/// ## Order of Checks
/// 1. both present
/// 2. they match
/// 3. at least [`MIN_PASSWORD_LEN`] characters
/// 4. at least one uppercase, one lowercase and one digit
pub fn validate_new_password(password: &str, confirm: &str) -> ValidationResult<()> {
    if password.is_empty() || confirm.is_empty() {
        return Err(ValidationError::required("password"));
    }
    if password != confirm {
        return Err(ValidationError::Mismatch("Passwords do not match".to_string()));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: MIN_PASSWORD_LEN,
        });
    }

    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_upper && has_lower && has_digit) {
        return Err(ValidationError::WeakPassword);
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Quantity on a stock movement or sale line.
pub fn validate_quantity(field: &str, quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::must_be_positive(field));
    }
    Ok(())
}

/// Stock levels and prices may be zero but never negative.
pub fn validate_non_negative(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Profile Picture
// =============================================================================

/// Validates a `data:image/...;base64,...` URL and returns the decoded size.
pub fn validate_profile_picture(data_url: &str) -> ValidationResult<usize> {
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "profile_picture".to_string(),
        reason: reason.to_string(),
    };

    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| invalid("expected a data URL"))?;
    let (mime, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| invalid("expected base64 content"))?;
    if !mime.starts_with("image/") {
        return Err(invalid("must be an image"));
    }

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| invalid("base64 content does not decode"))?;

    if bytes.len() > MAX_PROFILE_PICTURE_BYTES {
        return Err(ValidationError::TooLarge {
            field: "profile_picture".to_string(),
            max: MAX_PROFILE_PICTURE_BYTES,
            unit: "bytes",
        });
    }
    Ok(bytes.len())
}

// =============================================================================
// Unit Tests
// =============================================================================
