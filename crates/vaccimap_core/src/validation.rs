//! crates/vaccimap_core/src/validation.rs
//!
//! Local, field-level validation. Nothing in here ever reaches a port.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

/// A problem with a single user-entered field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("Please enter a valid phone number in E.164 format (e.g., +1234567890).")]
    PhoneNotE164,
    #[error("Please enter the OTP.")]
    MissingCode,
    #[error("Please enter the parent's name.")]
    MissingParentName,
    #[error("Please enter the child's name.")]
    MissingChildName,
    #[error("Please pick the child's date of birth.")]
    MissingChildDob,
    #[error("Please enter DOB in YYYY-MM-DD format.")]
    DobFormat,
    #[error("'{0}' is not a valid calendar date.")]
    DobNotADate(String),
    #[error("Please capture your home location.")]
    MissingHomeLocation,
}

/// Returns the trimmed value, or `missing` if nothing is left.
pub fn required_text(value: &str, missing: FieldError) -> Result<String, FieldError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(missing)
    } else {
        Ok(trimmed.to_string())
    }
}

fn matches_dob_shape(raw: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(raw))
}

/// Parses a typed `YYYY-MM-DD` date of birth.
///
/// The shape is checked first so that `2024-1-5` reports a format problem,
/// while `2024-02-30` reports an impossible date.
pub fn parse_dob_text(raw: &str) -> Result<NaiveDate, FieldError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(FieldError::MissingChildDob);
    }
    if !matches_dob_shape(raw) {
        return Err(FieldError::DobFormat);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| FieldError::DobNotADate(raw.to_string()))
}
