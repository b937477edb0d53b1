//! Field checks shared by checkout and the shipping routes

use crate::error::{AppError, AppResult};
use regex::Regex;
use std::sync::LazyLock;

static PINCODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[1-9][0-9]{5}$").expect("pincode pattern is valid"));

// Ten-digit mobile number, optionally prefixed with +91 or 0
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\+91[\s-]?|0)?[6-9][0-9]{9}$").expect("phone pattern is valid")
});

pub fn require_non_empty(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::missing_field(field));
    }
    Ok(())
}

pub fn validate_pincode(field: &str, value: &str) -> AppResult<()> {
    if !PINCODE_RE.is_match(value.trim()) {
        return Err(AppError::invalid_field(field, "must be a 6-digit postal code"));
    }
    Ok(())
}

pub fn validate_phone(field: &str, value: &str) -> AppResult<()> {
    if !PHONE_RE.is_match(value.trim()) {
        return Err(AppError::invalid_field(field, "must be a 10-digit mobile number"));
    }
    Ok(())
}

pub fn validate_email(field: &str, value: &str) -> AppResult<()> {
    let value = value.trim();
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AppError::invalid_field(field, "must be an email address")),
    }
}
