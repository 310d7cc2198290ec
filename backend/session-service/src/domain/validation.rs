//! Input validation shared by every service operation

use crate::error::{ServiceError, ServiceResult};

/// Longest id accepted for resources, participants, memberships
pub const MAX_ID_LEN: usize = 128;

/// Validate an identifier: non-empty, bounded, no control characters
pub fn validate_id(field: &str, value: &str) -> ServiceResult<()> {
    if value.trim().is_empty() {
        return Err(ServiceError::Validation(format!("{} is required", field)));
    }
    if value.len() > MAX_ID_LEN {
        return Err(ServiceError::Validation(format!(
            "{} exceeds {} bytes",
            field, MAX_ID_LEN
        )));
    }
    if value.chars().any(char::is_control) {
        return Err(ServiceError::Validation(format!(
            "{} contains control characters",
            field
        )));
    }
    Ok(())
}

/// Amounts must be finite and non-negative; zero is a valid bonus entry
pub fn validate_amount(amount: f64) -> ServiceResult<()> {
    if !amount.is_finite() {
        return Err(ServiceError::Validation("amount must be finite".to_string()));
    }
    if amount < 0.0 {
        return Err(ServiceError::Validation(
            "amount must not be negative".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_capacity(capacity: u32) -> ServiceResult<()> {
    if capacity == 0 {
        return Err(ServiceError::Validation(
            "capacity must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
