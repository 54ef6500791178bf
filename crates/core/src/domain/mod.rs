pub mod calendar;
pub mod coupon;
pub mod order;
pub mod refund;
pub mod user;
pub mod warning;

use chrono::{DateTime, SubsecRound, Utc};

/// Wall clock truncated to the microsecond precision rows are stored with.
pub fn current_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Trims free text and maps blank input to `None`.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}

pub(crate) fn required_text(
    field: &'static str,
    value: &str,
) -> Result<String, crate::errors::DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::errors::DomainError::validation(field, "is required"));
    }
    Ok(trimmed.to_string())
}
