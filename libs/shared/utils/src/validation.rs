use chrono::{NaiveDate, NaiveTime};

use shared_models::{error::AppError, DATE_FORMAT, TIME_FORMAT};

/// Trimmed value of a required text field.
pub fn required<'a>(field: &str, value: Option<&'a str>) -> Result<&'a str, AppError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::ValidationError(format!("{} is required", field))),
    }
}

/// `None` for missing or blank input.
pub fn optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        AppError::ValidationError(format!("Invalid {} format. Use YYYY-MM-DD", field))
    })
}

pub fn parse_time(field: &str, value: &str) -> Result<NaiveTime, AppError> {
    NaiveTime::parse_from_str(value.trim(), TIME_FORMAT).map_err(|_| {
        AppError::ValidationError(format!("Invalid {} format. Use HH:MM", field))
    })
}

pub fn validate_email(email: &str) -> Result<String, AppError> {
    let email = email.trim();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if valid {
        Ok(email.to_string())
    } else {
        Err(AppError::ValidationError(format!("Invalid email address: {}", email)))
    }
}
