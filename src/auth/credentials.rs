//! Input rules for member credentials, applied before anything touches
//! storage.

use crate::error::AppError;

pub const MAX_USER_ID_LEN: usize = 30;
pub const MAX_NAME_LEN: usize = 50;

pub fn validate_user_id(user_id: &str) -> Result<(), AppError> {
    if user_id.is_empty() {
        return Err(AppError::validation("userId is required"));
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(AppError::validation(format!(
            "userId must be at most {MAX_USER_ID_LEN} characters"
        )));
    }
    if !user_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::validation(
            "userId may only contain letters and digits",
        ));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<String, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Strips everything but digits. Country prefixes are kept as digits, not
/// rewritten.
pub fn normalize_phone(phone: &str) -> Result<String, AppError> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if !(10..=11).contains(&digits.len()) {
        return Err(AppError::validation("phone must have 10 or 11 digits"));
    }
    Ok(digits)
}

/// Blank input means no email.
pub fn normalize_email(email: Option<&str>) -> Result<Option<String>, AppError> {
    let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };
    let email = email.to_ascii_lowercase();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
        {
            Ok(Some(email))
        }
        _ => Err(AppError::validation("email is invalid")),
    }
}
