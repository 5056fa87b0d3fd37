use validator::Validate;
use crate::errors::AppError;

pub fn validate_payload<T: Validate>(payload: &T) -> Result<(), AppError> {
    payload.validate().map_err(AppError::from)
}

/// Rejects strings that are empty once surrounding whitespace is removed.
pub fn validate_not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        let mut err = validator::ValidationError::new("blank");
        err.message = Some("Must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Search terms need at least two non-blank characters.
pub fn validate_search_term(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().chars().count() < 2 {
        let mut err = validator::ValidationError::new("too_short");
        err.message = Some("Enter at least 2 characters".into());
        return Err(err);
    }
    Ok(())
}
