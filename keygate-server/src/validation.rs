//! Request validation module
//!
//! Checks path-independent request fields before they reach the engine.

use crate::error::ApiError;

/// Maximum accepted user id length in bytes
pub const MAX_USER_ID_LEN: usize = 64;

/// Validates a user id from a request body
///
/// Accepts 1 to [`MAX_USER_ID_LEN`] ASCII letters, digits, `-`, `_`, `.` or `@`.
pub fn validate_user_id(user_id: &str) -> Result<(), ApiError> {
    if user_id.is_empty() {
        return Err(ApiError::bad_request("userId must not be empty"));
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(ApiError::bad_request(format!(
            "userId too long: {} bytes exceeds maximum of {}",
            user_id.len(),
            MAX_USER_ID_LEN
        )));
    }
    if let Some(c) = user_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@')))
    {
        return Err(ApiError::bad_request(format!(
            "userId contains unsupported character {:?}",
            c
        )));
    }
    Ok(())
}
