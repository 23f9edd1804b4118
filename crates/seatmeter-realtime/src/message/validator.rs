//! Message validation rules.

use seatmeter_core::error::AppError;

/// Maximum allowed message size in bytes.
const MAX_MESSAGE_SIZE: usize = 16_384;

/// Validates a raw inbound frame before parsing.
pub fn validate_inbound(raw: &str) -> Result<(), AppError> {
    if raw.len() > MAX_MESSAGE_SIZE {
        return Err(AppError::validation(format!(
            "Message exceeds maximum size of {MAX_MESSAGE_SIZE} bytes"
        )));
    }

    if raw.trim().is_empty() {
        return Err(AppError::validation("Empty message"));
    }

    Ok(())
}

/// Validates the fields of a `page-enter` event.
pub fn validate_page(
    path: &str,
    title: Option<&str>,
    referrer: Option<&str>,
    max_len: usize,
) -> Result<(), AppError> {
    if path.trim().is_empty() {
        return Err(AppError::validation("Page path must not be empty"));
    }

    for (field, value) in [("path", Some(path)), ("title", title), ("referrer", referrer)] {
        if value.is_some_and(|v| v.len() > max_len) {
            return Err(AppError::validation(format!(
                "Page {field} exceeds {max_len} bytes"
            )));
        }
    }

    Ok(())
}
