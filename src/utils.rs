use axum::http::StatusCode;

use crate::constants::*;

pub fn db_error() -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        ERR_DATABASE_OPERATION.to_string(),
    )
}

pub fn db_error_with_context(context: &str) -> (StatusCode, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Database error: {}", context),
    )
}

pub fn validate_string_length(
    value: &str,
    field_name: &str,
    max_length: usize,
) -> Result<(), (StatusCode, String)> {
    if value.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} cannot be empty", field_name),
        ));
    }
    if value.len() > max_length {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} must be less than {} characters", field_name, max_length),
        ));
    }
    Ok(())
}

/// Validates an RFC 3339 timestamp string (event start times).
pub fn validate_timestamp(value: &str) -> Result<(), (StatusCode, String)> {
    if value.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Timestamp cannot be empty".to_string(),
        ));
    }

    time::OffsetDateTime::parse(value.trim(), &time::format_description::well_known::Rfc3339)
        .map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                "Invalid timestamp format (expected RFC 3339)".to_string(),
            )
        })?;

    Ok(())
}

/// Current instant as an RFC 3339 UTC string, the storage format for all
/// timestamps.
pub fn now_rfc3339() -> Result<String, (StatusCode, String)> {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to format timestamp".to_string(),
            )
        })
}

/// Start of the current UTC calendar day as an RFC 3339 string.
///
/// RFC 3339 UTC strings order lexicographically, so the daily quota window
/// is the half-open range `[day_start, now]` compared as plain text.
pub fn today_start_rfc3339() -> Result<String, (StatusCode, String)> {
    time::OffsetDateTime::now_utc()
        .date()
        .midnight()
        .assume_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|_| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to format timestamp".to_string(),
            )
        })
}

pub fn validate_limit(limit: Option<u32>, default: u32) -> Result<u32, (StatusCode, String)> {
    match limit {
        Some(l) => {
            if l == 0 {
                Err((
                    StatusCode::BAD_REQUEST,
                    "Limit must be greater than 0".to_string(),
                ))
            } else if l > MAX_LIMIT {
                Err((
                    StatusCode::BAD_REQUEST,
                    format!("Limit cannot exceed {}", MAX_LIMIT),
                ))
            } else {
                Ok(l)
            }
        }
        None => Ok(default),
    }
}

pub fn validate_events_limit(limit: Option<u32>) -> Result<u32, (StatusCode, String)> {
    validate_limit(limit, DEFAULT_EVENTS_LIMIT)
}

pub fn validate_friends_limit(limit: Option<u32>) -> Result<u32, (StatusCode, String)> {
    validate_limit(limit, DEFAULT_FRIENDS_LIMIT)
}

pub fn validate_messages_limit(limit: Option<u32>) -> Result<u32, (StatusCode, String)> {
    validate_limit(limit, DEFAULT_MESSAGES_LIMIT)
}

pub fn validate_offset(offset: Option<u32>) -> Result<u32, (StatusCode, String)> {
    match offset {
        Some(o) => {
            if o > MAX_OFFSET {
                Err((
                    StatusCode::BAD_REQUEST,
                    format!("Offset cannot exceed {}", MAX_OFFSET),
                ))
            } else {
                Ok(o)
            }
        }
        None => Ok(0),
    }
}

pub fn validate_request_transition(from: &str, to: &str) -> Result<(), String> {
    use crate::constants::*;
    match (from, to) {
        (REQUEST_STATUS_PENDING, REQUEST_STATUS_ACCEPTED) => Ok(()),
        (REQUEST_STATUS_PENDING, REQUEST_STATUS_REJECTED) => Ok(()),
        _ => Err(format!(
            "Invalid friend request transition from {} to {}",
            from, to
        )),
    }
}
