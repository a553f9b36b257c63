use fundingcalls_portal::types::ProbabilityRate;
use fundingcalls_portal::CallStatus;

use crate::error::ScrapeError;

pub const MAX_KEYWORD_LENGTH: usize = 100;
pub const MAX_CATEGORY_LENGTH: usize = 200;
pub const MAX_QUERY_LIMIT: i64 = 10_000;

/// Strip ASCII control characters (0x00-0x1F except space 0x20), trim whitespace,
/// and enforce a byte-length limit.
pub fn sanitize_text(input: &str, max_len: usize) -> Result<String, ScrapeError> {
    if input.len() > max_len {
        return Err(ScrapeError::InvalidInput(format!(
            "input exceeds maximum length of {} bytes",
            max_len
        )));
    }
    let sanitized: String = input
        .chars()
        .filter(|c| !c.is_ascii_control() || *c == ' ')
        .collect::<String>()
        .trim()
        .to_string();
    if sanitized.is_empty() {
        return Err(ScrapeError::InvalidInput(
            "input is empty after sanitization".to_string(),
        ));
    }
    Ok(sanitized)
}

/// Validate a portal keyword or a stored-call search string.
pub fn validate_keyword(input: &str) -> Result<String, ScrapeError> {
    sanitize_text(input, MAX_KEYWORD_LENGTH)
}

/// Validate a category name or group name (e.g. `CL4`).
pub fn validate_category(input: &str) -> Result<String, ScrapeError> {
    sanitize_text(input, MAX_CATEGORY_LENGTH)
}

/// Validate a call status: case-insensitive, accepts the portal label
/// "Open For Submission" as well as `open`.
pub fn validate_status(input: &str) -> Result<CallStatus, ScrapeError> {
    input.parse().map_err(|_| {
        ScrapeError::InvalidInput(format!(
            "unknown status '{}'. Valid values: forthcoming, open, closed",
            input
        ))
    })
}

pub fn validate_probability(input: &str) -> Result<ProbabilityRate, ScrapeError> {
    input.parse().map_err(|_| {
        ScrapeError::InvalidInput(format!(
            "unknown probability '{}'. Valid values: low, medium, high, unknown",
            input
        ))
    })
}

/// Validate a result limit (must be 1..=10000).
pub fn validate_limit(limit: i64) -> Result<i64, ScrapeError> {
    if !(1..=MAX_QUERY_LIMIT).contains(&limit) {
        return Err(ScrapeError::InvalidInput(format!(
            "limit must be between 1 and {}",
            MAX_QUERY_LIMIT
        )));
    }
    Ok(limit)
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;
