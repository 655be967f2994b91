//! Pre-flight validation of execute requests.
//!
//! Validation failures never surface as Rust errors to the tool caller;
//! the executor folds them into a `success=false` envelope whose message is
//! the verbatim validator string.

use thiserror::Error;

use crate::{MAX_TIMEOUT_MS, MIN_TIMEOUT_MS};

/// A rejected execute request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Empty or whitespace-only code.
    #[error("Code cannot be empty")]
    EmptyCode,

    /// Code longer than the configured ceiling.
    #[error("Code exceeds maximum length of {max} characters (got {actual})")]
    CodeTooLong {
        /// Configured ceiling.
        max: usize,
        /// Submitted length.
        actual: usize,
    },

    /// Timeout below the accepted range.
    #[error("Timeout must be at least {min}ms (got {actual})")]
    TimeoutTooSmall {
        /// Smallest accepted timeout.
        min: u64,
        /// Submitted timeout.
        actual: u64,
    },

    /// Timeout above the accepted range.
    #[error("Timeout cannot exceed {max}ms (got {actual})")]
    TimeoutTooLarge {
        /// Largest accepted timeout.
        max: u64,
        /// Submitted timeout.
        actual: u64,
    },
}

/// Check a code fragment: non-empty and within the length ceiling.
pub fn validate_code(code: &str, max_length: usize) -> Result<(), ValidationError> {
    if code.trim().is_empty() {
        return Err(ValidationError::EmptyCode);
    }
    let actual = code.chars().count();
    if actual > max_length {
        return Err(ValidationError::CodeTooLong {
            max: max_length,
            actual,
        });
    }
    Ok(())
}

/// Check an optional timeout against the accepted range. A missing timeout
/// is valid (the default applies).
pub fn validate_timeout(timeout_ms: Option<u64>) -> Result<(), ValidationError> {
    let Some(t) = timeout_ms else {
        return Ok(());
    };
    if t < MIN_TIMEOUT_MS {
        return Err(ValidationError::TimeoutTooSmall {
            min: MIN_TIMEOUT_MS,
            actual: t,
        });
    }
    if t > MAX_TIMEOUT_MS {
        return Err(ValidationError::TimeoutTooLarge {
            max: MAX_TIMEOUT_MS,
            actual: t,
        });
    }
    Ok(())
}

/// Validate a full execute request. The code check runs first.
pub fn validate_execute_request(
    code: &str,
    timeout_ms: Option<u64>,
    max_code_length: usize,
) -> Result<(), ValidationError> {
    validate_code(code, max_code_length)?;
    validate_timeout(timeout_ms)
}
