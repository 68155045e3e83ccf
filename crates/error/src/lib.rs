//! # noctua-error
//!
//! Unified error types for the noctua driver.
//!
//! All errors carry:
//! - Numeric error codes (NOCTUA-XXXX) grouped into stable ranges
//! - Structured context (execution id, query state, remote reason)
//! - Actionable hints where recovery is possible

mod code;
mod context;
mod convert;

pub use code::{ErrorCategory, ErrorCode};
pub use context::ErrorContext;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The unified error type for all driver operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverError {
    /// Numeric error code (e.g., "NOCTUA-2001")
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Structured context for programmatic handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    /// Actionable suggestion for recovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl DriverError {
    /// Create a new error with code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
        }
    }

    /// Add structured context
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Add an actionable hint
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Whether the retry helper may re-attempt the failed operation.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Serialize to JSON for API responses and logs
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize DriverError: {}", e);
            format!(
                r#"{{"code":"{}","message":"Serialization failed"}}"#,
                self.code
            )
        })
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (Hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for DriverError {}

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;
