use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric error codes following NOCTUA-XXXX format.
///
/// ## Code Ranges
/// - **1000-1999**: Remote service / transport errors
/// - **2000-2999**: Query execution errors
/// - **3000-3999**: Local state errors (closed session, cleared result set)
/// - **4000-4999**: Configuration errors
/// - **5000-5999**: Internal/decode errors
///
/// Codes are stable across versions (semver contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    // === Remote Errors (1000-1999) ===
    /// NOCTUA-1001: Remote service throttled the request
    Throttled = 1001,
    /// NOCTUA-1002: Network timeout talking to the remote service
    NetworkTimeout = 1002,
    /// NOCTUA-1003: Remote service temporarily unavailable
    ServiceUnavailable = 1003,
    /// NOCTUA-1004: Unclassified remote failure after retries
    RemoteFailed = 1004,

    // === Query Errors (2000-2999) ===
    /// NOCTUA-2001: Query reached FAILED state on the remote service
    QueryFailed = 2001,
    /// NOCTUA-2002: Query was cancelled on the remote service
    QueryCancelled = 2002,
    /// NOCTUA-2003: Polling was interrupted by the caller
    QueryInterrupted = 2003,
    /// NOCTUA-2004: Execution identifier unknown to the remote service
    UnknownExecution = 2004,

    // === State Errors (3000-3999) ===
    /// NOCTUA-3001: Operation on a closed session
    SessionClosed = 3001,
    /// NOCTUA-3002: Operation on a cleared result set
    ResultSetCleared = 3002,
    /// NOCTUA-3003: Operation requires a submitted query
    NotSubmitted = 3003,

    // === Configuration Errors (4000-4999) ===
    /// NOCTUA-4001: Invalid driver configuration
    InvalidConfig = 4001,
    /// NOCTUA-4002: Output location missing or malformed
    InvalidOutputLocation = 4002,

    // === Internal Errors (5000-5999) ===
    /// NOCTUA-5001: Failed to decode a result payload
    DecodeFailed = 5001,
    /// NOCTUA-5002: Storage sink operation failed
    StorageFailed = 5002,
    /// NOCTUA-5003: Unexpected internal state
    Internal = 5003,

    /// NOCTUA-9999: Unknown/unclassified error
    Unknown = 9999,
}

/// Coarse grouping of error codes, used for retry classification and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    Remote,
    Query,
    State,
    Config,
    Internal,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Get the formatted code string (e.g., "NOCTUA-2001")
    pub fn as_str(&self) -> String {
        format!("NOCTUA-{:04}", self.as_u16())
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self.as_u16() {
            1000..=1999 => ErrorCategory::Remote,
            2000..=2999 => ErrorCategory::Query,
            3000..=3999 => ErrorCategory::State,
            4000..=4999 => ErrorCategory::Config,
            _ => ErrorCategory::Internal,
        }
    }

    /// Whether an error with this code may be retried.
    ///
    /// Only transient remote errors qualify. Query failures carry a reason
    /// from the service and retrying would just re-run a broken query;
    /// state and config errors are local and deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::Throttled | ErrorCode::NetworkTimeout | ErrorCode::ServiceUnavailable
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let num: u16 = s
            .strip_prefix("NOCTUA-")
            .ok_or_else(|| format!("Invalid error code format: {}", s))?
            .parse()
            .map_err(|_| format!("Invalid error code number: {}", s))?;

        let code = match num {
            1001 => ErrorCode::Throttled,
            1002 => ErrorCode::NetworkTimeout,
            1003 => ErrorCode::ServiceUnavailable,
            1004 => ErrorCode::RemoteFailed,
            2001 => ErrorCode::QueryFailed,
            2002 => ErrorCode::QueryCancelled,
            2003 => ErrorCode::QueryInterrupted,
            2004 => ErrorCode::UnknownExecution,
            3001 => ErrorCode::SessionClosed,
            3002 => ErrorCode::ResultSetCleared,
            3003 => ErrorCode::NotSubmitted,
            4001 => ErrorCode::InvalidConfig,
            4002 => ErrorCode::InvalidOutputLocation,
            5001 => ErrorCode::DecodeFailed,
            5002 => ErrorCode::StorageFailed,
            5003 => ErrorCode::Internal,
            _ => ErrorCode::Unknown,
        };
        Ok(code)
    }
}
