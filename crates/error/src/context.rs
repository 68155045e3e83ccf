use serde::{Deserialize, Serialize};

/// Structured context attached to driver errors.
///
/// Carries enough state for programmatic handling: which execution the
/// error belongs to, the last known remote query state, and the reason
/// string the service reported, so callers never have to parse the
/// human-readable message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Remote execution identifier, when one was assigned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,

    /// Last known remote query state (e.g. "RUNNING", "FAILED")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_state: Option<String>,

    /// Failure reason reported by the remote service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Output location the execution writes to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_location: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_execution_id(mut self, id: impl Into<String>) -> Self {
        self.execution_id = Some(id.into());
        self
    }

    pub fn with_query_state(mut self, state: impl Into<String>) -> Self {
        self.query_state = Some(state.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_output_location(mut self, location: impl Into<String>) -> Self {
        self.output_location = Some(location.into());
        self
    }
}
