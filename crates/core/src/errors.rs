use thiserror::Error;

/// Capability-level failure taxonomy. Every variant the user can recover
/// from carries enough detail for the agent to render the *specific*
/// constraint that failed, so the next utterance can correct it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AssistantError {
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("{what} was not found")]
    NotFound { what: String },
    #[error("insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: u32, requested: u32 },
    #[error("{what} timed out")]
    Timeout { what: String },
    #[error("confirmation email could not be queued: {message}")]
    QueueingFailed { message: String },
    #[error("internal failure: {message}")]
    Internal { message: String },
}

impl AssistantError {
    /// Machine-readable code carried across the tool-invocation boundary.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request",
            Self::NotFound { .. } => "not_found",
            Self::InsufficientStock { .. } => "insufficient_stock",
            Self::Timeout { .. } => "timeout",
            Self::QueueingFailed { .. } => "queueing_failed",
            Self::Internal { .. } => "internal_failure",
        }
    }

    /// Whether the user can fix this by rephrasing or adjusting the
    /// request. Internal failures are apologised for, never detailed.
    pub fn recoverable(&self) -> bool {
        !matches!(self, Self::Internal { .. })
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::AssistantError;

    #[test]
    fn reason_codes_are_stable() {
        let cases = [
            (AssistantError::InvalidRequest { message: "x".into() }, "invalid_request"),
            (AssistantError::not_found("product 9"), "not_found"),
            (AssistantError::InsufficientStock { available: 1, requested: 2 }, "insufficient_stock"),
            (AssistantError::Timeout { what: "dispatch".into() }, "timeout"),
            (AssistantError::QueueingFailed { message: "queue full".into() }, "queueing_failed"),
            (AssistantError::internal("pool closed"), "internal_failure"),
        ];
        for (error, code) in cases {
            assert_eq!(error.reason_code(), code);
        }
    }

    #[test]
    fn only_internal_is_unrecoverable() {
        assert!(!AssistantError::internal("x").recoverable());
        assert!(AssistantError::InsufficientStock { available: 0, requested: 1 }.recoverable());
        assert!(AssistantError::Timeout { what: "search".into() }.recoverable());
    }

    #[test]
    fn insufficient_stock_message_names_both_quantities() {
        let error = AssistantError::InsufficientStock { available: 2, requested: 5 };
        let text = error.to_string();
        assert!(text.contains('2') && text.contains('5'));
    }
}
