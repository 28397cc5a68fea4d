//! Pipeline Errors
//!
//! Failure taxonomy shared by every stage. Units that fail are reported as
//! strings in the batch error list; only input errors and strict alias
//! failures stop a batch outright.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller supplied something unusable; raised before any model call.
    #[error("input error: {0}")]
    Input(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("model call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The service answered but the payload was not usable JSON.
    #[error("malformed model reply: {0}")]
    MalformedReply(String),

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("alias resolution failed: {}", .0.join("; "))]
    Ambiguity(Vec<String>),

    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Whether another attempt at the same unit could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Transport(_)
                | PipelineError::Timeout(_)
                | PipelineError::MalformedReply(_)
                | PipelineError::Validation(_)
        )
    }

    /// Error lines as they appear in a batch report.
    pub fn messages(&self) -> Vec<String> {
        match self {
            PipelineError::Validation(errs) | PipelineError::Ambiguity(errs) => errs.clone(),
            other => vec![other.to_string()],
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(PipelineError::Timeout(Duration::from_millis(10)).is_retryable());
        assert!(PipelineError::Transport("reset".into()).is_retryable());
        assert!(!PipelineError::Cancelled.is_retryable());
        assert!(!PipelineError::Input("empty".into()).is_retryable());
    }

    #[test]
    fn test_messages_flatten_lists() {
        let err = PipelineError::Validation(vec!["/a bad".into(), "/b bad".into()]);
        assert_eq!(err.messages().len(), 2);
        assert_eq!(
            PipelineError::Timeout(Duration::from_millis(250)).to_string(),
            "model call timed out after 250ms"
        );
    }
}
