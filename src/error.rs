use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// `write` was called after the session was finalized. Call `reset` to start over.
    #[error("session is already finalized; reset it before writing more text")]
    InvalidState,
}

/// Failure reported by a [`crate::BlockParser`].
///
/// The merge engine never surfaces this to callers: a failed span parses to zero blocks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("block parse failed: {reason}")]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
