//! Error types for ordered call verification.

use thiserror::Error;

/// Usage errors raised by sequences, loops and steps.
///
/// Every variant is fatal to the assertion that triggered it. The host
/// mocking layer is expected to surface these to the caller of the mocked
/// operation unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// An operation that needs an active sequence ran outside of one.
    #[error("{context} can only be called with an active sequence created with Sequence::create()")]
    NoActiveSequence { context: &'static str },

    /// A second sequence was opened in a context that already has one.
    #[error("cannot have more than one sequence per context")]
    DuplicateSequence,

    /// A recorded call did not match the expected next position.
    #[error("call to {setup} is out of sequence: {expected}")]
    OutOfSequence { setup: String, expected: String },

    /// A step was called more often than its upper bound allows.
    #[error("call to {setup} exceeded expected count: {expected}")]
    CountExceeded { setup: String, expected: String },

    /// Some expectation's minimum was never met.
    #[error("{context}: sequence is incomplete: {unmet}")]
    Incomplete { context: String, unmet: String },

    /// A `Times` range was built with `min > max`.
    #[error("invalid times range: min {min} is greater than max {max}")]
    InvalidTimes { min: i64, max: i64 },

    /// Steps or loops were declared after calls started being recorded.
    #[error("cannot declare steps or loops after calls have been recorded")]
    DeclarationClosed,

    /// A call was recorded after an earlier call already failed.
    #[error("sequence already failed: {first}")]
    AlreadyFailed { first: String },

    /// The sequence was used after it was closed.
    #[error("sequence is closed")]
    Closed,

    /// A loop or step handle does not belong to this sequence.
    #[error("unknown {kind} {id} in this sequence")]
    UnknownNode { kind: &'static str, id: usize },
}

impl SequenceError {
    /// Whether this error was raised while recording a call.
    #[must_use]
    pub fn is_invocation_error(&self) -> bool {
        matches!(
            self,
            SequenceError::OutOfSequence { .. }
                | SequenceError::CountExceeded { .. }
                | SequenceError::AlreadyFailed { .. }
        )
    }
}

/// Result type for sequence operations.
pub type Result<T> = std::result::Result<T, SequenceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_message_names_context() {
        let err = SequenceError::Incomplete {
            context: "At end of sequence".to_string(),
            unmet: "step open (#0) expected exactly once, called 0 times".to_string(),
        };
        assert!(err.to_string().starts_with("At end of sequence"));
    }

    #[test]
    fn test_no_active_sequence_message() {
        let err = SequenceError::NoActiveSequence {
            context: "creating a loop",
        };
        assert_eq!(
            err.to_string(),
            "creating a loop can only be called with an active sequence created with Sequence::create()"
        );
    }

    #[test]
    fn test_invocation_errors() {
        let out = SequenceError::OutOfSequence {
            setup: "a".into(),
            expected: "b".into(),
        };
        assert!(out.is_invocation_error());
        assert!(!SequenceError::DuplicateSequence.is_invocation_error());
    }
}
