//! Error types for the accumulation engine.
//!
//! [`Error`] is the outcome a single caller observes when its submission does
//! not resolve to an output. It is generic over the batch handler's own error
//! type `E`, which is shared behind an [`Arc`] so that one handler failure can
//! be delivered to every request of a batch without requiring `E: Clone`.
//!
//! ## Error Cases
//! - `Handler`: the batch handler failed for a batch or a singleton retry.
//! - `OutputCountMismatch` / `MissingOutput`: the handler broke its contract
//!   by returning the wrong number of outputs or an output set that does not
//!   cover the submitted items.
//! - `Cancelled`: the caller's cancellation token fired before a result
//!   arrived.
//! - `Shutdown`: the accumulator stopped before the request was dispatched.
//! - `ChannelError`: the result slot was dropped without a value.

use core::fmt;
use std::sync::Arc;

pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Unified per-request error type.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum Error<E> {
    /// The batch handler returned an error.
    #[error("batch handler failed: {0}")]
    Handler(Arc<E>),

    /// The handler returned a different number of outputs than it was given
    /// items.
    #[error(
        "wrong handler behavior: expected {expected} outputs for {expected} inputs, got {actual}"
    )]
    OutputCountMismatch { expected: usize, actual: usize },

    /// The handler returned the right number of outputs but at least one
    /// submitted item has no entry.
    #[error("wrong handler behavior: no output returned for a submitted item")]
    MissingOutput,

    /// The caller stopped waiting for the result.
    #[error("request cancelled by caller")]
    Cancelled,

    /// The accumulator shut down before the request could be dispatched.
    #[error("accumulator is shutting down")]
    Shutdown,

    /// Internal channel failure (the result sender was dropped).
    #[error("channel error: {context}")]
    ChannelError { context: String },
}

impl<E> Error<E> {
    pub(crate) fn handler(err: E) -> Self {
        Self::Handler(Arc::new(err))
    }

    /// Returns `true` when the handler broke its output contract.
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::OutputCountMismatch { .. } | Self::MissingOutput
        )
    }

    /// Returns the handler error, if this outcome carries one.
    pub fn handler_error(&self) -> Option<&E> {
        match self {
            Self::Handler(err) => Some(err),
            _ => None,
        }
    }
}

impl<E> Clone for Error<E> {
    fn clone(&self) -> Self {
        match self {
            Self::Handler(err) => Self::Handler(Arc::clone(err)),
            Self::OutputCountMismatch { expected, actual } => Self::OutputCountMismatch {
                expected: *expected,
                actual: *actual,
            },
            Self::MissingOutput => Self::MissingOutput,
            Self::Cancelled => Self::Cancelled,
            Self::Shutdown => Self::Shutdown,
            Self::ChannelError { context } => Self::ChannelError {
                context: context.clone(),
            },
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handler(err) => f.debug_tuple("Handler").field(err).finish(),
            Self::OutputCountMismatch { expected, actual } => f
                .debug_struct("OutputCountMismatch")
                .field("expected", expected)
                .field("actual", actual)
                .finish(),
            Self::MissingOutput => f.write_str("MissingOutput"),
            Self::Cancelled => f.write_str("Cancelled"),
            Self::Shutdown => f.write_str("Shutdown"),
            Self::ChannelError { context } => f
                .debug_struct("ChannelError")
                .field("context", context)
                .finish(),
        }
    }
}

/// Invalid [`AccumulatorOptions`](crate::AccumulatorOptions).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum OptionsError {
    /// `max_batch_size` must be at least 1.
    #[error("max_batch_size must be greater than 0")]
    ZeroBatchSize,

    /// `window` must be a non-zero duration.
    #[error("window duration must be greater than 0")]
    ZeroWindow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom")
        }
    }

    #[test]
    fn clone_shares_the_handler_error() {
        let err: Error<Boom> = Error::handler(Boom);
        let cloned = err.clone();
        match (&err, &cloned) {
            (Error::Handler(a), Error::Handler(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected handler errors"),
        }
        assert_eq!(cloned.handler_error(), Some(&Boom));
    }

    #[test]
    fn display_includes_handler_message() {
        let err: Error<Boom> = Error::handler(Boom);
        assert_eq!(err.to_string(), "batch handler failed: boom");

        let err: Error<Boom> = Error::OutputCountMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "wrong handler behavior: expected 3 outputs for 3 inputs, got 2"
        );
    }

    #[test]
    fn contract_violations_are_classified() {
        assert!(Error::<Boom>::MissingOutput.is_contract_violation());
        assert!(
            Error::<Boom>::OutputCountMismatch {
                expected: 1,
                actual: 0
            }
            .is_contract_violation()
        );
        assert!(!Error::<Boom>::Cancelled.is_contract_violation());
        assert!(!Error::handler(Boom).is_contract_violation());
    }
}
