//! Error types for deduplicated calls
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Group Error Enum ==
/// Error returned by a deduplicated call.
///
/// Producer errors are passed through untouched so every caller that shared
/// an execution sees exactly what the producer returned. The other variants
/// describe what happened to the caller's wait rather than to the producer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError<E> {
    /// The producer returned an error
    #[error("{0}")]
    Producer(E),

    /// The caller's own cancellation token fired before the call settled
    #[error("caller cancelled while waiting for the result")]
    Cancelled,

    /// The producer panicked; carries the panic message
    #[error("producer panicked: {0}")]
    Panicked(String),

    /// The execution was dropped before publishing a result
    #[error("in-flight call abandoned before completion")]
    Abandoned,
}

impl<E> GroupError<E> {
    /// Returns the producer error, if this is one.
    pub fn into_producer(self) -> Option<E> {
        match self {
            GroupError::Producer(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GroupError::Cancelled)
    }
}

// == Result Type Alias ==
/// Convenience Result type for deduplicated calls.
pub type Result<T, E> = std::result::Result<T, GroupError<E>>;
