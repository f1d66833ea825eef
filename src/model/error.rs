//! Error types for the viewport engine.
//!
//! This module defines the error taxonomy using `thiserror` for structured error
//! handling. Errors compose via `?` and `From` conversions.
//!
//! # Error Hierarchy
//!
//! - [`EngineError`] - Returned by every cancellable buffer and navigation operation
//!   - `Cancelled` - The operation was superseded or its token was cancelled
//!   - [`SourceError`] - A message source failed to read
//!
//! # What is *not* an error
//!
//! - **Lookup failures** (an exact bookmark that does not exist) are `Option::None`.
//! - **Invariant violations** (non-contiguous window append, shifting a buffer that has no
//!   sources) are programming errors and panic through `assert!`.
//!
//! # Recovery Strategy
//!
//! Cancellation is the normal outcome of superseded navigation: it leaves the buffer
//! untouched and must not be reported as a failure. Source faults propagate unmodified to
//! the caller of the navigation; the engine never retries and never commits partial state.

use super::identifiers::SourceId;
use thiserror::Error;

/// Error returned by cancellable engine operations.
///
/// # Examples
///
/// ```
/// use logscope::model::error::{EngineError, SourceError};
///
/// fn read() -> Result<(), SourceError> {
///     Err(SourceError::Io(std::io::Error::other("disk gone")))
/// }
///
/// fn navigate() -> Result<(), EngineError> {
///     // SourceError automatically converts to EngineError via From
///     read()?;
///     Ok(())
/// }
///
/// assert!(!navigate().unwrap_err().is_cancelled());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    /// The operation observed its cancellation token and stopped.
    ///
    /// Raised when a newer navigation supersedes this one, or when the owner cancels
    /// explicitly. State is exactly as it was before the operation started.
    #[error("Operation cancelled")]
    Cancelled,

    /// A message source failed while the operation was reading from it.
    ///
    /// **Recovery**: Present to the user. No partial state was committed; retrying is the
    /// caller's decision.
    #[error("Source read failed: {0}")]
    Source(#[from] SourceError),
}

impl EngineError {
    /// True for the distinguished cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

/// Failures reported by message sources.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source found data it could not turn into a message.
    #[error("Malformed data in {source_id} at position {position}: {reason}")]
    Malformed {
        /// Source that produced the data.
        source_id: SourceId,
        /// Byte position of the offending data.
        position: u64,
        /// Human-readable description.
        reason: String,
    },

    /// The source was closed or otherwise cannot serve reads anymore.
    #[error("Source {source_id} is unavailable")]
    Unavailable {
        /// Source that became unavailable.
        source_id: SourceId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_recognised() {
        assert!(EngineError::Cancelled.is_cancelled());
    }

    #[test]
    fn source_error_converts_into_engine_error() {
        fn inner() -> Result<(), SourceError> {
            Err(SourceError::Unavailable {
                source_id: SourceId::new(3),
            })
        }
        fn outer() -> Result<(), EngineError> {
            inner()?;
            Ok(())
        }

        let err = outer().unwrap_err();
        assert!(matches!(
            err,
            EngineError::Source(SourceError::Unavailable { .. })
        ));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn io_error_converts_into_source_error() {
        let err: SourceError = std::io::Error::other("boom").into();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn malformed_message_mentions_source_and_position() {
        let err = SourceError::Malformed {
            source_id: SourceId::new(2),
            position: 4096,
            reason: "bad header".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("source#2"));
        assert!(msg.contains("4096"));
        assert!(msg.contains("bad header"));
    }

    #[test]
    fn engine_error_display_wraps_source_error() {
        let err = EngineError::from(SourceError::Unavailable {
            source_id: SourceId::new(9),
        });
        assert_eq!(err.to_string(), "Source read failed: Source source#9 is unavailable");
    }
}
