//! Convenience result type alias for AgentRelay.

use crate::error::RelayError;

/// A specialized `Result` type for AgentRelay operations.
///
/// Defined as a convenience so that every crate does not need to write
/// `Result<T, RelayError>` explicitly.
pub type RelayResult<T> = Result<T, RelayError>;
