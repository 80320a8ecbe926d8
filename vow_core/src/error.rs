//! Error types for Vow Core

use thiserror::Error;

/// Result type for vow operations
pub type Result<T> = std::result::Result<T, VowError>;

/// Errors surfaced by construction, settlement, and the combinators
#[derive(Error, Debug)]
pub enum VowError {
    /// A constructor or combinator was called with unusable arguments
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A settled deferred was rejected a second time
    #[error("Trying to reject a settled deferred")]
    DoubleSettlement,

    /// An executor failed during construction
    #[error("Executor failed: {0}")]
    ExecutorFailed(String),

    /// An observer failed while a settlement was being delivered
    #[error("Observer failed: {0}")]
    ObserverFailed(String),
}
