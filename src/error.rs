//! Error types for the rate-adaptation engine.

use thiserror::Error;

/// Result type for rate-control operations.
pub type RateResult<T> = Result<T, RateError>;

/// Errors surfaced at the engine boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateError {
    /// The capability snapshot exposes no usable MCS group; the peer
    /// must be handled by the host's legacy rate algorithm.
    #[error("no supported MCS groups in capability snapshot")]
    NoHtSupport,

    /// A configuration field is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
