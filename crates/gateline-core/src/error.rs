//! Error types for the Gateline core library.

use thiserror::Error;

/// Result type alias using the Gateline core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Gateline operations.
///
/// Config loading wraps I/O and parse failures with the offending path, so
/// a single variant carries them all.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
