//! Error types for raop-play
//!
//! Defines crate-level error types using thiserror. Failures inside a running
//! session (bad chunk, failed artwork fetch) are logged and absorbed by the
//! worker that hit them; only setup failures surface through [`Error`].

use thiserror::Error;

/// Main error type for raop-play
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio source could not be opened
    #[error("Cannot open audio source {0}")]
    Source(String),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] raop_common::Error),
}

/// Convenience Result type using raop-play Error
pub type Result<T> = std::result::Result<T, Error>;
