//! Error types for the engine.

use thiserror::Error;

/// Top-level engine error.
///
/// Device-level failures (lost device, failed submits) are carried in the
/// `Gpu` variant and are not recoverable; the caller is expected to log the
/// cause and terminate. Everything else is ordinary error propagation.
#[derive(Error, Debug)]
pub enum Error {
    /// Unrecoverable GPU/device failures
    #[error("GPU error: {0}")]
    Gpu(String),

    /// Window creation or surface errors
    #[error("Window error: {0}")]
    Window(String),

    /// Asset or resource loading errors
    #[error("Resource error: {0}")]
    Resource(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file errors
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the engine's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
