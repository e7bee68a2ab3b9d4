//! Error types for the printer library

use thiserror::Error;

/// Printer error types
#[derive(Debug, Error)]
pub enum PrintError {
    /// TCP connect failed or was refused
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Socket write or flush failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Socket was never established or has been dropped
    #[error("Printer not connected: {0}")]
    NotConnected(String),

    /// Connect or write exceeded the configured timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Source image could not be decoded
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
