//! Error types for the preview tool

use thiserror::Error;

/// Result type alias for preview operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing or loading previews
///
/// None of these halt the tool: the controller reports input errors inline and
/// a failed frame only affects its own device.
#[derive(Error, Debug)]
pub enum Error {
    /// No URL was provided
    #[error("Please enter a URL")]
    EmptyInput,

    /// The URL could not be parsed, even after defaulting the scheme
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The URL names a scheme other than http or https
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// A device identifier that is not in the device table
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// A manual zoom multiplier outside the accepted range
    #[error("Invalid zoom: {0}")]
    InvalidZoom(String),

    /// Failed to mount or load a preview frame
    #[error("Failed to load URL: {0}")]
    LoadError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// I/O error while reading configuration or writing output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

}

impl Error {
    /// The inline message shown next to the URL field
    pub fn inline_message(&self) -> String {
        match self {
            Error::EmptyInput => "Please enter a URL".to_string(),
            Error::InvalidUrl(_) | Error::UnsupportedScheme(_) => {
                "Please enter a valid URL".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}
