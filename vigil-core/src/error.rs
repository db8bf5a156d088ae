use thiserror::Error;

/// Unified error type for Vigil.
#[derive(Error, Debug)]
pub enum VigilError {
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid media type: {0}")]
    InvalidMediaType(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl VigilError {
    /// Map to HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            VigilError::InvalidMethod(_) => 405,
            VigilError::InvalidMediaType(_) => 415,
            VigilError::Config(_) => 500,
        }
    }
}
