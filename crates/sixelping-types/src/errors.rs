use thiserror::Error;

pub type Result<T, E = SixelError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum SixelError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(
        "invalid dimensions: expected {expected_width}x{expected_height}, got {actual_width}x{actual_height}"
    )]
    InvalidDimensions {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("invalid buffer length: expected {expected} bytes, got {actual}")]
    InvalidBufferLength { expected: usize, actual: usize },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("canvas error: {0}")]
    Canvas(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SixelError {
    /// Whether the error was caused by the caller's payload rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SixelError::InvalidDimensions { .. }
                | SixelError::InvalidBufferLength { .. }
                | SixelError::Decode(_)
        )
    }
}
