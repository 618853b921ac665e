use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkupError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("PDF operation failed: {0}")]
    OperationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl MarkupError {
    /// True when the caller sent something unusable, as opposed to the
    /// document failing to load, mutate or serialize.
    pub fn is_client_error(&self) -> bool {
        matches!(self, MarkupError::InvalidRequest(_))
    }
}

impl From<lopdf::Error> for MarkupError {
    fn from(err: lopdf::Error) -> Self {
        MarkupError::OperationError(err.to_string())
    }
}
