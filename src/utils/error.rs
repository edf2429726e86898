use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("Extraction timed out: {0}")]
    ExtractionTimeout(String),
    #[error("Extraction error: {0}")]
    ExtractionError(String),
    #[error("Could not parse extraction response: {0}")]
    ResponseParseError(String),
    #[error("Record store error: {0}")]
    StoreError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl LabelError {
    /// Upstream extraction failures are the only errors that abort an application.
    pub fn is_extraction_failure(&self) -> bool {
        matches!(
            self,
            LabelError::ExtractionTimeout(_)
                | LabelError::ExtractionError(_)
                | LabelError::ResponseParseError(_)
        )
    }
}

impl From<std::io::Error> for LabelError {
    fn from(err: std::io::Error) -> Self {
        LabelError::IoError(err.to_string())
    }
}

/// Reasons a field crop could not be produced. Never fatal for the application.
#[derive(Debug, Error)]
pub enum CropError {
    #[error("padded region {width}x{height} is empty after clamping to the image")]
    DegenerateRegion { width: i64, height: i64 },
    #[error("source image missing: {0}")]
    MissingSource(String),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("could not write crop: {0}")]
    Io(#[from] std::io::Error),
}
