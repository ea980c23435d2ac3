use thiserror::Error;

/// Error type for PDF image analysis
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to load PDF: {0}")]
    Load(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Content stream error: {0}")]
    ContentStream(String),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
