use thiserror::Error;

use shared_models::error::{AppError, ErrorKind};

use crate::models::DroppedField;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Language understanding unavailable: {0}")]
    Unavailable(String),

    #[error("No usable structured data could be extracted")]
    EmptyExtraction { dropped: Vec<DroppedField> },
}

impl ExtractionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractionError::InvalidInput(_) => ErrorKind::InvalidInput,
            ExtractionError::Unavailable(_) => ErrorKind::ExtractionUnavailable,
            ExtractionError::EmptyExtraction { .. } => ErrorKind::EmptyExtraction,
        }
    }
}

impl From<ExtractionError> for AppError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::InvalidInput(msg) => AppError::InvalidInput(msg),
            ExtractionError::Unavailable(msg) => AppError::ExtractionUnavailable(msg),
            ExtractionError::EmptyExtraction { dropped } if dropped.is_empty() => {
                AppError::EmptyExtraction("no structured details were found in the text".to_string())
            }
            ExtractionError::EmptyExtraction { dropped } => {
                let names: Vec<&str> = dropped.iter().map(|d| d.field.as_str()).collect();
                AppError::EmptyExtraction(format!("nothing usable was found; not understood: {}", names.join(", ")))
            }
        }
    }
}
