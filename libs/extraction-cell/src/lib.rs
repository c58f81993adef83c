// libs/extraction-cell/src/lib.rs
//! # Extraction Cell
//!
//! Turns free clinical text into validated structured records using an
//! external language model whose output is treated as untrusted.
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                  Extraction Cell                    |
//! +-----------------------------------------------------+
//! |  models.rs        |  Candidates, clean results      |
//! |  error.rs         |  ExtractionError                |
//! |  services/        |                                 |
//! |    model.rs       |  LanguageModel + OpenAI client  |
//! |    schema.rs      |  Field specs and coercion       |
//! |    extractor.rs   |  Timeout, retries, confidence   |
//! |    validator.rs   |  Drop-don't-abort validation    |
//! |    dates.rs       |  Relative time resolution       |
//! |    filters.rs     |  Cohort filter extraction       |
//! |    appointment.rs |  Appointment extraction         |
//! |  testing.rs       |  Scripted model doubles         |
//! +-----------------------------------------------------+
//! ```
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use extraction_cell::services::{AppointmentExtractor, ConfidenceScoredExtractor, OpenAiModel};
//! use shared_config::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::from_env();
//! let model = Arc::new(OpenAiModel::new(&config)?);
//! let appointments = AppointmentExtractor::new(ConfidenceScoredExtractor::new(model, &config), &config);
//!
//! let intent = appointments.extract("next Tuesday at 3pm for a filling", chrono::Utc::now()).await?;
//! println!("needs confirmation: {}", intent.needs_confirmation);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod models;
pub mod services;
pub mod testing;

pub use error::ExtractionError;
pub use models::{
    AppointmentIntent, AppointmentTime, CleanResult, CleanValue, DroppedField, ExtractionCandidate,
    FilterExtraction, Validated,
};
pub use services::{
    AppointmentExtractor, ConfidenceScoredExtractor, FilterExtractor, LanguageModel, ModelError, OpenAiModel,
    SchemaSpec, UnavailableModel,
};
