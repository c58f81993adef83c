// libs/extraction-cell/src/services/mod.rs

pub mod appointment;
pub mod dates;
pub mod extractor;
pub mod filters;
pub mod model;
pub mod schema;
pub mod validator;

pub use appointment::AppointmentExtractor;
pub use extractor::ConfidenceScoredExtractor;
pub use filters::FilterExtractor;
pub use model::{LanguageModel, ModelError, OpenAiModel, SchemaHint, UnavailableModel};
pub use schema::{FieldSpec, FieldType, SchemaSpec};
pub use validator::validate;
