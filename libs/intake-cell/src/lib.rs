// libs/intake-cell/src/lib.rs
//! # Intake Cell
//!
//! Entry point for free-form clinical requests. A query is classified into
//! one intent, dispatched to exactly one extractor, and returned in a single
//! normalized envelope. Extracted appointments and filter sets are then
//! resolved against live records and committed at most once.
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                    Intake Cell                      |
//! +-----------------------------------------------------+
//! |  models.rs           |  Intents, envelopes, commits |
//! |  handlers.rs         |  HTTP handlers, IntakeState  |
//! |  router.rs           |  Route definitions           |
//! |  services/           |                              |
//! |    classifier.rs     |  Keyword and model routing   |
//! |    orchestrator.rs   |  Classify then extract       |
//! |    commit.rs         |  Lookups, overlap, create    |
//! +-----------------------------------------------------+
//! ```
//!
//! ## API Endpoints
//!
//! - `POST /intake/query` - Classify and extract a free-form query
//! - `POST /intake/transcript` - Extract and book an appointment from a transcript
//! - `POST /intake/appointments/commit` - Book an appointment, optionally with a confirmed start
//! - `POST /intake/filters/commit` - Save a cohort filter set
//! - `GET /intake/filters/{id}` - Get a saved filter set

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use handlers::IntakeState;
pub use models::{
    CommitContext, CommitOutcome, CommitResult, IntakePayload, Intent, NormalizedResponse, QueryContext,
};
pub use router::intake_routes;
pub use services::{CommitResolver, IntentClassifier, IntentOrchestrator, KeywordClassifier, ModelClassifier};
