// libs/intake-cell/src/services/mod.rs

pub mod classifier;
pub mod commit;
pub mod orchestrator;

pub use classifier::{IntentClassifier, KeywordClassifier, ModelClassifier};
pub use commit::CommitResolver;
pub use orchestrator::IntentOrchestrator;
