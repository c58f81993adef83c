// libs/voice-session-cell/src/services/mod.rs

pub mod manager;

pub use manager::SessionManager;
