// libs/voice-session-cell/src/lib.rs
//! # Voice Session Cell
//!
//! Tracks dictation sessions for consultation sections through
//! `idle -> recording -> stopped -> processed`. Capture is decoupled from
//! extraction: `stop` stores the transcript and returns immediately, and a
//! downstream extraction attempt later claims the transcript and marks the
//! session processed.
//!
//! ## API Endpoints
//!
//! - `POST /voice/sessions` - Start recording for a consultation section
//! - `POST /voice/sessions/{id}/stop` - Stop recording and store the transcript
//! - `GET /voice/sessions/{id}` - Get session details

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{RecordingSession, SessionError, SessionState};
pub use router::voice_session_routes;
pub use services::SessionManager;
