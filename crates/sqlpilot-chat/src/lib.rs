//! Sqlpilot chat crate - the conversation orchestrator.
//!
//! For each inbound user turn: bind it to a conversation, serialize turns
//! within that conversation, audit the user turn, call the generation
//! backend, audit the AI turn, and hand the assembled answer back.

pub mod error;
pub mod orchestrator;

pub use error::TurnError;
pub use orchestrator::{ConversationOrchestrator, SessionIdentity, TurnOutcome, TurnRequest};
