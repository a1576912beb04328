//! Sqlpilot AI crate - streaming client for the generation backend.
//!
//! Turns one (mode, text) pair into one complete answer by POSTing to an
//! external line-delimited streaming endpoint, selecting a credential per
//! function mode, and reassembling the event stream into a single string.

pub mod assemble;
pub mod client;
pub mod error;

pub use assemble::StreamAssembler;
pub use client::{AiClient, GenerationBackend, GenerationRequest};
pub use error::AiError;
