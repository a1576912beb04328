//! Sqlpilot core crate - shared types, configuration, errors, audit IDs.
//!
//! Domain types (function modes, audit-log entries) and cross-cutting
//! concerns (error taxonomy, TOML configuration, sortable log IDs) used
//! by every other crate in the workspace.

pub mod config;
pub mod error;
pub mod logid;
pub mod types;

pub use config::PilotConfig;
pub use error::{PilotError, Result};
pub use logid::generate_log_id;
pub use types::{ActorRole, ConversationLogEntry, FunctionMode, LoginLogEntry, SystemStamp};
