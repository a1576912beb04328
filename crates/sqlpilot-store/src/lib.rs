//! Sqlpilot store crate - SQLite persistence for audit logs.
//!
//! Provides a WAL-mode SQLite database with migrations and the two
//! append-only repositories the conversation core depends on: one row per
//! established session (login log) and one row per conversational turn
//! (conversation log).

pub mod audit;
pub mod db;
pub mod migrations;

pub use audit::{ConversationLogRepository, LoginLogRepository};
pub use db::Database;
