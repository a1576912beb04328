//! Domain types shared across the workspace.
//!
//! FunctionMode is the single source of truth for the five AI functions;
//! wire codecs and credential selection both key off this enum, so the
//! mode strings never leak past the serde boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The AI function requested for a turn.
///
/// Each mode maps to its own backend credential; there is no fallback
/// between modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionMode {
    /// Generate SQL from a natural-language request.
    Create,
    /// Explain an existing SQL query.
    Explain,
    /// Validate and correct SQL grammar.
    Grammar,
    /// Add comments to an existing SQL query.
    Comment,
    /// Transform SQL from one dialect to another.
    Transform,
}

impl FunctionMode {
    /// All modes, in declaration order.
    pub const ALL: [FunctionMode; 5] = [
        FunctionMode::Create,
        FunctionMode::Explain,
        FunctionMode::Grammar,
        FunctionMode::Comment,
        FunctionMode::Transform,
    ];

    /// Wire/storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionMode::Create => "create",
            FunctionMode::Explain => "explain",
            FunctionMode::Grammar => "grammar",
            FunctionMode::Comment => "comment",
            FunctionMode::Transform => "transform",
        }
    }

    /// Parse from the wire/storage representation.
    pub fn parse(s: &str) -> Option<FunctionMode> {
        match s {
            "create" => Some(FunctionMode::Create),
            "explain" => Some(FunctionMode::Explain),
            "grammar" => Some(FunctionMode::Grammar),
            "comment" => Some(FunctionMode::Comment),
            "transform" => Some(FunctionMode::Transform),
            _ => None,
        }
    }
}

impl std::fmt::Display for FunctionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which party produced a conversational turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorRole {
    User,
    Ai,
}

impl ActorRole {
    /// Storage representation (member code column).
    pub fn as_code(&self) -> &'static str {
        match self {
            ActorRole::User => "USER",
            ActorRole::Ai => "AI",
        }
    }

    /// Parse from the storage representation.
    pub fn parse(s: &str) -> Option<ActorRole> {
        match s {
            "USER" => Some(ActorRole::User),
            "AI" => Some(ActorRole::Ai),
            _ => None,
        }
    }
}

/// Registrar bookkeeping stamped onto every audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStamp {
    /// Registering actor number.
    pub actor_no: String,
    /// Registering organization number.
    pub organization_no: String,
    /// System code.
    pub system_cd: String,
    /// Program identifier.
    pub program_id: String,
}

impl Default for SystemStamp {
    fn default() -> Self {
        Self {
            actor_no: "SYSPRAF".to_string(),
            organization_no: "SYSOGNZ".to_string(),
            system_cd: "ISA".to_string(),
            program_id: "SQL Assistant".to_string(),
        }
    }
}

/// One login audit row. Exactly one per established session; never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginLogEntry {
    /// 26-digit sortable identifier (see [`crate::logid`]).
    pub log_id: String,
    /// Actor number of the logging-in user.
    pub actor_no: String,
    /// Login timestamp.
    pub login_at: DateTime<Utc>,
    /// Client network address, when known.
    pub client_addr: Option<String>,
    /// Registrar bookkeeping.
    pub stamp: SystemStamp,
}

/// One conversational-turn audit row. Append-only; one per USER or AI turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationLogEntry {
    /// 26-digit sortable identifier.
    pub log_id: String,
    /// Foreign link to the session's login row.
    pub login_log_id: String,
    /// AI function requested for the turn.
    pub function_mode: FunctionMode,
    /// Conversation correlation key.
    pub conversation_id: String,
    /// Per-conversation turn counter, strictly increasing from 1.
    pub seq: i64,
    /// Who produced this turn.
    pub role: ActorRole,
    /// Turn timestamp.
    pub at: DateTime<Utc>,
    /// Raw turn content (user prompt or assembled answer).
    pub content: String,
    /// Registrar bookkeeping.
    pub stamp: SystemStamp,
}
