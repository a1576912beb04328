//! Repository implementations for the audit tables.
//!
//! Each `create` performs a single durable INSERT; a failed insert is a
//! hard failure of the enclosing operation. Rows are never updated.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;

use sqlpilot_core::error::PilotError;
use sqlpilot_core::types::{ActorRole, ConversationLogEntry, FunctionMode, LoginLogEntry, SystemStamp};

use crate::db::Database;

/// Repository for login audit rows (one per established session).
pub struct LoginLogRepository {
    db: Arc<Database>,
}

impl LoginLogRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one login row. Never updates.
    pub fn create(&self, entry: &LoginLogEntry) -> Result<(), PilotError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO login_logs (log_id, actor_no, login_at, client_addr,
                    reg_at, reg_actor_no, reg_ognz_no, reg_syst_cd, reg_prgr_id,
                    chg_at, chg_actor_no, chg_ognz_no, chg_syst_cd, chg_prgr_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    entry.log_id,
                    entry.actor_no,
                    entry.login_at.timestamp_micros(),
                    entry.client_addr,
                    Utc::now().timestamp_micros(),
                    entry.stamp.actor_no,
                    entry.stamp.organization_no,
                    entry.stamp.system_cd,
                    entry.stamp.program_id,
                ],
            )
            .map_err(|e| PilotError::Storage(format!("Failed to write login log: {}", e)))?;
            Ok(())
        })
    }

    /// Whether a login row exists for the given id.
    pub fn exists(&self, log_id: &str) -> Result<bool, PilotError> {
        self.db.with_conn(|conn| {
            let found: Option<String> = conn
                .query_row(
                    "SELECT log_id FROM login_logs WHERE log_id = ?1",
                    rusqlite::params![log_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| PilotError::Storage(e.to_string()))?;
            Ok(found.is_some())
        })
    }

    /// Total number of login rows.
    pub fn count(&self) -> Result<i64, PilotError> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM login_logs", [], |row| row.get(0))
                .map_err(|e| PilotError::Storage(e.to_string()))
        })
    }
}

/// Repository for conversational-turn audit rows.
pub struct ConversationLogRepository {
    db: Arc<Database>,
}

impl ConversationLogRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one turn row. Never updates.
    pub fn create(&self, entry: &ConversationLogEntry) -> Result<(), PilotError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversation_logs (log_id, login_log_id, function_mode,
                    conversation_id, seq, role, at, content,
                    reg_at, reg_actor_no, reg_ognz_no, reg_syst_cd, reg_prgr_id,
                    chg_at, chg_actor_no, chg_ognz_no, chg_syst_cd, chg_prgr_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                         ?9, ?10, ?11, ?12, ?13)",
                rusqlite::params![
                    entry.log_id,
                    entry.login_log_id,
                    entry.function_mode.as_str(),
                    entry.conversation_id,
                    entry.seq,
                    entry.role.as_code(),
                    entry.at.timestamp_micros(),
                    entry.content,
                    Utc::now().timestamp_micros(),
                    entry.stamp.actor_no,
                    entry.stamp.organization_no,
                    entry.stamp.system_cd,
                    entry.stamp.program_id,
                ],
            )
            .map_err(|e| {
                PilotError::Storage(format!("Failed to write conversation log: {}", e))
            })?;
            Ok(())
        })
    }

    /// All turns of one conversation, ordered by seq.
    pub fn find_by_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<ConversationLogEntry>, PilotError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT log_id, login_log_id, function_mode, conversation_id, seq,
                            role, at, content, reg_actor_no, reg_ognz_no, reg_syst_cd,
                            reg_prgr_id
                     FROM conversation_logs
                     WHERE conversation_id = ?1
                     ORDER BY seq ASC",
                )
                .map_err(|e| PilotError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![conversation_id], |row| {
                    Ok(row_to_entry(row))
                })
                .map_err(|e| PilotError::Storage(e.to_string()))?;

            let mut entries = Vec::new();
            for row in rows {
                let entry = row.map_err(|e| PilotError::Storage(e.to_string()))??;
                entries.push(entry);
            }
            Ok(entries)
        })
    }

    /// Number of committed turns for one conversation.
    pub fn count_for(&self, conversation_id: &str) -> Result<i64, PilotError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM conversation_logs WHERE conversation_id = ?1",
                rusqlite::params![conversation_id],
                |row| row.get(0),
            )
            .map_err(|e| PilotError::Storage(e.to_string()))
        })
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<ConversationLogEntry, PilotError> {
    let mode_str: String = row
        .get(2)
        .map_err(|e| PilotError::Storage(e.to_string()))?;
    let role_str: String = row
        .get(5)
        .map_err(|e| PilotError::Storage(e.to_string()))?;
    let at_micros: i64 = row
        .get(6)
        .map_err(|e| PilotError::Storage(e.to_string()))?;

    Ok(ConversationLogEntry {
        log_id: row.get(0).map_err(|e| PilotError::Storage(e.to_string()))?,
        login_log_id: row.get(1).map_err(|e| PilotError::Storage(e.to_string()))?,
        function_mode: FunctionMode::parse(&mode_str)
            .ok_or_else(|| PilotError::Storage(format!("Unknown function mode: {}", mode_str)))?,
        conversation_id: row.get(3).map_err(|e| PilotError::Storage(e.to_string()))?,
        seq: row.get(4).map_err(|e| PilotError::Storage(e.to_string()))?,
        role: ActorRole::parse(&role_str)
            .ok_or_else(|| PilotError::Storage(format!("Unknown role: {}", role_str)))?,
        at: DateTime::from_timestamp_micros(at_micros)
            .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC),
        content: row
            .get::<_, Option<String>>(7)
            .map_err(|e| PilotError::Storage(e.to_string()))?
            .unwrap_or_default(),
        stamp: SystemStamp {
            actor_no: row.get(8).map_err(|e| PilotError::Storage(e.to_string()))?,
            organization_no: row.get(9).map_err(|e| PilotError::Storage(e.to_string()))?,
            system_cd: row.get(10).map_err(|e| PilotError::Storage(e.to_string()))?,
            program_id: row.get(11).map_err(|e| PilotError::Storage(e.to_string()))?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlpilot_core::generate_log_id;

    fn make_repos() -> (LoginLogRepository, ConversationLogRepository) {
        let db = Arc::new(Database::in_memory().unwrap());
        (
            LoginLogRepository::new(Arc::clone(&db)),
            ConversationLogRepository::new(db),
        )
    }

    fn login_entry() -> LoginLogEntry {
        LoginLogEntry {
            log_id: generate_log_id(),
            actor_no: "TESTUSER".to_string(),
            login_at: Utc::now(),
            client_addr: Some("127.0.0.1".to_string()),
            stamp: SystemStamp::default(),
        }
    }

    fn turn_entry(cvrs: &str, seq: i64, role: ActorRole, content: &str) -> ConversationLogEntry {
        ConversationLogEntry {
            log_id: generate_log_id(),
            login_log_id: generate_log_id(),
            function_mode: FunctionMode::Create,
            conversation_id: cvrs.to_string(),
            seq,
            role,
            at: Utc::now(),
            content: content.to_string(),
            stamp: SystemStamp::default(),
        }
    }

    // ---- Login log ----

    #[test]
    fn test_create_login_log() {
        let (logins, _) = make_repos();
        let entry = login_entry();
        logins.create(&entry).unwrap();
        assert!(logins.exists(&entry.log_id).unwrap());
        assert_eq!(logins.count().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_login_log_id_rejected() {
        let (logins, _) = make_repos();
        let entry = login_entry();
        logins.create(&entry).unwrap();
        let result = logins.create(&entry);
        assert!(matches!(result, Err(PilotError::Storage(_))));
    }

    // ---- Conversation log ----

    #[test]
    fn test_create_and_read_turns() {
        let (_, turns) = make_repos();
        turns
            .create(&turn_entry("cvrs_a", 1, ActorRole::User, "show orders"))
            .unwrap();
        turns
            .create(&turn_entry("cvrs_a", 2, ActorRole::Ai, "SELECT * FROM orders"))
            .unwrap();

        let rows = turns.find_by_conversation("cvrs_a").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].seq, 1);
        assert_eq!(rows[0].role, ActorRole::User);
        assert_eq!(rows[0].content, "show orders");
        assert_eq!(rows[1].seq, 2);
        assert_eq!(rows[1].role, ActorRole::Ai);
        assert_eq!(rows[1].content, "SELECT * FROM orders");
    }

    #[test]
    fn test_turns_ordered_by_seq_not_insert_order() {
        let (_, turns) = make_repos();
        turns
            .create(&turn_entry("cvrs_b", 2, ActorRole::Ai, "answer"))
            .unwrap();
        turns
            .create(&turn_entry("cvrs_b", 1, ActorRole::User, "question"))
            .unwrap();

        let rows = turns.find_by_conversation("cvrs_b").unwrap();
        assert_eq!(rows[0].seq, 1);
        assert_eq!(rows[1].seq, 2);
    }

    #[test]
    fn test_conversations_are_isolated() {
        let (_, turns) = make_repos();
        turns
            .create(&turn_entry("cvrs_c", 1, ActorRole::User, "one"))
            .unwrap();
        turns
            .create(&turn_entry("cvrs_d", 1, ActorRole::User, "two"))
            .unwrap();

        assert_eq!(turns.count_for("cvrs_c").unwrap(), 1);
        assert_eq!(turns.count_for("cvrs_d").unwrap(), 1);
        assert_eq!(turns.count_for("cvrs_missing").unwrap(), 0);
    }

    #[test]
    fn test_duplicate_seq_within_conversation_rejected() {
        let (_, turns) = make_repos();
        turns
            .create(&turn_entry("cvrs_e", 1, ActorRole::User, "first"))
            .unwrap();
        let result = turns.create(&turn_entry("cvrs_e", 1, ActorRole::Ai, "dup"));
        assert!(matches!(result, Err(PilotError::Storage(_))));
    }

    #[test]
    fn test_wall_clock_order_preserved() {
        let (_, turns) = make_repos();
        let user = turn_entry("cvrs_f", 1, ActorRole::User, "q");
        turns.create(&user).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let ai = turn_entry("cvrs_f", 2, ActorRole::Ai, "a");
        turns.create(&ai).unwrap();

        let rows = turns.find_by_conversation("cvrs_f").unwrap();
        assert!(rows[0].at < rows[1].at);
    }

    #[test]
    fn test_unicode_content_round_trip() {
        let (_, turns) = make_repos();
        let content = "SELECT '\u{c8fc}\u{bb38}' FROM orders; -- \u{1f50d}";
        turns
            .create(&turn_entry("cvrs_g", 1, ActorRole::User, content))
            .unwrap();
        let rows = turns.find_by_conversation("cvrs_g").unwrap();
        assert_eq!(rows[0].content, content);
    }
}
