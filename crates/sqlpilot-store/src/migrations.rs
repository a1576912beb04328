//! Database schema migrations.
//!
//! Applies the initial schema: the login_logs and conversation_logs audit
//! tables plus the schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use sqlpilot_core::error::PilotError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), PilotError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| PilotError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| PilotError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: audit_schema");
    }

    Ok(())
}

/// Version 1: audit schema.
///
/// Timestamps are stored as unix microseconds so that wall-clock ordering
/// of turns within a conversation survives the round trip.
fn apply_v1(conn: &Connection) -> Result<(), PilotError> {
    conn.execute_batch(
        "
        -- One row per established session.
        CREATE TABLE IF NOT EXISTS login_logs (
            log_id          TEXT PRIMARY KEY NOT NULL CHECK (length(log_id) = 26),
            actor_no        TEXT NOT NULL,
            login_at        INTEGER NOT NULL,
            client_addr     TEXT,
            reg_at          INTEGER NOT NULL,
            reg_actor_no    TEXT NOT NULL,
            reg_ognz_no     TEXT NOT NULL,
            reg_syst_cd     TEXT NOT NULL,
            reg_prgr_id     TEXT NOT NULL,
            chg_at          INTEGER NOT NULL,
            chg_actor_no    TEXT NOT NULL,
            chg_ognz_no     TEXT NOT NULL,
            chg_syst_cd     TEXT NOT NULL,
            chg_prgr_id     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_login_logs_login_at
            ON login_logs (login_at);

        -- One append-only row per conversational turn (USER or AI).
        CREATE TABLE IF NOT EXISTS conversation_logs (
            log_id          TEXT PRIMARY KEY NOT NULL CHECK (length(log_id) = 26),
            login_log_id    TEXT NOT NULL,
            function_mode   TEXT NOT NULL
                            CHECK (function_mode IN
                                ('create', 'explain', 'grammar', 'comment', 'transform')),
            conversation_id TEXT NOT NULL,
            seq             INTEGER NOT NULL,
            role            TEXT NOT NULL CHECK (role IN ('USER', 'AI')),
            at              INTEGER NOT NULL,
            content         TEXT,
            reg_at          INTEGER NOT NULL,
            reg_actor_no    TEXT NOT NULL,
            reg_ognz_no     TEXT NOT NULL,
            reg_syst_cd     TEXT NOT NULL,
            reg_prgr_id     TEXT NOT NULL,
            chg_at          INTEGER NOT NULL,
            chg_actor_no    TEXT NOT NULL,
            chg_ognz_no     TEXT NOT NULL,
            chg_syst_cd     TEXT NOT NULL,
            chg_prgr_id     TEXT NOT NULL,
            UNIQUE (conversation_id, seq)
        );

        CREATE INDEX IF NOT EXISTS idx_conversation_logs_cvrs
            ON conversation_logs (conversation_id, seq);

        CREATE INDEX IF NOT EXISTS idx_conversation_logs_at
            ON conversation_logs (at);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'audit_schema');
        ",
    )
    .map_err(|e| PilotError::Storage(format!("Failed to apply v1 migration: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_create_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert!(tables.contains(&"login_logs".to_string()));
        assert!(tables.contains(&"conversation_logs".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_log_id_length_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO login_logs (log_id, actor_no, login_at, reg_at, reg_actor_no,
                reg_ognz_no, reg_syst_cd, reg_prgr_id, chg_at, chg_actor_no, chg_ognz_no,
                chg_syst_cd, chg_prgr_id)
             VALUES ('short', 'U1', 0, 0, 'S', 'O', 'ISA', 'P', 0, 'S', 'O', 'ISA', 'P')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_seq_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let insert = |log_id: &str, seq: i64| {
            conn.execute(
                "INSERT INTO conversation_logs (log_id, login_log_id, function_mode,
                    conversation_id, seq, role, at, content, reg_at, reg_actor_no,
                    reg_ognz_no, reg_syst_cd, reg_prgr_id, chg_at, chg_actor_no,
                    chg_ognz_no, chg_syst_cd, chg_prgr_id)
                 VALUES (?1, 'l', 'create', 'cvrs_x', ?2, 'USER', 0, '', 0, 'S', 'O',
                    'ISA', 'P', 0, 'S', 'O', 'ISA', 'P')",
                rusqlite::params![log_id, seq],
            )
        };

        insert(&"1".repeat(26), 1).unwrap();
        assert!(insert(&"2".repeat(26), 1).is_err());
    }
}
