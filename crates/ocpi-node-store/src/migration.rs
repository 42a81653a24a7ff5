//! Schema migrations for the SQLite audit log.
//!
//! Both stream files share one schema. Steps are applied in order inside a
//! single transaction and recorded in `schema_migrations`.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};

/// Ordered schema steps; entry `i` moves the schema to version `i + 1`.
const STEPS: &[(&str, &str)] = &[
    (
        "append-only entry table",
        r#"
        CREATE TABLE audit_log (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            command TEXT NOT NULL,
            payload TEXT,                      -- JSON, NULL when the command has none
            event_tracking_id TEXT NOT NULL,
            user_id TEXT,
            timestamp TEXT NOT NULL            -- RFC 3339, UTC
        );
        "#,
    ),
    (
        "tracking id index and immutability triggers",
        r#"
        CREATE INDEX idx_audit_log_tracking ON audit_log(event_tracking_id);

        CREATE TRIGGER audit_log_no_update BEFORE UPDATE ON audit_log
        BEGIN
            SELECT RAISE(ABORT, 'audit log entries are immutable');
        END;

        CREATE TRIGGER audit_log_no_delete BEFORE DELETE ON audit_log
        BEGIN
            SELECT RAISE(ABORT, 'audit log entries are immutable');
        END;
        "#,
    ),
];

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = STEPS.len() as u32;

/// Bring `conn` up to [`CURRENT_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )?;

    let applied: u32 = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get::<_, Option<u32>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0);

    if applied > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            applied, CURRENT_VERSION
        )));
    }

    let pending = &STEPS[applied as usize..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (offset, (description, sql)) in pending.iter().enumerate() {
        let version = applied + offset as u32 + 1;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
            params![version, description, Utc::now().to_rfc3339()],
        )?;
        tracing::debug!(version, description, "applied audit log migration");
    }
    tx.commit()?;

    Ok(())
}
