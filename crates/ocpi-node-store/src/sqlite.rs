//! SQLite implementation of the AuditLog trait.
//!
//! This is the durable backend for the OCPI node. Each stream lives in its
//! own database file and every operation runs under tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use serde::{Deserialize, Serialize};

use ocpi_node_core::EventTrackingId;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{AuditLog, AuditLogEntry, LogStream};

/// Tuning for the SQLite audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditLogConfig {
    /// How often a busy or locked database is retried before an append fails.
    pub max_append_retries: u32,
    /// Pause between retries, doubled after every attempt.
    pub retry_backoff_ms: u64,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            max_append_retries: 3,
            retry_backoff_ms: 10,
        }
    }
}

impl AuditLogConfig {
    pub fn with_max_append_retries(mut self, retries: u32) -> Self {
        self.max_append_retries = retries;
        self
    }
}

/// SQLite-based audit log.
///
/// Thread-safe via one internal Mutex per stream.
pub struct SqliteAuditLog {
    remote_parties: Arc<Mutex<Connection>>,
    assets: Arc<Mutex<Connection>>,
    durable: bool,
    config: AuditLogConfig,
}

impl SqliteAuditLog {
    /// Open (or create) `remote-parties.db` and `assets.db` inside `dir`.
    pub fn open_dir(dir: impl AsRef<Path>, config: AuditLogConfig) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        Self::open(
            dir.join(format!("{}.db", LogStream::RemoteParties.file_stem())),
            dir.join(format!("{}.db", LogStream::Assets.file_stem())),
            config,
        )
    }

    /// Open the two stream files at explicit paths.
    pub fn open(
        remote_parties: impl AsRef<Path>,
        assets: impl AsRef<Path>,
        config: AuditLogConfig,
    ) -> Result<Self> {
        Ok(Self {
            remote_parties: Arc::new(Mutex::new(open_file(remote_parties.as_ref())?)),
            assets: Arc::new(Mutex::new(open_file(assets.as_ref())?)),
            durable: true,
            config,
        })
    }

    /// Open both streams as in-memory databases.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut remote_parties = Connection::open_in_memory()?;
        migration::migrate(&mut remote_parties)?;
        let mut assets = Connection::open_in_memory()?;
        migration::migrate(&mut assets)?;
        Ok(Self {
            remote_parties: Arc::new(Mutex::new(remote_parties)),
            assets: Arc::new(Mutex::new(assets)),
            durable: false,
            config: AuditLogConfig::default(),
        })
    }

    fn connection(&self, stream: LogStream) -> Arc<Mutex<Connection>> {
        match stream {
            LogStream::RemoteParties => Arc::clone(&self.remote_parties),
            LogStream::Assets => Arc::clone(&self.assets),
        }
    }
}

fn open_file(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    migration::migrate(&mut conn)?;
    Ok(conn)
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| {
        StoreError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            Some(format!("mutex poisoned: {}", e)),
        ))
    })
}

fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// Insert one entry in its own transaction.
fn insert_entry(
    conn: &mut Connection,
    entry: &AuditLogEntry,
    payload: Option<&str>,
) -> rusqlite::Result<i64> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO audit_log (command, payload, event_tracking_id, user_id, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.command,
            payload,
            entry.event_tracking_id.as_str(),
            entry.user_id,
            entry.timestamp.to_rfc3339(),
        ],
    )?;
    let seq = tx.last_insert_rowid();
    tx.commit()?;
    Ok(seq)
}

// Helper to convert a row to an AuditLogEntry
fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditLogEntry> {
    let payload: Option<String> = row.get("payload")?;
    let timestamp: String = row.get("timestamp")?;

    let payload = payload
        .map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);

    Ok(AuditLogEntry {
        command: row.get("command")?,
        payload,
        event_tracking_id: EventTrackingId::from_string(row.get::<_, String>("event_tracking_id")?),
        user_id: row.get("user_id")?,
        timestamp,
    })
}

#[async_trait]
impl AuditLog for SqliteAuditLog {
    async fn append(&self, stream: LogStream, entry: &AuditLogEntry) -> Result<u64> {
        let entry = entry.clone();
        let payload = entry.payload.as_ref().map(serde_json::to_string).transpose()?;
        let conn = self.connection(stream);
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&conn)?;
            let mut backoff = Duration::from_millis(config.retry_backoff_ms);
            let mut attempt = 0;

            loop {
                match insert_entry(&mut conn, &entry, payload.as_deref()) {
                    Ok(seq) => return Ok(seq as u64),
                    Err(e) if is_transient(&e) && attempt < config.max_append_retries => {
                        attempt += 1;
                        tracing::warn!(
                            stream = %stream,
                            attempt,
                            error = %e,
                            "audit log busy, retrying append"
                        );
                        std::thread::sleep(backoff);
                        backoff *= 2;
                    }
                    Err(e) => return Err(StoreError::Database(e)),
                }
            }
        })
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }

    async fn replay(&self, stream: LogStream) -> Result<Vec<AuditLogEntry>> {
        let conn = self.connection(stream);

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT command, payload, event_tracking_id, user_id, timestamp
                 FROM audit_log ORDER BY seq ASC",
            )?;
            let entries = stmt
                .query_map([], row_to_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }

    async fn len(&self, stream: LogStream) -> Result<u64> {
        let conn = self.connection(stream);

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }

    async fn flush(&self) -> Result<()> {
        if !self.durable {
            return Ok(());
        }

        let connections = [self.connection(LogStream::RemoteParties), self.connection(LogStream::Assets)];
        tokio::task::spawn_blocking(move || {
            for conn in connections {
                let conn = lock(&conn)?;
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }
}
