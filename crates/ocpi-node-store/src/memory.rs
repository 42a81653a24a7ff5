//! In-memory implementation of the AuditLog trait.
//!
//! This is primarily for testing. It has the same ordering semantics as
//! SQLite but keeps everything in memory with no persistence.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::traits::{AuditLog, AuditLogEntry, LogStream};

/// In-memory audit log.
///
/// All data is lost when the log is dropped. Share it through an `Arc` to
/// simulate a node restart over the same log.
pub struct MemoryAuditLog {
    inner: RwLock<MemoryAuditLogInner>,
    fail_appends: AtomicBool,
    append_delay_ms: AtomicU64,
}

#[derive(Default)]
struct MemoryAuditLogInner {
    remote_parties: Vec<AuditLogEntry>,
    assets: Vec<AuditLogEntry>,
}

impl MemoryAuditLogInner {
    fn stream(&self, stream: LogStream) -> &Vec<AuditLogEntry> {
        match stream {
            LogStream::RemoteParties => &self.remote_parties,
            LogStream::Assets => &self.assets,
        }
    }

    fn stream_mut(&mut self, stream: LogStream) -> &mut Vec<AuditLogEntry> {
        match stream {
            LogStream::RemoteParties => &mut self.remote_parties,
            LogStream::Assets => &mut self.assets,
        }
    }
}

impl MemoryAuditLog {
    /// Create a new empty in-memory log.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryAuditLogInner::default()),
            fail_appends: AtomicBool::new(false),
            append_delay_ms: AtomicU64::new(0),
        }
    }

    /// Make every following append fail until switched off again.
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Hold every following append for `delay`, like a slow disk.
    pub fn delay_appends(&self, delay: Duration) {
        self.append_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Copy of a stream's entries.
    pub fn entries(&self, stream: LogStream) -> Vec<AuditLogEntry> {
        self.inner.read().stream(stream).clone()
    }
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, stream: LogStream, entry: &AuditLogEntry) -> Result<u64> {
        let delay = self.append_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "append to {} rejected",
                stream
            )));
        }

        let mut inner = self.inner.write();
        let entries = inner.stream_mut(stream);
        entries.push(entry.clone());
        Ok(entries.len() as u64)
    }

    async fn replay(&self, stream: LogStream) -> Result<Vec<AuditLogEntry>> {
        Ok(self.entries(stream))
    }

    async fn len(&self, stream: LogStream) -> Result<u64> {
        Ok(self.inner.read().stream(stream).len() as u64)
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{AuditLogExt, WriteContext};

    fn entry(command: &str) -> AuditLogEntry {
        AuditLogEntry::new(command, Some(&serde_json::json!({"n": 1})), &WriteContext::default())
            .unwrap()
    }

    #[tokio::test]
    async fn test_streams_are_independent() {
        let log = MemoryAuditLog::new();
        assert_eq!(log.append(LogStream::Assets, &entry("addParty")).await.unwrap(), 1);
        assert_eq!(log.append(LogStream::Assets, &entry("addLocation")).await.unwrap(), 2);
        assert_eq!(
            log.append(LogStream::RemoteParties, &entry("addRemoteParty"))
                .await
                .unwrap(),
            1
        );

        assert_eq!(
            log.commands(LogStream::Assets).await.unwrap(),
            vec!["addParty", "addLocation"]
        );
        assert_eq!(log.len(LogStream::RemoteParties).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_append_writes_nothing() {
        let log = MemoryAuditLog::new();
        log.fail_appends(true);
        assert!(log.append(LogStream::Assets, &entry("addParty")).await.is_err());
        assert!(log.is_empty(LogStream::Assets).await.unwrap());

        log.fail_appends(false);
        assert!(log.append(LogStream::Assets, &entry("addParty")).await.is_ok());
    }
}
