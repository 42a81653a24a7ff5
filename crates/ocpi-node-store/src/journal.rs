//! Ordered commits against one audit stream.
//!
//! Every mutation of in-memory state goes through [`Journal::commit`]:
//! under the stream's commit lane it re-checks its precondition, appends the
//! audit entry, and only then applies the change. The lane section runs in
//! its own task, so a caller that stops waiting can never leave a logged
//! change unapplied or an applied change unlogged.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::traits::{AuditLog, AuditLogEntry, LogStream};

/// Serializes commits to one audit stream.
///
/// There is a single lane per stream, not one per resource: writes to
/// unrelated resources, and from different parties, wait for each other's
/// append. Log order is therefore a total order equal to apply order.
/// Reads never take the lane, and the lane is held only for one append.
#[derive(Clone)]
pub struct Journal {
    log: Arc<dyn AuditLog>,
    stream: LogStream,
    lane: Arc<Mutex<()>>,
}

impl Journal {
    pub fn new(log: Arc<dyn AuditLog>, stream: LogStream) -> Self {
        Self {
            log,
            stream,
            lane: Arc::new(Mutex::new(())),
        }
    }

    pub fn stream(&self) -> LogStream {
        self.stream
    }

    pub fn log(&self) -> &Arc<dyn AuditLog> {
        &self.log
    }

    /// Run `prepare`, append its entry, then `apply` its plan.
    ///
    /// `prepare` sees state that no other commit can change until `apply`
    /// has run. When it rejects, nothing is logged and the rejection is
    /// returned in the inner `Err`. When the append fails, nothing is applied.
    pub async fn commit<P, A, T, R, E>(&self, prepare: P, apply: A) -> Result<std::result::Result<R, E>>
    where
        P: FnOnce() -> std::result::Result<(AuditLogEntry, T), E> + Send + 'static,
        A: FnOnce(T) -> R + Send + 'static,
        T: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        let log = Arc::clone(&self.log);
        let lane = Arc::clone(&self.lane);
        let stream = self.stream;

        let task = tokio::spawn(async move {
            let _permit = lane.lock_owned().await;

            let (entry, plan) = match prepare() {
                Ok(prepared) => prepared,
                Err(rejection) => return Ok(Err(rejection)),
            };

            if let Err(e) = log.append(stream, &entry).await {
                tracing::error!(
                    stream = %stream,
                    command = %entry.command,
                    event_tracking_id = %entry.event_tracking_id,
                    error = %e,
                    "audit append failed, mutation discarded"
                );
                return Err(e);
            }

            Ok(Ok(apply(plan)))
        });

        task.await
            .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryAuditLog;
    use crate::traits::WriteContext;
    use parking_lot::Mutex as SyncMutex;

    fn entry(command: &str) -> AuditLogEntry {
        AuditLogEntry::new::<()>(command, None, &WriteContext::default()).unwrap()
    }

    #[tokio::test]
    async fn test_commit_appends_then_applies() {
        let log = Arc::new(MemoryAuditLog::new());
        let journal = Journal::new(log.clone(), LogStream::Assets);
        let state = Arc::new(SyncMutex::new(Vec::new()));

        let applied = Arc::clone(&state);
        let result = journal
            .commit(
                || Ok::<_, ()>((entry("addParty"), 7)),
                move |value| applied.lock().push(value),
            )
            .await
            .unwrap();

        assert!(result.is_ok());
        assert_eq!(*state.lock(), vec![7]);
        assert_eq!(log.entries(LogStream::Assets).len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_prepare_logs_nothing() {
        let log = Arc::new(MemoryAuditLog::new());
        let journal = Journal::new(log.clone(), LogStream::Assets);

        let result = journal
            .commit(|| Err::<(AuditLogEntry, ()), _>("stale"), |_| ())
            .await
            .unwrap();

        assert_eq!(result, Err("stale"));
        assert!(log.entries(LogStream::Assets).is_empty());
    }

    #[tokio::test]
    async fn test_failed_append_applies_nothing() {
        let log = Arc::new(MemoryAuditLog::new());
        log.fail_appends(true);
        let journal = Journal::new(log.clone(), LogStream::Assets);
        let state = Arc::new(SyncMutex::new(0));

        let applied = Arc::clone(&state);
        let result = journal
            .commit(
                || Ok::<_, ()>((entry("addParty"), 1)),
                move |value| *applied.lock() += value,
            )
            .await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(*state.lock(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_log_order_matches_apply_order() {
        let log = Arc::new(MemoryAuditLog::new());
        let journal = Journal::new(log.clone(), LogStream::Assets);
        let state = Arc::new(SyncMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..32 {
            let journal = journal.clone();
            let applied = Arc::clone(&state);
            handles.push(tokio::spawn(async move {
                journal
                    .commit(
                        move || Ok::<_, ()>((entry(&format!("cmd{}", i)), i)),
                        move |value| applied.lock().push(format!("cmd{}", value)),
                    )
                    .await
                    .unwrap()
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let logged: Vec<String> = log
            .entries(LogStream::Assets)
            .into_iter()
            .map(|e| e.command)
            .collect();
        assert_eq!(logged, *state.lock());
    }
}
