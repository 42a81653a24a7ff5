//! Audit log trait definitions.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use ocpi_node_core::EventTrackingId;

use crate::error::Result;

/// The two independent audit streams kept per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogStream {
    /// Registry mutations: remote parties, tokens, statuses.
    RemoteParties,
    /// Resource store mutations: local parties and their assets.
    Assets,
}

impl LogStream {
    /// File stem used by file-backed logs.
    pub fn file_stem(&self) -> &'static str {
        match self {
            LogStream::RemoteParties => "remote-parties",
            LogStream::Assets => "assets",
        }
    }
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub command: String,
    pub payload: Option<serde_json::Value>,
    pub event_tracking_id: EventTrackingId,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Build an entry for `command`, serializing `payload` to JSON.
    pub fn new<P: Serialize + ?Sized>(
        command: impl Into<String>,
        payload: Option<&P>,
        ctx: &WriteContext,
    ) -> Result<Self> {
        let payload = payload.map(serde_json::to_value).transpose()?;
        Ok(Self {
            command: command.into(),
            payload,
            event_tracking_id: ctx.event_tracking_id.clone(),
            user_id: ctx.user_id.clone(),
            timestamp: Utc::now(),
        })
    }

    /// Decode the payload as `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.payload.clone().unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(value)?)
    }
}

/// Per-request metadata carried into every mutation.
#[derive(Debug, Clone, Default)]
pub struct WriteContext {
    pub event_tracking_id: EventTrackingId,
    pub user_id: Option<String>,
    /// Request-level downgrade override.
    pub allow_downgrades: Option<bool>,
}

impl WriteContext {
    pub fn new(event_tracking_id: EventTrackingId) -> Self {
        Self {
            event_tracking_id,
            user_id: None,
            allow_downgrades: None,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_allow_downgrades(mut self, allow: bool) -> Self {
        self.allow_downgrades = Some(allow);
        self
    }
}

/// Durable, append-only audit log.
///
/// Implementations must be thread-safe (Send + Sync). An append is
/// all-or-nothing: when it returns `Err`, nothing was written.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one entry, returning its sequence number within the stream.
    async fn append(&self, stream: LogStream, entry: &AuditLogEntry) -> Result<u64>;

    /// Read every entry of a stream in append order.
    async fn replay(&self, stream: LogStream) -> Result<Vec<AuditLogEntry>>;

    /// Number of entries in a stream.
    async fn len(&self, stream: LogStream) -> Result<u64>;

    /// Make every acknowledged append durable.
    async fn flush(&self) -> Result<()>;
}

#[async_trait]
impl<T: AuditLog + ?Sized> AuditLog for Arc<T> {
    async fn append(&self, stream: LogStream, entry: &AuditLogEntry) -> Result<u64> {
        (**self).append(stream, entry).await
    }

    async fn replay(&self, stream: LogStream) -> Result<Vec<AuditLogEntry>> {
        (**self).replay(stream).await
    }

    async fn len(&self, stream: LogStream) -> Result<u64> {
        (**self).len(stream).await
    }

    async fn flush(&self) -> Result<()> {
        (**self).flush().await
    }
}

/// Extension trait with convenience methods.
#[async_trait]
pub trait AuditLogExt: AuditLog {
    /// Whether a stream holds no entries.
    async fn is_empty(&self, stream: LogStream) -> Result<bool> {
        Ok(self.len(stream).await? == 0)
    }

    /// Commands of a stream, in order. Handy for assertions.
    async fn commands(&self, stream: LogStream) -> Result<Vec<String>> {
        Ok(self
            .replay(stream)
            .await?
            .into_iter()
            .map(|entry| entry.command)
            .collect())
    }
}

impl<T: AuditLog + ?Sized> AuditLogExt for T {}
