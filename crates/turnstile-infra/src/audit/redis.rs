//! Redis audit sink - publishes records on a pub/sub channel.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use turnstile_core::ports::{AuditError, AuditRecord, AuditSink};

/// Publishes each audit record as JSON on a Redis channel.
///
/// Durable storage is the subscriber's job; a publish with no subscriber
/// succeeds and the record is gone.
pub struct RedisAuditSink {
    conn: ConnectionManager,
    channel: String,
}

impl RedisAuditSink {
    /// Share the counter store's connection manager.
    pub fn new(conn: ConnectionManager, channel: impl Into<String>) -> Self {
        Self {
            conn,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl AuditSink for RedisAuditSink {
    async fn log_event(&self, record: AuditRecord) -> Result<(), AuditError> {
        let message =
            serde_json::to_string(&record).map_err(|e| AuditError::Serialization(e.to_string()))?;

        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(&self.channel, &message)
            .await
            .map_err(|e| AuditError::Write(e.to_string()))?;

        tracing::debug!(channel = %self.channel, event_type = %record.event_type, "Audit event published");
        Ok(())
    }
}
