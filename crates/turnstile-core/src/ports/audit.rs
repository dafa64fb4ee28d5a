//! Audit sink port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An audit event emitted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Dotted event name, e.g. `quota.threshold_crossed`.
    pub event_type: String,
    pub user_id: String,
    pub occurred_at: DateTime<Utc>,
    /// Event-specific details.
    pub details: serde_json::Value,
}

impl AuditRecord {
    pub fn new(
        event_type: impl Into<String>,
        user_id: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            user_id: user_id.into(),
            occurred_at: Utc::now(),
            details,
        }
    }
}

/// Audit sink trait. Callers treat it as fire-and-forget and only log errors.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_event(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Audit errors.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Failed to record audit event: {0}")]
    Write(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}
