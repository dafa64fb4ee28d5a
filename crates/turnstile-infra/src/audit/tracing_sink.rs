use async_trait::async_trait;

use turnstile_core::ports::{AuditError, AuditRecord, AuditSink};

/// Audit sink that writes records to the `turnstile::audit` tracing target.
///
/// Pair it with a JSON log layer and a log shipper when no dedicated audit
/// store is available.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log_event(&self, record: AuditRecord) -> Result<(), AuditError> {
        tracing::info!(
            target: "turnstile::audit",
            event_type = %record.event_type,
            user_id = %record.user_id,
            occurred_at = %record.occurred_at.to_rfc3339(),
            details = %record.details,
            "Audit event"
        );
        Ok(())
    }
}
