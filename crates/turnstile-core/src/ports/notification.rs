//! Notification dispatcher port.

use async_trait::async_trait;

/// Notification dispatcher trait - queues a templated message for a user.
///
/// Delivery itself happens elsewhere; callers treat this as fire-and-forget.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn queue_notification(
        &self,
        user_id: &str,
        template_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// Notification errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification queue is full")]
    QueueFull,

    #[error("Failed to queue notification: {0}")]
    Enqueue(String),
}
