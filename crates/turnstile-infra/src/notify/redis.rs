//! Redis notification queue using LIST operations.
//!
//! Producer side only: notifications are pushed as JSON onto a list and an
//! external delivery service pops them.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use turnstile_core::ports::{NotificationDispatcher, NotifyError};

use super::Notification;

pub struct RedisNotificationQueue {
    conn: ConnectionManager,
    list_key: String,
}

impl RedisNotificationQueue {
    pub fn new(conn: ConnectionManager, list_key: impl Into<String>) -> Self {
        Self {
            conn,
            list_key: list_key.into(),
        }
    }

    pub fn list_key(&self) -> &str {
        &self.list_key
    }
}

#[async_trait]
impl NotificationDispatcher for RedisNotificationQueue {
    async fn queue_notification(
        &self,
        user_id: &str,
        template_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        let notification = Notification::new(user_id, template_id, payload);
        let message = serde_json::to_string(&notification)
            .map_err(|e| NotifyError::Enqueue(e.to_string()))?;

        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(&self.list_key, &message)
            .await
            .map_err(|e| NotifyError::Enqueue(e.to_string()))?;

        tracing::debug!(
            notification_id = %notification.id,
            queue = %self.list_key,
            template = %template_id,
            "Notification enqueued"
        );
        Ok(())
    }
}
