//! In-memory notification queue.
//!
//! Notifications are buffered in a bounded channel and handed to local
//! delivery workers. Queueing never waits: when the buffer is full the
//! notification is dropped and counted. Note: queued notifications are lost
//! on restart.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};

use turnstile_core::ports::{NotificationDispatcher, NotifyError};

/// A templated message waiting for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub template_id: String,
    pub payload: serde_json::Value,
    /// Delivery attempts made so far.
    pub attempts: u32,
    pub queued_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        template_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            template_id: template_id.into(),
            payload,
            attempts: 0,
            queued_at: Utc::now(),
        }
    }
}

/// Delivery callback run by the workers. `Err` asks for a retry.
pub type DeliveryResult = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

/// In-memory notification queue configuration.
#[derive(Debug, Clone)]
pub struct NotificationQueueConfig {
    /// Buffer size; notifications beyond it are dropped.
    pub capacity: usize,
    /// Number of delivery workers.
    pub workers: usize,
    /// Delivery attempts before a notification is given up.
    pub max_attempts: u32,
}

impl Default for NotificationQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            workers: 2,
            max_attempts: 3,
        }
    }
}

impl NotificationQueueConfig {
    pub fn from_env() -> Self {
        Self {
            capacity: std::env::var("NOTIFY_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1000),
            workers: std::env::var("NOTIFY_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            max_attempts: std::env::var("NOTIFY_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        }
    }
}

/// Snapshot of queue counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub pending: usize,
    pub delivered: usize,
    pub failed: usize,
    pub dropped: usize,
}

#[derive(Default)]
struct Counters {
    pending: AtomicUsize,
    delivered: AtomicUsize,
    failed: AtomicUsize,
    dropped: AtomicUsize,
}

/// Bounded in-memory notification queue with local delivery workers.
pub struct QueuedNotificationDispatcher {
    counters: Arc<Counters>,
    config: NotificationQueueConfig,
    sender: mpsc::Sender<Notification>,
    receiver: Arc<Mutex<mpsc::Receiver<Notification>>>,
}

impl QueuedNotificationDispatcher {
    pub fn new(config: NotificationQueueConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.capacity.max(1));

        Self {
            counters: Arc::new(Counters::default()),
            config,
            sender: tx,
            receiver: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn from_env() -> Self {
        Self::new(NotificationQueueConfig::from_env())
    }

    /// Spawn the delivery workers.
    pub fn start_workers<F>(&self, handler: F)
    where
        F: Fn(Notification) -> DeliveryResult + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);

        for worker_id in 0..self.config.workers {
            let handler = handler.clone();
            let receiver = self.receiver.clone();
            let counters = self.counters.clone();
            let sender = self.sender.clone();
            let max_attempts = self.config.max_attempts;

            tokio::spawn(async move {
                tracing::info!(worker_id, "Notification worker started");

                loop {
                    let next = {
                        let mut rx = receiver.lock().await;
                        rx.recv().await
                    };

                    let Some(mut notification) = next else {
                        tracing::info!(worker_id, "Notification worker shutting down");
                        break;
                    };

                    counters.pending.fetch_sub(1, Ordering::Relaxed);
                    notification.attempts += 1;

                    match handler(notification.clone()).await {
                        Ok(()) => {
                            counters.delivered.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(
                                notification_id = %notification.id,
                                template = %notification.template_id,
                                "Notification delivered"
                            );
                        }
                        Err(reason) if notification.attempts < max_attempts => {
                            tracing::warn!(
                                notification_id = %notification.id,
                                attempt = notification.attempts,
                                reason = %reason,
                                "Notification delivery failed, will retry"
                            );
                            counters.pending.fetch_add(1, Ordering::Relaxed);
                            let sender = sender.clone();
                            let counters = counters.clone();
                            tokio::spawn(async move {
                                let backoff = 100 * notification.attempts as u64;
                                tokio::time::sleep(std::time::Duration::from_millis(backoff))
                                    .await;
                                if let Err(e) = sender.send(notification).await {
                                    counters.pending.fetch_sub(1, Ordering::Relaxed);
                                    counters.failed.fetch_add(1, Ordering::Relaxed);
                                    tracing::error!(
                                        "Failed to re-queue notification for retry: {}",
                                        e
                                    );
                                }
                            });
                        }
                        Err(reason) => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            tracing::error!(
                                notification_id = %notification.id,
                                reason = %reason,
                                "Notification failed after max attempts"
                            );
                        }
                    }
                }
            });
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            pending: self.counters.pending.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for QueuedNotificationDispatcher {
    async fn queue_notification(
        &self,
        user_id: &str,
        template_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        let notification = Notification::new(user_id, template_id, payload);

        self.counters.pending.fetch_add(1, Ordering::Relaxed);
        match self.sender.try_send(notification) {
            Ok(()) => {
                tracing::debug!(user_id = %user_id, template = %template_id, "Notification queued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.pending.fetch_sub(1, Ordering::Relaxed);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(NotifyError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.pending.fetch_sub(1, Ordering::Relaxed);
                Err(NotifyError::Enqueue("queue closed".to_string()))
            }
        }
    }
}
