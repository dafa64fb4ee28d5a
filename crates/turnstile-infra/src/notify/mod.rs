//! Notification dispatchers.

mod memory;

pub use memory::{
    DispatchStats, Notification, NotificationQueueConfig, QueuedNotificationDispatcher,
};

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::RedisNotificationQueue;
