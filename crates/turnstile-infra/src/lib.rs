//! # Turnstile Infrastructure
//!
//! Concrete implementations of the ports defined in `turnstile-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `redis` - Redis counter store, audit channel and notification list

pub mod audit;
pub mod notify;
pub mod store;
pub mod tier;

// Re-exports - In-Memory
pub use audit::TracingAuditSink;
pub use notify::{
    DispatchStats, Notification, NotificationQueueConfig, QueuedNotificationDispatcher,
};
pub use store::InMemoryCounterStore;
pub use tier::{CachedTierResolver, StaticTierResolver};

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use audit::RedisAuditSink;
#[cfg(feature = "redis")]
pub use notify::RedisNotificationQueue;
#[cfg(feature = "redis")]
pub use store::{RedisConfig, RedisCounterStore};
