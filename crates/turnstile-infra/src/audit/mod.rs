//! Audit sinks.

mod tracing_sink;

pub use tracing_sink::TracingAuditSink;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::RedisAuditSink;
