//! Shared counter store port.

use async_trait::async_trait;
use std::time::Duration;

/// Counter store trait - abstraction over a shared key-value store with
/// native atomic counters (Redis, in-memory).
///
/// Every mutation of a shared counter goes through [`CounterStore::incr_by`],
/// so concurrent callers in different processes never lose updates.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the raw value stored at `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Atomically add `delta` to the integer at `key`, creating it at zero
    /// first if absent. Returns the value after the addition.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Set a time-to-live on an existing key. Returns false if the key does
    /// not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remaining time-to-live of `key`.
    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError>;

    /// Set `key` to `value` with a time-to-live, overwriting any value.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Set `key` to `value` with a time-to-live only if it does not exist.
    /// Returns true if the key was created by this call.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// List keys matching a glob pattern. Diagnostic only, never call this
    /// on a request path.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Time-to-live state of a key, mirroring the Redis `TTL` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key does not exist (`-2`).
    Missing,
    /// Key exists without an expiry (`-1`).
    Persistent,
    /// Key expires after the given duration.
    Expires(Duration),
}

impl KeyTtl {
    /// Decode a raw `TTL` reply.
    pub fn from_reply(reply: i64) -> Self {
        match reply {
            -2 => KeyTtl::Missing,
            n if n < 0 => KeyTtl::Persistent,
            n => KeyTtl::Expires(Duration::from_secs(n as u64)),
        }
    }

    /// Encode back into the Redis reply convention.
    pub fn as_reply(&self) -> i64 {
        match self {
            KeyTtl::Missing => -2,
            KeyTtl::Persistent => -1,
            KeyTtl::Expires(d) => d.as_secs() as i64,
        }
    }
}

/// Counter store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Value at {key} is not an integer: {value:?}")]
    Corrupted { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_reply_decoding() {
        assert_eq!(KeyTtl::from_reply(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_reply(-1), KeyTtl::Persistent);
        assert_eq!(
            KeyTtl::from_reply(42),
            KeyTtl::Expires(Duration::from_secs(42))
        );
        assert_eq!(KeyTtl::Expires(Duration::from_secs(7)).as_reply(), 7);
    }
}
