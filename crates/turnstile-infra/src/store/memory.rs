//! In-memory counter store - used as fallback when Redis is unavailable.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use globset::Glob;
use tokio::sync::RwLock;

use turnstile_core::ports::{CounterStore, KeyTtl, StoreError};

struct CounterEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }
}

/// In-memory counter store using a HashMap behind an async RwLock.
///
/// Every mutation takes the write lock, so increments from concurrent tasks
/// in this process never interleave. Note: counters are per-process and are
/// lost on restart; use Redis to share quotas across instances.
pub struct InMemoryCounterStore {
    entries: RwLock<HashMap<String, CounterEntry>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Remove every expired key.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }

        let entry = entries.entry(key.to_string()).or_insert_with(|| CounterEntry {
            value: "0".to_string(),
            expires_at: None,
        });

        let current: i64 = entry.value.parse().map_err(|_| StoreError::Corrupted {
            key: key.to_string(),
            value: entry.value.clone(),
        })?;
        let next = current
            .checked_add(delta)
            .ok_or_else(|| StoreError::Command(format!("increment of {} would overflow", key)))?;

        entry.value = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(match entries.get(key) {
            None => KeyTtl::Missing,
            Some(entry) if entry.is_expired(now) => KeyTtl::Missing,
            Some(CounterEntry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(CounterEntry {
                expires_at: Some(exp),
                ..
            }) => KeyTtl::Expires(exp.saturating_duration_since(now)),
        })
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CounterEntry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if entries.get(key).is_some_and(|entry| !entry.is_expired(now)) {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            CounterEntry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let matcher = Glob::new(pattern)
            .map_err(|e| StoreError::Command(format!("invalid key pattern: {e}")))?
            .compile_matcher();

        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && matcher.is_match(key.as_str()))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
