//! In-process fakes of the ports for service tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::ports::{
    AuditError, AuditRecord, AuditSink, CounterStore, KeyTtl, NotificationDispatcher,
    NotifyError, StoreError, TierError, TierResolver,
};

#[derive(Default)]
pub struct FakeStore {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
    down: AtomicBool,
}

impl FakeStore {
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Write a value with no expiry, bypassing the port.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), None));
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).map(|(v, _)| v.clone())
    }

    pub fn ttl_of(&self, key: &str) -> KeyTtl {
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            None => KeyTtl::Missing,
            Some((_, None)) => KeyTtl::Persistent,
            Some((_, Some(at))) => KeyTtl::Expires(at.saturating_duration_since(Instant::now())),
        }
    }

    fn check_up(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            Err(StoreError::Connection("store is down".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CounterStore for FakeStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_up()?;
        Ok(self.raw(key))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.check_up()?;
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| ("0".to_string(), None));
        let current: i64 = entry
            .0
            .parse()
            .map_err(|_| StoreError::Command("value is not an integer".to_string()))?;
        entry.0 = (current + delta).to_string();
        Ok(current + delta)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.check_up()?;
        let mut entries = self.entries.lock().unwrap();
        Ok(match entries.get_mut(key) {
            Some(entry) => {
                entry.1 = Some(Instant::now() + ttl);
                true
            }
            None => false,
        })
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, StoreError> {
        self.check_up()?;
        Ok(self.ttl_of(key))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check_up()?;
        self.entries.lock().unwrap().insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.check_up()?;
        let mut entries = self.entries.lock().unwrap();
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(true)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.check_up()?;
        let (prefix, suffix) = pattern.split_once('*').unwrap_or((pattern, ""));
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix) && k.ends_with(suffix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn backend(&self) -> &'static str {
        "fake"
    }
}

#[derive(Default)]
pub struct RecordingAudit {
    pub records: Mutex<Vec<AuditRecord>>,
}

#[async_trait]
impl AuditSink for RecordingAudit {
    async fn log_event(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<(String, String, serde_json::Value)>>,
    pub failing: AtomicBool,
}

impl RecordingDispatcher {
    pub fn templates(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, template, _)| template.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn queue_notification(
        &self,
        user_id: &str,
        template_id: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::QueueFull);
        }
        self.sent
            .lock()
            .unwrap()
            .push((user_id.to_string(), template_id.to_string(), payload));
        Ok(())
    }
}

#[derive(Default)]
pub struct FixedTiers {
    pub tiers: HashMap<String, String>,
}

impl FixedTiers {
    pub fn with(user_id: &str, tier: &str) -> Self {
        Self {
            tiers: HashMap::from([(user_id.to_string(), tier.to_string())]),
        }
    }
}

#[async_trait]
impl TierResolver for FixedTiers {
    async fn tier_for(&self, user_id: &str) -> Result<String, TierError> {
        self.tiers
            .get(user_id)
            .cloned()
            .ok_or_else(|| TierError::NotFound(user_id.to_string()))
    }
}
