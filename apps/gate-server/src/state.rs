//! Application state - shared across all handlers.

use std::sync::Arc;

use turnstile_core::ports::{
    AuditSink, CounterStore, NotificationDispatcher, StoreError, TierResolver,
};
use turnstile_core::{LocalAdmissionGuard, QuotaLedger};
use turnstile_infra::{
    CachedTierResolver, InMemoryCounterStore, QueuedNotificationDispatcher, StaticTierResolver,
    TracingAuditSink,
};

#[cfg(feature = "redis")]
use turnstile_infra::{RedisAuditSink, RedisCounterStore, RedisNotificationQueue};

use crate::config::AppConfig;

/// Redis channel audit records are published on.
#[cfg(feature = "redis")]
const AUDIT_CHANNEL: &str = "turnstile:audit";

/// Redis list the notification service pops from.
#[cfg(feature = "redis")]
const NOTIFICATION_LIST: &str = "turnstile:notifications";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<LocalAdmissionGuard>,
    pub ledger: Arc<QuotaLedger>,
    /// Set when counters live in this process; purged in the background.
    pub memory_store: Option<Arc<InMemoryCounterStore>>,
}

impl AppState {
    /// Build the application state, preferring Redis when it is reachable.
    pub async fn new(config: &AppConfig) -> Result<Self, StoreError> {
        let tiers = Self::default_tiers(config);

        #[cfg(feature = "redis")]
        {
            match RedisCounterStore::new(config.redis.clone()).await {
                Ok(store) => {
                    let conn = store.connection();
                    let audit: Arc<dyn AuditSink> =
                        Arc::new(RedisAuditSink::new(conn.clone(), AUDIT_CHANNEL));
                    let dispatcher: Arc<dyn NotificationDispatcher> =
                        Arc::new(RedisNotificationQueue::new(conn, NOTIFICATION_LIST));

                    tracing::info!("Application state initialized with Redis store");
                    return Ok(Self::build(config, Arc::new(store), audit, dispatcher, tiers));
                }
                Err(e) if config.redis.fallback_to_memory => {
                    tracing::error!(
                        error = %e,
                        "Redis unavailable, falling back to in-memory counters (quotas are per process)"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        #[cfg(not(feature = "redis"))]
        tracing::info!("Running without redis feature - using in-memory counters");

        Ok(Self::in_memory(config, tiers))
    }

    /// State backed by an in-process counter store.
    pub fn in_memory(config: &AppConfig, tiers: Arc<dyn TierResolver>) -> Self {
        let store = Arc::new(InMemoryCounterStore::new());
        let mut state = Self::with_store(config, store.clone(), tiers);
        state.memory_store = Some(store);
        state
    }

    /// State over an arbitrary store, with local audit and notification sinks.
    pub fn with_store(
        config: &AppConfig,
        store: Arc<dyn CounterStore>,
        tiers: Arc<dyn TierResolver>,
    ) -> Self {
        let dispatcher = QueuedNotificationDispatcher::from_env();
        dispatcher.start_workers(|notification| {
            Box::pin(async move {
                // No delivery channel in-process; the log line is the delivery.
                tracing::info!(
                    user_id = %notification.user_id,
                    template = %notification.template_id,
                    payload = %notification.payload,
                    "Notification delivered to log"
                );
                Ok(())
            })
        });

        Self::build(
            config,
            store,
            Arc::new(TracingAuditSink),
            Arc::new(dispatcher),
            tiers,
        )
    }

    /// `USER_TIER_*` assignments behind a TTL cache.
    pub fn default_tiers(config: &AppConfig) -> Arc<dyn TierResolver> {
        let assignments = StaticTierResolver::from_env();
        tracing::info!(users = assignments.len(), "Loaded static tier assignments");

        Arc::new(CachedTierResolver::new(
            Arc::new(assignments),
            config.tier_cache_ttl,
        ))
    }

    fn build(
        config: &AppConfig,
        store: Arc<dyn CounterStore>,
        audit: Arc<dyn AuditSink>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        tiers: Arc<dyn TierResolver>,
    ) -> Self {
        let guard = Arc::new(LocalAdmissionGuard::new(config.local.clone()));
        let ledger = Arc::new(QuotaLedger::new(
            config.quota.clone(),
            store,
            tiers,
            audit,
            dispatcher,
        ));

        Self {
            guard,
            ledger,
            memory_store: None,
        }
    }
}
