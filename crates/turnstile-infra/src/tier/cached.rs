//! TTL cache in front of a tier resolver.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use turnstile_core::ports::{TierError, TierResolver};

struct CachedTier {
    tier: String,
    expires_at: Instant,
}

/// Caches successful lookups of an inner resolver for `ttl`.
///
/// Failures are never cached, so a transient outage of the subscription
/// source does not pin users to the fallback tier.
pub struct CachedTierResolver {
    inner: Arc<dyn TierResolver>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedTier>>,
}

impl CachedTierResolver {
    pub fn new(inner: Arc<dyn TierResolver>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Drop a cached entry, e.g. after a plan change.
    pub async fn invalidate(&self, user_id: &str) {
        self.entries.write().await.remove(user_id);
    }
}

#[async_trait]
impl TierResolver for CachedTierResolver {
    async fn tier_for(&self, user_id: &str) -> Result<String, TierError> {
        let now = Instant::now();

        {
            let entries = self.entries.read().await;
            if let Some(cached) = entries.get(user_id) {
                if cached.expires_at > now {
                    return Ok(cached.tier.clone());
                }
            }
        }

        let tier = self.inner.tier_for(user_id).await?;

        self.entries.write().await.insert(
            user_id.to_string(),
            CachedTier {
                tier: tier.clone(),
                expires_at: now + self.ttl,
            },
        );
        tracing::debug!(user_id = %user_id, tier = %tier, "Tier cached");

        Ok(tier)
    }
}
