//! Distributed monthly quota ledger.
//!
//! Reading and charging are two separate calls. `check_quota` runs before the
//! gated operation and never writes; `increment_quota` runs only after the
//! operation succeeded. Requests racing between the two can overshoot the
//! limit by at most the number of requests a user has in flight at once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::QuotaConfig;
use crate::domain::{MonthlyLimit, QuotaCheck, UsageSummary, YearMonth, usage_percentage};
use crate::error::QuotaError;
use crate::ports::{
    AuditSink, CounterStore, KeyTtl, NotificationDispatcher, StoreError, TierError, TierResolver,
};
use crate::services::UsageNotifier;

/// Monthly request counter shared by every process through a [`CounterStore`].
pub struct QuotaLedger {
    config: Arc<QuotaConfig>,
    store: Arc<dyn CounterStore>,
    tiers: Arc<dyn TierResolver>,
    notifier: UsageNotifier,
}

impl QuotaLedger {
    pub fn new(
        config: QuotaConfig,
        store: Arc<dyn CounterStore>,
        tiers: Arc<dyn TierResolver>,
        audit: Arc<dyn AuditSink>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        let config = Arc::new(config);
        let notifier = UsageNotifier::new(config.clone(), store.clone(), audit, dispatcher);

        Self {
            config,
            store,
            tiers,
            notifier,
        }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Read-only admission check against the monthly limit of `tier`.
    ///
    /// Admits the request if recording it would not push the count past the
    /// limit. Fails open when the store cannot be read.
    pub async fn check_quota(&self, user_id: &str, tier: &str) -> QuotaCheck {
        self.check_quota_at(user_id, tier, Utc::now()).await
    }

    pub async fn check_quota_at(
        &self,
        user_id: &str,
        tier: &str,
        now: DateTime<Utc>,
    ) -> QuotaCheck {
        let period = YearMonth::from_datetime(now);
        let key = self.config.counter_key(user_id, period);

        let current = match self.read_count(&key).await {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "Quota check failed, failing open"
                );
                return QuotaCheck::fail_open(tier, period, now, e.to_string());
            }
        };

        let (tier_name, tier_limit) = self.config.resolve_tier(tier);
        let limit = tier_limit.monthly_request_limit;

        let quota_exceeded = match limit {
            MonthlyLimit::Unlimited => false,
            MonthlyLimit::Requests(max) => current.saturating_add(1) > max,
        };

        if quota_exceeded {
            tracing::debug!(
                user_id = %user_id,
                tier = %tier_name,
                current,
                "Monthly quota exceeded"
            );
        }

        QuotaCheck {
            allowed: !quota_exceeded,
            quota_exceeded,
            current,
            limit,
            percentage: usage_percentage(current, limit),
            tier: tier_name,
            reset_at: period.end(),
            reset_in: Duration::from_secs(period.seconds_until_end(now)),
            degraded: None,
        }
    }

    /// Record `count` successful requests and return the new monthly total.
    ///
    /// The only ledger operation that reports store failures: a lost
    /// increment is lost revenue, so the caller decides whether to retry.
    pub async fn increment_quota(&self, user_id: &str, count: u64) -> Result<u64, QuotaError> {
        self.increment_quota_at(user_id, count, Utc::now()).await
    }

    pub async fn increment_quota_at(
        &self,
        user_id: &str,
        count: u64,
        now: DateTime<Utc>,
    ) -> Result<u64, QuotaError> {
        let period = YearMonth::from_datetime(now);
        let key = self.config.counter_key(user_id, period);
        let delta = i64::try_from(count).map_err(|_| QuotaError::CountOutOfRange(count))?;

        let new_count = self.store.incr_by(&key, delta).await.map_err(|e| {
            tracing::error!(user_id = %user_id, key = %key, error = %e, "Quota increment failed");
            QuotaError::from(e)
        })?;

        self.ensure_ttl(&key, new_count == delta, now).await;

        let new_count = new_count.max(0) as u64;
        let tier = self.user_tier(user_id).await;
        self.notifier
            .check_usage_warnings_at(user_id, &tier, new_count, now)
            .await;

        Ok(new_count)
    }

    /// Current month's consumption for `user_id`, resolving the tier itself.
    pub async fn usage(&self, user_id: &str) -> UsageSummary {
        self.usage_at(user_id, Utc::now()).await
    }

    pub async fn usage_at(&self, user_id: &str, now: DateTime<Utc>) -> UsageSummary {
        let period = YearMonth::from_datetime(now);
        let key = self.config.counter_key(user_id, period);
        let tier = self.user_tier(user_id).await;
        let (tier_name, tier_limit) = self.config.resolve_tier(&tier);
        let limit = tier_limit.monthly_request_limit;

        let (current, degraded) = match self.read_count(&key).await {
            Ok(current) => (current, false),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Usage read failed");
                (0, true)
            }
        };

        UsageSummary {
            user_id: user_id.to_string(),
            tier: tier_name,
            tier_label: tier_limit.label,
            month: period.to_string(),
            current,
            limit,
            remaining: limit.requests().map(|max| max.saturating_sub(current)),
            percentage: usage_percentage(current, limit),
            reset_at: period.end(),
            degraded,
        }
    }

    /// Every counter key of `period`. Diagnostic only.
    pub async fn tracked_keys(&self, period: YearMonth) -> Result<Vec<String>, QuotaError> {
        let pattern = format!("{}:*:{}", self.config.key_prefix, period);
        Ok(self.store.keys(&pattern).await?)
    }

    async fn read_count(&self, key: &str) -> Result<u64, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(0);
        };

        match raw.trim().parse::<i64>() {
            Ok(n) => Ok(n.max(0) as u64),
            Err(_) => {
                let e = QuotaError::CorruptedCounterValue {
                    key: key.to_string(),
                    value: raw,
                };
                tracing::warn!(error = %e, "Treating corrupted counter as zero");
                Ok(0)
            }
        }
    }

    /// Give the counter a lifetime of the rest of the month plus grace, on its
    /// first write or whenever it turns up without one.
    async fn ensure_ttl(&self, key: &str, first_write: bool, now: DateTime<Utc>) {
        let ttl = self.config.period_ttl(now);

        let needs_ttl = if first_write {
            true
        } else {
            match self.store.ttl(key).await {
                Ok(KeyTtl::Persistent) => {
                    tracing::warn!(key = %key, "Quota counter had no TTL, restoring it");
                    true
                }
                Ok(_) => false,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to read quota counter TTL");
                    false
                }
            }
        };

        if needs_ttl {
            if let Err(e) = self.store.expire(key, ttl).await {
                tracing::warn!(key = %key, error = %e, "Failed to set quota counter TTL");
            }
        }
    }

    /// Tier of `user_id`, or the fallback tier when the lookup fails.
    pub async fn user_tier(&self, user_id: &str) -> String {
        match self.tiers.tier_for(user_id).await {
            Ok(tier) => tier,
            Err(TierError::NotFound(_)) => self.config.fallback_tier().0,
            Err(e) => {
                let (fallback, _) = self.config.fallback_tier();
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    fallback = %fallback,
                    "Tier lookup failed, using lowest tier"
                );
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TierLimit;
    use crate::services::test_support::{
        FakeStore, FixedTiers, RecordingAudit, RecordingDispatcher,
    };
    use chrono::TimeZone;

    struct Harness {
        ledger: Arc<QuotaLedger>,
        store: Arc<FakeStore>,
        dispatcher: Arc<RecordingDispatcher>,
    }

    fn harness(tiers: FixedTiers) -> Harness {
        let store = Arc::new(FakeStore::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let config = QuotaConfig::default().with_tier("five", TierLimit::limited(5, "Five"));
        let ledger = QuotaLedger::new(
            config,
            store.clone(),
            Arc::new(tiers),
            Arc::new(RecordingAudit::default()),
            dispatcher.clone(),
        );
        Harness {
            ledger: Arc::new(ledger),
            store,
            dispatcher,
        }
    }

    // The admission rule peeks one request ahead, so a counter sitting at the
    // limit already reports exceeded rather than "at limit, not exceeded".
    #[tokio::test]
    async fn test_counter_at_limit_reports_exceeded_under_peek_ahead() {
        let h = harness(FixedTiers::with("u1", "five"));

        for expected in 0..5 {
            let check = h.ledger.check_quota("u1", "five").await;
            assert!(check.allowed, "request {} should be admitted", expected + 1);
            assert!(!check.quota_exceeded);
            assert_eq!(check.current, expected);
            h.ledger.increment_quota("u1", 1).await.unwrap();
        }

        let check = h.ledger.check_quota("u1", "five").await;
        assert_eq!(check.current, 5);
        assert!(check.quota_exceeded);
        assert!(!check.allowed);
        assert_eq!(check.percentage, 100.0);
    }

    #[tokio::test]
    async fn test_unlimited_tier_always_allowed() {
        let h = harness(FixedTiers::default());
        let now = Utc::now();
        let key = h
            .ledger
            .config()
            .counter_key("u1", YearMonth::from_datetime(now));

        for current in [0u64, 1, 1_000_000] {
            h.store.insert_raw(&key, &current.to_string());
            let check = h.ledger.check_quota_at("u1", "enterprise", now).await;
            assert!(check.allowed);
            assert!(!check.quota_exceeded);
            assert_eq!(check.current, current);
            assert_eq!(check.limit, MonthlyLimit::Unlimited);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let h = harness(FixedTiers::with("u1", "enterprise"));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let ledger = h.ledger.clone();
                tokio::spawn(async move { ledger.increment_quota("u1", 1).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let check = h.ledger.check_quota("u1", "enterprise").await;
        assert_eq!(check.current, 100);
    }

    #[tokio::test]
    async fn test_first_increment_sets_month_ttl() {
        let h = harness(FixedTiers::with("u1", "five"));
        let now = Utc::now();

        h.ledger.increment_quota_at("u1", 1, now).await.unwrap();

        let key = h
            .ledger
            .config()
            .counter_key("u1", YearMonth::from_datetime(now));
        let bound = Duration::from_secs(YearMonth::from_datetime(now).seconds_until_end(now))
            + Duration::from_secs(7 * 24 * 3600 + 1);
        match h.store.ttl_of(&key) {
            KeyTtl::Expires(ttl) => assert!(ttl <= bound),
            other => panic!("expected TTL on counter, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_ttl_is_repaired() {
        let h = harness(FixedTiers::with("u1", "five"));
        let now = Utc::now();
        let key = h
            .ledger
            .config()
            .counter_key("u1", YearMonth::from_datetime(now));

        h.store.insert_raw(&key, "2");
        assert_eq!(h.store.ttl_of(&key), KeyTtl::Persistent);

        assert_eq!(h.ledger.increment_quota_at("u1", 1, now).await.unwrap(), 3);
        assert!(matches!(h.store.ttl_of(&key), KeyTtl::Expires(_)));
    }

    #[tokio::test]
    async fn test_months_are_counted_separately() {
        let h = harness(FixedTiers::with("u1", "five"));
        let october = Utc.with_ymd_and_hms(2026, 10, 31, 23, 59, 59).unwrap();
        let november = Utc.with_ymd_and_hms(2026, 11, 1, 0, 0, 0).unwrap();

        h.ledger.increment_quota_at("u1", 4, october).await.unwrap();
        assert_eq!(h.ledger.increment_quota_at("u1", 1, november).await.unwrap(), 1);

        let check = h.ledger.check_quota_at("u1", "five", november).await;
        assert_eq!(check.current, 1);
        assert_eq!(
            check.reset_at,
            Utc.with_ymd_and_hms(2026, 12, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_store_down_fails_open_for_reads_only() {
        let h = harness(FixedTiers::with("u1", "five"));
        h.store.set_down(true);

        let check = h.ledger.check_quota("u1", "five").await;
        assert!(check.allowed);
        assert!(check.is_degraded());
        assert_eq!(check.limit, MonthlyLimit::Unlimited);

        let err = h.ledger.increment_quota("u1", 1).await.unwrap_err();
        assert!(matches!(err, QuotaError::StoreUnavailable(_)));
        assert!(err.is_retryable());

        assert!(h.ledger.usage("u1").await.degraded);
    }

    #[tokio::test]
    async fn test_oversized_increment_is_rejected_uncharged() {
        let h = harness(FixedTiers::with("u1", "five"));
        let now = Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap();

        let err = h
            .ledger
            .increment_quota_at("u1", u64::MAX, now)
            .await
            .unwrap_err();
        assert!(matches!(err, QuotaError::CountOutOfRange(u64::MAX)));
        assert!(!err.is_retryable());

        let check = h.ledger.check_quota_at("u1", "five", now).await;
        assert_eq!(check.current, 0);
    }

    #[tokio::test]
    async fn test_last_representable_month_does_not_panic() {
        let h = harness(FixedTiers::with("u1", "five"));
        let end_of_time = DateTime::<Utc>::MAX_UTC;

        assert_eq!(h.ledger.increment_quota_at("u1", 1, end_of_time).await.unwrap(), 1);
        let check = h.ledger.check_quota_at("u1", "five", end_of_time).await;
        assert_eq!(check.current, 1);
        assert_eq!(check.reset_in, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_corrupted_counter_reads_as_zero() {
        let h = harness(FixedTiers::with("u1", "five"));
        let now = Utc::now();
        let key = h
            .ledger
            .config()
            .counter_key("u1", YearMonth::from_datetime(now));
        h.store.insert_raw(&key, "not-a-number");

        let check = h.ledger.check_quota_at("u1", "five", now).await;
        assert!(check.allowed);
        assert_eq!(check.current, 0);
        assert!(!check.is_degraded());
    }

    #[tokio::test]
    async fn test_unknown_tier_uses_lowest_tier() {
        let h = harness(FixedTiers::default());
        let check = h.ledger.check_quota("u1", "platinum").await;
        assert_eq!(check.tier, "free");
        assert_eq!(check.limit, MonthlyLimit::Requests(100));
    }

    #[tokio::test]
    async fn test_increment_triggers_warnings_with_resolved_tier() {
        let h = harness(FixedTiers::with("u1", "five"));

        for _ in 0..5 {
            h.ledger.increment_quota("u1", 1).await.unwrap();
        }

        // 3/5 = 60% fires 50, 4/5 = 80% fires 80, 5/5 fires 100
        assert_eq!(
            h.dispatcher.templates(),
            vec!["quota_usage_50", "quota_usage_80", "quota_usage_100"]
        );
    }

    #[tokio::test]
    async fn test_failed_tier_lookup_warns_against_lowest_tier() {
        let h = harness(FixedTiers::default());

        // free tier is 100/month, so 50 requests crosses 50%
        assert_eq!(h.ledger.increment_quota("ghost", 50).await.unwrap(), 50);
        assert_eq!(h.dispatcher.templates(), vec!["quota_usage_50"]);
    }

    #[tokio::test]
    async fn test_usage_summary() {
        let h = harness(FixedTiers::with("u1", "five"));
        h.ledger.increment_quota("u1", 2).await.unwrap();

        let usage = h.ledger.usage("u1").await;
        assert_eq!(usage.tier, "five");
        assert_eq!(usage.tier_label, "Five");
        assert_eq!(usage.current, 2);
        assert_eq!(usage.remaining, Some(3));
        assert_eq!(usage.percentage, 40.0);
        assert!(!usage.degraded);
    }

    #[tokio::test]
    async fn test_tracked_keys_scans_one_month() {
        let h = harness(FixedTiers::default());
        let now = Utc::now();
        h.ledger.increment_quota_at("a", 1, now).await.unwrap();
        h.ledger.increment_quota_at("b", 1, now).await.unwrap();

        let period = YearMonth::from_datetime(now);
        let keys = h.ledger.tracked_keys(period).await.unwrap();
        assert_eq!(keys.len(), 2);
    }
}
