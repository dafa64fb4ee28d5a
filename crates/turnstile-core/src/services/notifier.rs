//! Usage threshold notifier.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::{QuotaConfig, ThresholdPolicy};
use crate::domain::{YearMonth, usage_percentage};
use crate::ports::{AuditRecord, AuditSink, CounterStore, NotificationDispatcher};

/// Audit event type for a crossed usage threshold.
pub const THRESHOLD_CROSSED_EVENT: &str = "quota.threshold_crossed";

/// Emits at most one warning per (user, month, threshold).
///
/// The warning mark in the counter store is the only deduplication state:
/// a mark is created with `SET NX`, and only the caller that created it emits.
pub struct UsageNotifier {
    config: Arc<QuotaConfig>,
    store: Arc<dyn CounterStore>,
    audit: Arc<dyn AuditSink>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl UsageNotifier {
    pub fn new(
        config: Arc<QuotaConfig>,
        store: Arc<dyn CounterStore>,
        audit: Arc<dyn AuditSink>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            config,
            store,
            audit,
            dispatcher,
        }
    }

    /// Emit warnings for thresholds reached by `current_count`.
    ///
    /// Returns the thresholds that fired on this call. Never fails; store and
    /// collaborator errors are logged and dropped.
    pub async fn check_usage_warnings(
        &self,
        user_id: &str,
        tier: &str,
        current_count: u64,
    ) -> Vec<u8> {
        self.check_usage_warnings_at(user_id, tier, current_count, Utc::now())
            .await
    }

    pub async fn check_usage_warnings_at(
        &self,
        user_id: &str,
        tier: &str,
        current_count: u64,
        now: DateTime<Utc>,
    ) -> Vec<u8> {
        let (tier_name, tier_limit) = self.config.resolve_tier(tier);
        let Some(limit) = tier_limit.monthly_request_limit.requests() else {
            return Vec::new();
        };

        let crossed: Vec<u8> = self
            .config
            .sorted_thresholds()
            .into_iter()
            .filter(|t| current_count as u128 * 100 >= *t as u128 * limit as u128)
            .collect();

        let candidates: Vec<u8> = match self.config.threshold_policy {
            ThresholdPolicy::HighestOnly => crossed.last().copied().into_iter().collect(),
            ThresholdPolicy::EveryCrossed => crossed,
        };

        let period = YearMonth::from_datetime(now);
        let ttl = self.config.period_ttl(now);
        let mut fired = Vec::new();

        for threshold in candidates {
            let key = self.config.warning_key(user_id, period, threshold);

            match self.store.set_nx_ex(&key, "1", ttl).await {
                Ok(true) => {
                    let payload = serde_json::json!({
                        "threshold": threshold,
                        "current": current_count,
                        "limit": limit,
                        "percentage": usage_percentage(current_count, tier_limit.monthly_request_limit),
                        "tier": tier_name,
                        "tier_label": tier_limit.label,
                        "month": period.to_string(),
                        "reset_at": period.end().to_rfc3339(),
                    });
                    self.emit(user_id, threshold, payload).await;
                    fired.push(threshold);
                }
                Ok(false) => {
                    tracing::debug!(
                        user_id = %user_id,
                        threshold,
                        "Usage warning already sent this month"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        threshold,
                        error = %e,
                        "Failed to record usage warning mark"
                    );
                }
            }
        }

        fired
    }

    async fn emit(&self, user_id: &str, threshold: u8, payload: serde_json::Value) {
        tracing::info!(user_id = %user_id, threshold, "Usage threshold crossed");

        let record = AuditRecord::new(THRESHOLD_CROSSED_EVENT, user_id, payload.clone());
        if let Err(e) = self.audit.log_event(record).await {
            tracing::warn!(user_id = %user_id, error = %e, "Audit sink rejected usage warning");
        }

        let template_id = format!("quota_usage_{threshold}");
        if let Err(e) = self
            .dispatcher
            .queue_notification(user_id, &template_id, payload)
            .await
        {
            tracing::warn!(
                user_id = %user_id,
                template = %template_id,
                error = %e,
                "Failed to queue usage warning"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TierLimit;
    use crate::ports::KeyTtl;
    use crate::services::test_support::{FakeStore, RecordingAudit, RecordingDispatcher};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Harness {
        notifier: UsageNotifier,
        store: Arc<FakeStore>,
        audit: Arc<RecordingAudit>,
        dispatcher: Arc<RecordingDispatcher>,
    }

    fn harness(config: QuotaConfig) -> Harness {
        let store = Arc::new(FakeStore::default());
        let audit = Arc::new(RecordingAudit::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let notifier = UsageNotifier::new(
            Arc::new(config.with_tier("tiny", TierLimit::limited(10, "Tiny"))),
            store.clone(),
            audit.clone(),
            dispatcher.clone(),
        );
        Harness {
            notifier,
            store,
            audit,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn test_each_threshold_fires_once() {
        let h = harness(QuotaConfig::default());

        let mut fired = Vec::new();
        for count in 1..=12 {
            fired.extend(h.notifier.check_usage_warnings("u1", "tiny", count).await);
        }

        assert_eq!(fired, vec![50, 80, 100]);
        assert_eq!(
            h.dispatcher.templates(),
            vec!["quota_usage_50", "quota_usage_80", "quota_usage_100"]
        );
        assert_eq!(h.audit.records.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_below_first_threshold_is_silent() {
        let h = harness(QuotaConfig::default());
        assert!(h.notifier.check_usage_warnings("u1", "tiny", 4).await.is_empty());
        assert!(h.dispatcher.templates().is_empty());
    }

    #[tokio::test]
    async fn test_highest_only_skips_lower_marks() {
        let h = harness(QuotaConfig::default());

        assert_eq!(h.notifier.check_usage_warnings("u1", "tiny", 9).await, vec![80]);

        let period = YearMonth::current();
        let config = QuotaConfig::default();
        assert_eq!(
            h.store.ttl_of(&config.warning_key("u1", period, 50)),
            KeyTtl::Missing
        );

        // 50% never fires retroactively
        assert!(h.notifier.check_usage_warnings("u1", "tiny", 9).await.is_empty());
        assert_eq!(h.dispatcher.templates(), vec!["quota_usage_80"]);
    }

    #[tokio::test]
    async fn test_every_crossed_policy_fires_all_pending() {
        let h = harness(QuotaConfig::default().with_threshold_policy(ThresholdPolicy::EveryCrossed));

        assert_eq!(
            h.notifier.check_usage_warnings("u1", "tiny", 10).await,
            vec![50, 80, 100]
        );
        assert!(h.notifier.check_usage_warnings("u1", "tiny", 11).await.is_empty());
    }

    #[tokio::test]
    async fn test_unlimited_tier_is_skipped() {
        let h = harness(QuotaConfig::default());
        assert!(
            h.notifier
                .check_usage_warnings("u1", "enterprise", 1_000_000)
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_mark_gets_period_ttl() {
        let h = harness(QuotaConfig::default());
        let now = Utc::now();
        h.notifier.check_usage_warnings_at("u1", "tiny", 5, now).await;

        let config = QuotaConfig::default();
        let key = config.warning_key("u1", YearMonth::from_datetime(now), 50);
        match h.store.ttl_of(&key) {
            KeyTtl::Expires(ttl) => assert!(ttl <= config.period_ttl(now) + Duration::from_secs(1)),
            other => panic!("expected expiring mark, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let h = harness(QuotaConfig::default());
        h.store.set_down(true);
        assert!(h.notifier.check_usage_warnings("u1", "tiny", 10).await.is_empty());
        assert!(h.dispatcher.templates().is_empty());
    }

    #[tokio::test]
    async fn test_dispatcher_failure_still_marks() {
        let h = harness(QuotaConfig::default());
        h.dispatcher.failing.store(true, Ordering::SeqCst);

        assert_eq!(h.notifier.check_usage_warnings("u1", "tiny", 5).await, vec![50]);
        assert_eq!(h.audit.records.lock().unwrap().len(), 1);

        h.dispatcher.failing.store(false, Ordering::SeqCst);
        assert!(h.notifier.check_usage_warnings("u1", "tiny", 6).await.is_empty());
    }
}
