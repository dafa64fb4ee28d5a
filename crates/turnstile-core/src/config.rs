//! Configuration objects for the guard and the ledger.
//!
//! Both are plain values built once at startup and shared read-only; nothing
//! in this crate reads global state.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::{MonthlyLimit, TierLimit, YearMonth};
use crate::error::QuotaError;

/// Local admission guard configuration.
#[derive(Debug, Clone)]
pub struct LocalLimitConfig {
    /// Fixed window length.
    pub window: Duration,
    /// Limit for operation classes without an explicit entry.
    pub default_limit: u32,
    /// Per-operation-class limits.
    pub limits: HashMap<String, u32>,
    /// Upper bound on tracked (subject, operation) windows.
    pub max_windows: usize,
}

impl Default for LocalLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            default_limit: 100,
            limits: HashMap::new(),
            max_windows: 100_000,
        }
    }
}

impl LocalLimitConfig {
    pub fn limit_for(&self, operation_class: &str) -> u32 {
        self.limits
            .get(operation_class)
            .copied()
            .unwrap_or(self.default_limit)
    }

    pub fn with_limit(mut self, operation_class: impl Into<String>, limit: u32) -> Self {
        self.limits.insert(operation_class.into(), limit);
        self
    }

    pub fn with_default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_max_windows(mut self, max_windows: usize) -> Self {
        self.max_windows = max_windows;
        self
    }
}

/// How the notifier treats several thresholds crossed by one increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdPolicy {
    /// Act on the highest crossed threshold only; lower unset marks stay unset.
    #[default]
    HighestOnly,
    /// Mark and emit every crossed threshold that has not fired yet.
    EveryCrossed,
}

impl FromStr for ThresholdPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "highest" | "highest_only" => Ok(ThresholdPolicy::HighestOnly),
            "every" | "every_crossed" => Ok(ThresholdPolicy::EveryCrossed),
            other => Err(format!("unknown threshold policy: {other}")),
        }
    }
}

/// Monthly quota configuration.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Tier name to limit table.
    pub tiers: BTreeMap<String, TierLimit>,
    /// Lowest tier, used when a user's tier is unknown or cannot be resolved.
    pub default_tier: String,
    /// Extra lifetime of monthly keys past the end of the month.
    pub grace_period: Duration,
    /// Warning thresholds in percent of the monthly limit.
    pub warning_thresholds: Vec<u8>,
    pub threshold_policy: ThresholdPolicy,
    /// Prefix of monthly counter keys.
    pub key_prefix: String,
    /// Prefix of warning mark keys.
    pub warning_key_prefix: String,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        let tiers = BTreeMap::from([
            ("free".to_string(), TierLimit::limited(100, "Free")),
            ("starter".to_string(), TierLimit::limited(1_000, "Starter")),
            ("pro".to_string(), TierLimit::limited(10_000, "Pro")),
            ("enterprise".to_string(), TierLimit::unlimited("Enterprise")),
        ]);

        Self {
            tiers,
            default_tier: "free".to_string(),
            grace_period: Duration::from_secs(7 * 24 * 60 * 60),
            warning_thresholds: vec![50, 80, 100],
            threshold_policy: ThresholdPolicy::HighestOnly,
            key_prefix: "quota".to_string(),
            warning_key_prefix: "quota_warning".to_string(),
        }
    }
}

impl QuotaConfig {
    pub fn with_tier(mut self, name: impl Into<String>, limit: TierLimit) -> Self {
        self.tiers.insert(name.into(), limit);
        self
    }

    pub fn with_threshold_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.threshold_policy = policy;
        self
    }

    /// Look up a tier by name.
    pub fn tier_limit(&self, tier: &str) -> Result<&TierLimit, QuotaError> {
        self.tiers
            .get(tier)
            .ok_or_else(|| QuotaError::UnknownTier(tier.to_string()))
    }

    /// The tier applied when nothing better is known: `default_tier` if it is
    /// in the table, otherwise the tier with the smallest finite limit.
    pub fn fallback_tier(&self) -> (String, TierLimit) {
        if let Some(limit) = self.tiers.get(&self.default_tier) {
            return (self.default_tier.clone(), limit.clone());
        }

        self.tiers
            .iter()
            .min_by_key(|(_, t)| t.monthly_request_limit.requests().unwrap_or(u64::MAX))
            .map(|(name, t)| (name.clone(), t.clone()))
            .unwrap_or_else(|| {
                (
                    self.default_tier.clone(),
                    TierLimit::new(MonthlyLimit::Unlimited, "Default"),
                )
            })
    }

    /// Resolve a tier name to its limits, falling back to the lowest tier
    /// when the name is not configured.
    pub fn resolve_tier(&self, tier: &str) -> (String, TierLimit) {
        match self.tier_limit(tier) {
            Ok(limit) => (tier.to_string(), limit.clone()),
            Err(e) => {
                let (name, limit) = self.fallback_tier();
                tracing::warn!(error = %e, fallback = %name, "Unknown tier, using fallback");
                (name, limit)
            }
        }
    }

    pub fn counter_key(&self, user_id: &str, period: YearMonth) -> String {
        format!("{}:{}:{}", self.key_prefix, user_id, period)
    }

    pub fn warning_key(&self, user_id: &str, period: YearMonth, threshold: u8) -> String {
        format!(
            "{}:{}:{}:{}",
            self.warning_key_prefix, user_id, period, threshold
        )
    }

    /// Lifetime of a key written at `now`: the rest of the month plus grace.
    pub fn period_ttl(&self, now: DateTime<Utc>) -> Duration {
        let period = YearMonth::from_datetime(now);
        Duration::from_secs(period.seconds_until_end(now)) + self.grace_period
    }

    /// Thresholds sorted ascending, without duplicates or zero.
    pub fn sorted_thresholds(&self) -> Vec<u8> {
        let mut thresholds: Vec<u8> = self
            .warning_thresholds
            .iter()
            .copied()
            .filter(|t| *t > 0)
            .collect();
        thresholds.sort_unstable();
        thresholds.dedup();
        thresholds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_limit_for_falls_back_to_default() {
        let config = LocalLimitConfig::default()
            .with_default_limit(10)
            .with_limit("upload", 2);
        assert_eq!(config.limit_for("upload"), 2);
        assert_eq!(config.limit_for("anything-else"), 10);
    }

    #[test]
    fn test_resolve_unknown_tier_uses_default_tier() {
        let config = QuotaConfig::default();
        let (name, limit) = config.resolve_tier("platinum");
        assert_eq!(name, "free");
        assert_eq!(limit.monthly_request_limit, MonthlyLimit::Requests(100));
    }

    #[test]
    fn test_fallback_picks_smallest_finite_tier() {
        let mut config = QuotaConfig::default();
        config.default_tier = "missing".to_string();
        let (name, _) = config.fallback_tier();
        assert_eq!(name, "free");
    }

    #[test]
    fn test_keys() {
        let config = QuotaConfig::default();
        let period = YearMonth::new(2026, 10).unwrap();
        assert_eq!(config.counter_key("u1", period), "quota:u1:2026-10");
        assert_eq!(
            config.warning_key("u1", period, 80),
            "quota_warning:u1:2026-10:80"
        );
    }

    #[test]
    fn test_period_ttl_includes_grace() {
        let config = QuotaConfig::default();
        let now = Utc.with_ymd_and_hms(2026, 10, 31, 23, 0, 0).unwrap();
        assert_eq!(
            config.period_ttl(now),
            Duration::from_secs(3600 + 7 * 24 * 3600)
        );
    }

    #[test]
    fn test_sorted_thresholds() {
        let mut config = QuotaConfig::default();
        config.warning_thresholds = vec![100, 0, 50, 80, 50];
        assert_eq!(config.sorted_thresholds(), vec![50, 80, 100]);
    }

    #[test]
    fn test_threshold_policy_parse() {
        assert_eq!(
            "every".parse::<ThresholdPolicy>(),
            Ok(ThresholdPolicy::EveryCrossed)
        );
        assert!("sometimes".parse::<ThresholdPolicy>().is_err());
    }
}
