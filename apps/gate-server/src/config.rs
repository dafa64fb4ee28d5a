//! Application configuration loaded from environment variables.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use turnstile_core::{LocalLimitConfig, MonthlyLimit, QuotaConfig, ThresholdPolicy, TierLimit};

#[cfg(feature = "redis")]
use turnstile_infra::RedisConfig;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub local: LocalLimitConfig,
    pub quota: QuotaConfig,
    pub tier_cache_ttl: Duration,
    #[cfg(feature = "redis")]
    pub redis: RedisConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            local: LocalLimitConfig::default(),
            quota: QuotaConfig::default(),
            tier_cache_ttl: Duration::from_secs(60),
            #[cfg(feature = "redis")]
            redis: RedisConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(env::vars())
    }

    /// Build the configuration from `(name, value)` pairs.
    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let vars: HashMap<String, String> = vars.into_iter().collect();
        let defaults = Self::default();

        Self {
            host: vars.get("HOST").cloned().unwrap_or(defaults.host),
            port: parse_var(&vars, "PORT").unwrap_or(defaults.port),
            local: Self::parse_local_limits(&vars),
            quota: Self::parse_quota(&vars),
            tier_cache_ttl: parse_var(&vars, "TIER_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.tier_cache_ttl),
            #[cfg(feature = "redis")]
            redis: RedisConfig::from_lookup(|name| vars.get(name).cloned()),
        }
    }

    /// Format: LOCAL_LIMIT_<CLASS>=<n>
    /// Example: LOCAL_LIMIT_EXPORT=5
    fn parse_local_limits(vars: &HashMap<String, String>) -> LocalLimitConfig {
        let mut local = LocalLimitConfig::default();

        if let Some(secs) = parse_var(vars, "LOCAL_WINDOW_SECS") {
            local = local.with_window(Duration::from_secs(secs));
        }
        if let Some(limit) = parse_var(vars, "LOCAL_DEFAULT_LIMIT") {
            local = local.with_default_limit(limit);
        }
        if let Some(max) = parse_var(vars, "LOCAL_MAX_WINDOWS") {
            local = local.with_max_windows(max);
        }

        for (key, value) in vars {
            if let Some(class) = key.strip_prefix("LOCAL_LIMIT_") {
                match value.trim().parse::<u32>() {
                    Ok(limit) => local = local.with_limit(class.to_lowercase(), limit),
                    Err(_) => tracing::warn!(var = %key, value = %value, "Ignoring invalid local limit"),
                }
            }
        }

        local
    }

    /// Format: QUOTA_TIER_<NAME>=<limit>,<label>, limit -1 for unlimited.
    /// Example: QUOTA_TIER_TEAM=5000,Team
    fn parse_quota(vars: &HashMap<String, String>) -> QuotaConfig {
        let mut quota = QuotaConfig::default();

        for (key, value) in vars {
            let Some(name) = key.strip_prefix("QUOTA_TIER_") else {
                continue;
            };
            let name = name.to_lowercase();
            let (raw_limit, label) = match value.split_once(',') {
                Some((limit, label)) => (limit.trim(), label.trim().to_string()),
                None => (value.trim(), name.clone()),
            };

            match raw_limit
                .parse::<i64>()
                .map_err(|e| e.to_string())
                .and_then(MonthlyLimit::try_from)
            {
                Ok(limit) => quota = quota.with_tier(name, TierLimit::new(limit, label)),
                Err(e) => tracing::warn!(var = %key, error = %e, "Ignoring invalid tier"),
            }
        }

        if let Some(tier) = vars.get("QUOTA_DEFAULT_TIER") {
            quota.default_tier = tier.trim().to_lowercase();
        }
        if let Some(days) = parse_var::<u64>(vars, "QUOTA_GRACE_DAYS") {
            quota.grace_period = Duration::from_secs(days * 24 * 60 * 60);
        }
        if let Some(raw) = vars.get("QUOTA_WARNING_THRESHOLDS") {
            quota.warning_thresholds = raw
                .split(',')
                .filter_map(|t| t.trim().parse::<u8>().ok())
                .collect();
        }
        if let Some(raw) = vars.get("QUOTA_THRESHOLD_POLICY") {
            match raw.parse::<ThresholdPolicy>() {
                Ok(policy) => quota = quota.with_threshold_policy(policy),
                Err(e) => tracing::warn!(error = %e, "Keeping default threshold policy"),
            }
        }

        if !quota.tiers.contains_key(&quota.default_tier) {
            tracing::warn!(
                default_tier = %quota.default_tier,
                "Default tier is not configured, the lowest tier will be used"
            );
        }

        quota
    }
}

fn parse_var<T: std::str::FromStr>(vars: &HashMap<String, String>, name: &str) -> Option<T> {
    vars.get(name).and_then(|v| v.trim().parse().ok())
}
