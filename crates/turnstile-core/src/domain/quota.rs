use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{MonthlyLimit, YearMonth};

/// Decision of the read-only monthly quota check.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaCheck {
    pub allowed: bool,
    pub quota_exceeded: bool,
    /// Requests already recorded this month.
    pub current: u64,
    pub limit: MonthlyLimit,
    /// `current` as a percentage of `limit`, 0 when unlimited.
    pub percentage: f64,
    pub tier: String,
    pub reset_at: DateTime<Utc>,
    pub reset_in: Duration,
    /// Set when the store could not be read and the check failed open.
    pub degraded: Option<String>,
}

impl QuotaCheck {
    /// Permissive result returned when the counter cannot be read.
    pub(crate) fn fail_open(
        tier: &str,
        period: YearMonth,
        now: DateTime<Utc>,
        reason: String,
    ) -> Self {
        Self {
            allowed: true,
            quota_exceeded: false,
            current: 0,
            limit: MonthlyLimit::Unlimited,
            percentage: 0.0,
            tier: tier.to_string(),
            reset_at: period.end(),
            reset_in: Duration::from_secs(period.seconds_until_end(now)),
            degraded: Some(reason),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Read model of a user's consumption for the current month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub user_id: String,
    pub tier: String,
    pub tier_label: String,
    pub month: String,
    pub current: u64,
    pub limit: MonthlyLimit,
    /// `None` when unlimited.
    pub remaining: Option<u64>,
    pub percentage: f64,
    pub reset_at: DateTime<Utc>,
    pub degraded: bool,
}

/// Percentage of `limit` consumed by `current`, rounded to two decimals.
pub(crate) fn usage_percentage(current: u64, limit: MonthlyLimit) -> f64 {
    match limit {
        MonthlyLimit::Unlimited => 0.0,
        MonthlyLimit::Requests(0) => 100.0,
        MonthlyLimit::Requests(n) => ((current as f64 / n as f64) * 10_000.0).round() / 100.0,
    }
}
