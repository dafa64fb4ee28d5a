//! Data Transfer Objects - request/response types for the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response for the gated operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementResponse {
    pub user_id: String,
    pub tier: String,
    /// Requests recorded this month, including this one.
    pub count: u64,
    /// Monthly limit, -1 meaning unlimited.
    pub limit: i64,
    /// `None` when unlimited.
    pub remaining: Option<u64>,
}

/// A user's consumption for the current month.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageResponse {
    pub user_id: String,
    pub tier: String,
    pub tier_label: String,
    /// `YYYY-MM`.
    pub month: String,
    pub current: u64,
    pub limit: i64,
    pub remaining: Option<u64>,
    pub percentage: f64,
    pub reset_at: DateTime<Utc>,
    /// True when the counter could not be read.
    pub degraded: bool,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// `redis` or `memory`.
    pub store_backend: String,
}
