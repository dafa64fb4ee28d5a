use serde::{Deserialize, Serialize};

/// Monthly request allowance of a tier.
///
/// On the wire and in configuration this is a plain integer where `-1`
/// means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum MonthlyLimit {
    Unlimited,
    Requests(u64),
}

impl MonthlyLimit {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, MonthlyLimit::Unlimited)
    }

    /// The finite limit, or `None` when unlimited.
    pub fn requests(&self) -> Option<u64> {
        match self {
            MonthlyLimit::Unlimited => None,
            MonthlyLimit::Requests(n) => Some(*n),
        }
    }
}

impl TryFrom<i64> for MonthlyLimit {
    type Error = String;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            -1 => Ok(MonthlyLimit::Unlimited),
            n if n >= 0 => Ok(MonthlyLimit::Requests(n as u64)),
            n => Err(format!("invalid monthly limit {n}, expected -1 or >= 0")),
        }
    }
}

impl From<MonthlyLimit> for i64 {
    fn from(limit: MonthlyLimit) -> Self {
        match limit {
            MonthlyLimit::Unlimited => -1,
            MonthlyLimit::Requests(n) => i64::try_from(n).unwrap_or(i64::MAX),
        }
    }
}

/// Quota settings attached to a named tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimit {
    pub monthly_request_limit: MonthlyLimit,
    /// Human-readable plan name, used in notifications.
    pub label: String,
}

impl TierLimit {
    pub fn new(monthly_request_limit: MonthlyLimit, label: impl Into<String>) -> Self {
        Self {
            monthly_request_limit,
            label: label.into(),
        }
    }

    pub fn limited(requests: u64, label: impl Into<String>) -> Self {
        Self::new(MonthlyLimit::Requests(requests), label)
    }

    pub fn unlimited(label: impl Into<String>) -> Self {
        Self::new(MonthlyLimit::Unlimited, label)
    }
}
