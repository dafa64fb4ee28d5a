//! Domain-level error types.

use thiserror::Error;

use crate::ports::StoreError;

/// Quota errors - failures of the ledger and its collaborators.
///
/// Only [`QuotaError::StoreUnavailable`] and [`QuotaError::CountOutOfRange`]
/// ever reach a caller, and only from
/// [`QuotaLedger::increment_quota`](crate::QuotaLedger::increment_quota).
/// The other variants are logged where they occur and resolved to a
/// permissive default.
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("Counter store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Unknown tier: {0}")]
    UnknownTier(String),

    #[error("Corrupted counter value at {key}: {value:?}")]
    CorruptedCounterValue { key: String, value: String },

    #[error("Increment of {0} is outside the counter range")]
    CountOutOfRange(u64),
}

impl QuotaError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QuotaError::StoreUnavailable(_))
    }
}
