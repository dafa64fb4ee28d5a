use async_trait::async_trait;

/// Tier resolver trait - the subscription source of truth as seen by the core.
#[async_trait]
pub trait TierResolver: Send + Sync {
    /// Resolve the tier name for a user.
    async fn tier_for(&self, user_id: &str) -> Result<String, TierError>;
}

/// Tier lookup errors.
#[derive(Debug, thiserror::Error)]
pub enum TierError {
    #[error("No subscription found for user {0}")]
    NotFound(String),

    #[error("Tier source unavailable: {0}")]
    Unavailable(String),
}
