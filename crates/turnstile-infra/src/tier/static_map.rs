use std::collections::HashMap;

use async_trait::async_trait;

use turnstile_core::ports::{TierError, TierResolver};

/// Tier resolver backed by a fixed user-to-tier table.
///
/// Users missing from the table resolve to `NotFound`, which the ledger turns
/// into the configured lowest tier.
#[derive(Debug, Clone, Default)]
pub struct StaticTierResolver {
    assignments: HashMap<String, String>,
}

impl StaticTierResolver {
    pub fn new(assignments: HashMap<String, String>) -> Self {
        Self { assignments }
    }

    pub fn with_user(mut self, user_id: impl Into<String>, tier: impl Into<String>) -> Self {
        self.assignments.insert(user_id.into(), tier.into());
        self
    }

    /// Load assignments from `USER_TIER_<USER>=<tier>` environment variables.
    pub fn from_env() -> Self {
        let assignments = std::env::vars()
            .filter_map(|(key, value)| {
                key.strip_prefix("USER_TIER_")
                    .map(|user| (user.to_lowercase(), value.trim().to_lowercase()))
            })
            .collect();
        Self { assignments }
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

#[async_trait]
impl TierResolver for StaticTierResolver {
    async fn tier_for(&self, user_id: &str) -> Result<String, TierError> {
        self.assignments
            .get(user_id)
            .cloned()
            .ok_or_else(|| TierError::NotFound(user_id.to_string()))
    }
}
