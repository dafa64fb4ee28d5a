use std::time::Duration;

/// Decision of the local admission guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionResult {
    pub allowed: bool,
    /// Admitted requests in the current window, including this one if allowed.
    pub current: u32,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window closes.
    pub reset_in: Duration,
}
