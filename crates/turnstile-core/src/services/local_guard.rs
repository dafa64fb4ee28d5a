//! Per-process fixed-window admission guard.
//!
//! Windows live in a sharded concurrent map keyed by (subject, operation
//! class). A check never awaits and never touches the network, so it is safe
//! to call from any worker thread on the request path. The guard is advisory:
//! the quota ledger remains the authority, and losing a window (eviction,
//! restart) only ever makes the guard more permissive.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::LocalLimitConfig;
use crate::domain::AdmissionResult;

type WindowKey = (String, String);

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    expires_at: Instant,
}

impl Window {
    fn open(now: Instant, length: Duration) -> Self {
        Self {
            count: 0,
            expires_at: now + length,
        }
    }
}

/// In-memory fixed-window counter, one window per (subject, operation class).
///
/// Only admitted requests are counted; rejected attempts do not extend or
/// refill the window.
pub struct LocalAdmissionGuard {
    windows: DashMap<WindowKey, Window>,
    config: LocalLimitConfig,
}

impl LocalAdmissionGuard {
    pub fn new(config: LocalLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &LocalLimitConfig {
        &self.config
    }

    /// Check and, if admitted, count one request.
    pub fn check_local_limit(&self, subject_key: &str, operation_class: &str) -> AdmissionResult {
        let limit = self.config.limit_for(operation_class);
        let now = Instant::now();

        if limit == 0 {
            return AdmissionResult {
                allowed: false,
                current: 0,
                limit,
                remaining: 0,
                reset_in: self.config.window,
            };
        }

        let key = (subject_key.to_string(), operation_class.to_string());

        if self.windows.len() >= self.config.max_windows && !self.windows.contains_key(&key) {
            self.evict(now);
        }

        let mut window = self
            .windows
            .entry(key)
            .or_insert_with(|| Window::open(now, self.config.window));

        // An expired window is the same as an absent one.
        if window.expires_at <= now {
            *window = Window::open(now, self.config.window);
        }

        let reset_in = window.expires_at.saturating_duration_since(now);

        if window.count >= limit {
            tracing::debug!(
                subject = %subject_key,
                operation = %operation_class,
                count = window.count,
                limit,
                "Local admission rejected"
            );
            return AdmissionResult {
                allowed: false,
                current: window.count,
                limit,
                remaining: 0,
                reset_in,
            };
        }

        window.count += 1;

        AdmissionResult {
            allowed: true,
            current: window.count,
            limit,
            remaining: limit - window.count,
            reset_in,
        }
    }

    /// Number of windows currently held, expired ones included.
    pub fn tracked_windows(&self) -> usize {
        self.windows.len()
    }

    /// Drop every closed window.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.windows.retain(|_, w| w.expires_at > now);
    }

    /// Make room for one more window: closed windows go first, then the
    /// windows closest to expiry.
    fn evict(&self, now: Instant) {
        self.windows.retain(|_, w| w.expires_at > now);

        let overflow = (self.windows.len() + 1).saturating_sub(self.config.max_windows);
        if overflow == 0 {
            return;
        }

        let mut by_expiry: Vec<(WindowKey, Instant)> = self
            .windows
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().expires_at))
            .collect();
        by_expiry.sort_by_key(|(_, expires_at)| *expires_at);

        for (key, _) in by_expiry.into_iter().take(overflow) {
            self.windows.remove(&key);
        }

        tracing::warn!(
            evicted = overflow,
            max_windows = self.config.max_windows,
            "Local admission guard at capacity, evicted open windows"
        );
    }
}
