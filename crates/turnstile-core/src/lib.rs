//! # Turnstile Core
//!
//! The domain layer of Turnstile: a two-layer admission gate in front of a
//! request-handling service.
//!
//! - [`LocalAdmissionGuard`] rejects bursts per process with no I/O.
//! - [`QuotaLedger`] owns the authoritative monthly counter in a shared store.
//! - [`UsageNotifier`] warns users once per threshold per month.
//!
//! Everything that talks to the outside world goes through the traits in
//! [`ports`]; concrete adapters live in `turnstile-infra`.

pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod services;

pub use config::{LocalLimitConfig, QuotaConfig, ThresholdPolicy};
pub use domain::{AdmissionResult, MonthlyLimit, QuotaCheck, TierLimit, UsageSummary, YearMonth};
pub use error::QuotaError;
pub use services::{LocalAdmissionGuard, QuotaLedger, UsageNotifier};
