//! Domain types - periods, tiers, and the decisions handed back to callers.

mod admission;
mod period;
mod quota;
mod tier;

pub use admission::AdmissionResult;
pub use period::YearMonth;
pub use quota::{QuotaCheck, UsageSummary};
pub(crate) use quota::usage_percentage;
pub use tier::{MonthlyLimit, TierLimit};
