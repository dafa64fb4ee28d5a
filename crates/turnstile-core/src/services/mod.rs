//! Services - the admission guard, the quota ledger and the usage notifier.

mod ledger;
mod local_guard;
mod notifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use ledger::QuotaLedger;
pub use local_guard::LocalAdmissionGuard;
pub use notifier::UsageNotifier;
