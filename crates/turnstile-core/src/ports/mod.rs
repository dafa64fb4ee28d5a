//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod audit;
mod notification;
mod store;
mod tier;

pub use audit::{AuditError, AuditRecord, AuditSink};
pub use notification::{NotificationDispatcher, NotifyError};
pub use store::{CounterStore, KeyTtl, StoreError};
pub use tier::{TierError, TierResolver};
