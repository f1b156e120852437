//! Application layer orchestrating reconciliation.
//!
//! The `Reconciler` turns one accrual response into at most one optimistic
//! store commit. The `Scheduler` runs a fixed pool of `tokio` workers that
//! each tick independently, pull pending orders, honor the shared `Backoff`
//! and feed responses to the reconciler.

pub mod reconciler;
pub mod scheduler;
