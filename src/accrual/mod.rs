//! Outbound side: the accrual service client and the shared rate-limit pause.

pub mod backoff;
pub mod client;
