//! Domain types and the store ports the reconciler is written against.

pub mod accrual;
pub mod balance;
pub mod order;
pub mod ports;
