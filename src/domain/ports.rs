use super::balance::{UserBalance, Withdrawal};
use super::order::{Order, OrderNumber, OrderStatus, OrderTransition, UserId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Result of an optimistic order commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The stored status no longer matches the transition's `from`, or a
    /// concurrent writer won. Nothing was written.
    Conflict { stored: Option<OrderStatus> },
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Registers a freshly uploaded order. Fails if the number is taken.
    async fn create(&self, order: Order) -> Result<()>;
    async fn get(&self, number: &OrderNumber) -> Result<Option<Order>>;
    /// A user's orders, newest upload first.
    async fn list_by_user(&self, user: UserId) -> Result<Vec<Order>>;
    /// Orders in NEW or PROCESSING.
    async fn list_pending(&self) -> Result<Vec<Order>>;
    /// Writes the transition and, for PROCESSED, credits the owner's balance
    /// as one atomic unit, provided the stored status still equals
    /// `transition.from`.
    async fn commit(&self, transition: &OrderTransition) -> Result<CommitOutcome>;
}

#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// The user's balance; zero if nothing was ever credited.
    async fn balance(&self, user: UserId) -> Result<UserBalance>;
    async fn all_balances(&self) -> Result<Vec<UserBalance>>;
    async fn withdraw(&self, withdrawal: Withdrawal) -> Result<UserBalance>;
    /// A user's withdrawals, newest first.
    async fn withdrawals(&self, user: UserId) -> Result<Vec<Withdrawal>>;
}

pub type OrderStoreHandle = Arc<dyn OrderStore>;
pub type BalanceStoreHandle = Arc<dyn BalanceStore>;
