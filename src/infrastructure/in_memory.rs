use crate::domain::balance::{UserBalance, Withdrawal};
use crate::domain::order::{Order, OrderNumber, OrderTransition, UserId};
use crate::domain::ports::{BalanceStore, CommitOutcome, OrderStore};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    orders: HashMap<OrderNumber, Order>,
    balances: HashMap<UserId, UserBalance>,
    withdrawals: Vec<Withdrawal>,
}

/// A thread-safe in-memory store for orders and balances.
///
/// Orders and balances live behind one `RwLock` so an order commit and its
/// balance credit happen under the same write guard. `Clone` shares state.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn create(&self, order: Order) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.orders.get(&order.number) {
            return Err(ReconcileError::OrderAlreadyUploaded {
                number: order.number.to_string(),
                same_user: existing.user == order.user,
            });
        }
        state.orders.insert(order.number.clone(), order);
        Ok(())
    }

    async fn get(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(number).cloned())
    }

    async fn list_by_user(&self, user: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| order.user == user)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(orders)
    }

    async fn list_pending(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| !order.status.is_terminal())
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));
        Ok(orders)
    }

    async fn commit(&self, transition: &OrderTransition) -> Result<CommitOutcome> {
        let mut state = self.state.write().await;
        let State {
            orders, balances, ..
        } = &mut *state;

        let order = orders
            .get_mut(&transition.number)
            .ok_or_else(|| ReconcileError::UnknownOrder(transition.number.to_string()))?;
        if order.status != transition.from {
            return Ok(CommitOutcome::Conflict {
                stored: Some(order.status),
            });
        }

        // The credit is computed up front so a failure leaves both untouched.
        let credited = match transition.credit() {
            Some(credit) => {
                let mut balance = balances
                    .get(&transition.user)
                    .cloned()
                    .unwrap_or_else(|| UserBalance::new(transition.user));
                balance.credit(credit)?;
                Some(balance)
            }
            None => None,
        };

        order.apply(transition);
        if let Some(balance) = credited {
            balances.insert(transition.user, balance);
        }
        Ok(CommitOutcome::Committed)
    }
}

#[async_trait]
impl BalanceStore for InMemoryStore {
    async fn balance(&self, user: UserId) -> Result<UserBalance> {
        let state = self.state.read().await;
        Ok(state
            .balances
            .get(&user)
            .cloned()
            .unwrap_or_else(|| UserBalance::new(user)))
    }

    async fn all_balances(&self) -> Result<Vec<UserBalance>> {
        let state = self.state.read().await;
        let mut balances: Vec<UserBalance> = state.balances.values().cloned().collect();
        balances.sort_by_key(|balance| balance.user);
        Ok(balances)
    }

    async fn withdraw(&self, withdrawal: Withdrawal) -> Result<UserBalance> {
        let mut state = self.state.write().await;
        let mut balance = state
            .balances
            .get(&withdrawal.user)
            .cloned()
            .unwrap_or_else(|| UserBalance::new(withdrawal.user));
        balance.withdraw(withdrawal.sum)?;

        state.balances.insert(withdrawal.user, balance.clone());
        state.withdrawals.push(withdrawal);
        Ok(balance)
    }

    async fn withdrawals(&self, user: UserId) -> Result<Vec<Withdrawal>> {
        let state = self.state.read().await;
        let mut withdrawals: Vec<Withdrawal> = state
            .withdrawals
            .iter()
            .filter(|withdrawal| withdrawal.user == user)
            .cloned()
            .collect();
        withdrawals.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        Ok(withdrawals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::balance::Money;
    use crate::domain::order::OrderStatus;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn order(number: &str, user: UserId) -> Order {
        Order::new(OrderNumber::parse(number).unwrap(), user)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryStore::new();
        let order = order("79927398713", 1);

        store.create(order.clone()).await.unwrap();
        let retrieved = store.get(&order.number).await.unwrap().unwrap();
        assert_eq!(retrieved, order);

        let missing = OrderNumber::parse("12345678903").unwrap();
        assert!(store.get(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_upload() {
        let store = InMemoryStore::new();
        store.create(order("79927398713", 1)).await.unwrap();

        let same = store.create(order("79927398713", 1)).await;
        assert!(matches!(
            same,
            Err(ReconcileError::OrderAlreadyUploaded {
                same_user: true,
                ..
            })
        ));

        let other = store.create(order("79927398713", 2)).await;
        assert!(matches!(
            other,
            Err(ReconcileError::OrderAlreadyUploaded {
                same_user: false,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_list_pending_skips_terminal() {
        let store = InMemoryStore::new();
        let first = order("79927398713", 1);
        let second = order("12345678903", 1);
        store.create(first.clone()).await.unwrap();
        store.create(second.clone()).await.unwrap();

        let transition = OrderTransition::new(&first, OrderStatus::Invalid, Money::ZERO);
        store.commit(&transition).await.unwrap();

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].number, second.number);
        assert_eq!(store.list_by_user(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_commit_credits_once() {
        let store = InMemoryStore::new();
        let order = order("79927398713", 1);
        store.create(order.clone()).await.unwrap();

        let accrual = Money::new(dec!(500)).unwrap();
        let transition = OrderTransition::new(&order, OrderStatus::Processed, accrual);

        assert_eq!(
            store.commit(&transition).await.unwrap(),
            CommitOutcome::Committed
        );
        assert_eq!(
            store.commit(&transition).await.unwrap(),
            CommitOutcome::Conflict {
                stored: Some(OrderStatus::Processed)
            }
        );

        let balance = store.balance(1).await.unwrap();
        assert_eq!(balance.current, accrual);
    }

    #[tokio::test]
    async fn test_overflowing_credit_leaves_order_unchanged() {
        let store = InMemoryStore::new();
        let first = order("79927398713", 1);
        let second = order("12345678903", 1);
        store.create(first.clone()).await.unwrap();
        store.create(second.clone()).await.unwrap();

        let max = Money::new(Decimal::MAX).unwrap();
        store
            .commit(&OrderTransition::new(&first, OrderStatus::Processed, max))
            .await
            .unwrap();

        let result = store
            .commit(&OrderTransition::new(&second, OrderStatus::Processed, max))
            .await;
        assert!(matches!(
            result,
            Err(ReconcileError::BalanceOverflow { user: 1, .. })
        ));

        assert_eq!(store.get(&second.number).await.unwrap().unwrap(), second);
        assert_eq!(store.balance(1).await.unwrap().current, max);
        assert_eq!(store.list_pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_unknown_order() {
        let store = InMemoryStore::new();
        let transition = OrderTransition::new(
            &order("79927398713", 1),
            OrderStatus::Processing,
            Money::ZERO,
        );
        assert!(matches!(
            store.commit(&transition).await,
            Err(ReconcileError::UnknownOrder(_))
        ));
    }

    #[tokio::test]
    async fn test_withdraw() {
        let store = InMemoryStore::new();
        let order = order("79927398713", 1);
        store.create(order.clone()).await.unwrap();
        let transition = OrderTransition::new(
            &order,
            OrderStatus::Processed,
            Money::new(dec!(100)).unwrap(),
        );
        store.commit(&transition).await.unwrap();

        let spend = OrderNumber::parse("2377225624").unwrap();
        let balance = store
            .withdraw(Withdrawal::new(spend.clone(), 1, Money::new(dec!(30)).unwrap()))
            .await
            .unwrap();
        assert_eq!(balance.current, Money::new(dec!(70)).unwrap());
        assert_eq!(balance.withdrawn, Money::new(dec!(30)).unwrap());

        let too_much = store
            .withdraw(Withdrawal::new(spend, 1, Money::new(dec!(71)).unwrap()))
            .await;
        assert!(matches!(
            too_much,
            Err(ReconcileError::InsufficientFunds { .. })
        ));

        assert_eq!(store.withdrawals(1).await.unwrap().len(), 1);
        assert!(store.withdrawals(2).await.unwrap().is_empty());
    }
}
