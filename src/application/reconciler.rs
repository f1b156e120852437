use crate::domain::accrual::{AccrualResponse, AccrualStatus};
use crate::domain::balance::Money;
use crate::domain::order::{Order, OrderNumber, OrderStatus, OrderTransition};
use crate::domain::ports::{CommitOutcome, OrderStoreHandle};
use crate::error::{ReconcileError, Result};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// What happens to orders the accrual service keeps answering 204 for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotFoundPolicy {
    /// Consecutive 204 responses after which the order is marked INVALID.
    /// `None` keeps retrying forever.
    pub limit: Option<u32>,
}

/// Effect of one reconciliation step on the stored order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Committed(OrderStatus),
    Unchanged,
    /// Another writer got there first; the order is re-read next cycle.
    Conflict,
}

/// Maps a response onto the order's state machine.
///
/// Returns `None` when there is nothing to write: the order is terminal, or
/// it is already in the target state.
pub fn plan(order: &Order, response: &AccrualResponse) -> Result<Option<OrderTransition>> {
    if response.order != order.number.as_str() {
        return Err(ReconcileError::ValidationError(format!(
            "accrual response for order {} received while polling {}",
            response.order, order.number
        )));
    }
    if order.status.is_terminal() {
        return Ok(None);
    }

    let (to, accrual) = match response.status {
        AccrualStatus::Registered | AccrualStatus::Processing => {
            (OrderStatus::Processing, Money::ZERO)
        }
        AccrualStatus::Invalid => (OrderStatus::Invalid, Money::ZERO),
        AccrualStatus::Processed => {
            let accrual = match response.accrual {
                Some(value) => Money::new(value)?,
                None => Money::ZERO,
            };
            (OrderStatus::Processed, accrual)
        }
    };

    if to == order.status {
        return Ok(None);
    }
    Ok(Some(OrderTransition::new(order, to, accrual)))
}

/// Applies accrual responses to stored orders.
///
/// The order passed in is a snapshot; it is never mutated here. Every write
/// goes through `OrderStore::commit`, conditioned on the snapshot's status,
/// so a stale snapshot cannot credit a balance twice.
pub struct Reconciler {
    orders: OrderStoreHandle,
    policy: NotFoundPolicy,
    misses: Mutex<HashMap<OrderNumber, u32>>,
}

impl Reconciler {
    pub fn new(orders: OrderStoreHandle, policy: NotFoundPolicy) -> Self {
        Self {
            orders,
            policy,
            misses: Mutex::new(HashMap::new()),
        }
    }

    pub async fn reconcile(
        &self,
        order: &Order,
        response: &AccrualResponse,
    ) -> Result<ReconcileOutcome> {
        self.misses.lock().await.remove(&order.number);
        match plan(order, response)? {
            Some(transition) => self.commit(transition).await,
            None => Ok(ReconcileOutcome::Unchanged),
        }
    }

    /// Drops 204 counters for orders that are no longer pending, e.g. ones
    /// settled by another process.
    pub async fn retain_pending(&self, pending: &[Order]) {
        let mut misses = self.misses.lock().await;
        if misses.is_empty() {
            return;
        }
        let pending: HashSet<&OrderNumber> = pending.iter().map(|order| &order.number).collect();
        misses.retain(|number, _| pending.contains(number));
    }

    /// Records a 204 for `order` and applies the not-found policy.
    pub async fn not_found(&self, order: &Order) -> Result<ReconcileOutcome> {
        let Some(limit) = self.policy.limit else {
            return Ok(ReconcileOutcome::Unchanged);
        };
        if order.status.is_terminal() {
            return Ok(ReconcileOutcome::Unchanged);
        }

        let misses = {
            let mut misses = self.misses.lock().await;
            let count = misses.entry(order.number.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if misses < limit {
            debug!(order = %order.number, misses, limit, "order unknown to accrual service");
            return Ok(ReconcileOutcome::Unchanged);
        }

        info!(order = %order.number, misses, "giving up on order unknown to accrual service");
        let transition = OrderTransition::new(order, OrderStatus::Invalid, Money::ZERO);
        let outcome = self.commit(transition).await?;
        self.misses.lock().await.remove(&order.number);
        Ok(outcome)
    }

    async fn commit(&self, transition: OrderTransition) -> Result<ReconcileOutcome> {
        match self.orders.commit(&transition).await? {
            CommitOutcome::Committed => {
                info!(
                    order = %transition.number,
                    user = transition.user,
                    from = %transition.from,
                    to = %transition.to,
                    accrual = %transition.accrual,
                    "order reconciled"
                );
                Ok(ReconcileOutcome::Committed(transition.to))
            }
            CommitOutcome::Conflict { stored } => {
                debug!(
                    order = %transition.number,
                    expected = %transition.from,
                    stored = ?stored,
                    "stale order snapshot, skipping commit"
                );
                Ok(ReconcileOutcome::Conflict)
            }
        }
    }
}
