use crate::domain::balance::{UserBalance, Withdrawal};
use crate::domain::order::{Order, OrderNumber, OrderTransition, UserId};
use crate::domain::ports::{BalanceStore, CommitOutcome, OrderStore};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, ErrorKind, IteratorMode, OptimisticTransactionDB,
    Options, Transaction,
};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for orders, keyed by order number.
pub const CF_ORDERS: &str = "orders";
/// Column Family for balances, keyed by big-endian user id.
pub const CF_BALANCES: &str = "balances";
/// Column Family for withdrawals, keyed by user id followed by order number.
pub const CF_WITHDRAWALS: &str = "withdrawals";

/// A persistent store implementation using RocksDB.
///
/// Writes go through optimistic transactions: every key a commit depends on
/// is read with `get_for_update`, so a concurrent writer touching the same
/// order or balance makes the later commit fail with `Busy` instead of
/// overwriting. That conflict surfaces as `CommitOutcome::Conflict`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<OptimisticTransactionDB>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [CF_ORDERS, CF_BALANCES, CF_WITHDRAWALS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));
        let db = OptimisticTransactionDB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            ReconcileError::InternalError(format!("Column family {name} not found"))
        })
    }

    fn scan<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let cf = self.cf(name)?;
        let mut items = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(serde_json::from_slice(&value)?);
        }
        Ok(items)
    }

    fn create_order(&self, order: &Order) -> Result<()> {
        let orders = self.cf(CF_ORDERS)?;
        let key = order.number.as_str().as_bytes();

        let txn = self.db.transaction();
        if let Some(bytes) = txn.get_for_update_cf(orders, key, true)? {
            let existing: Order = serde_json::from_slice(&bytes)?;
            return Err(ReconcileError::OrderAlreadyUploaded {
                number: order.number.to_string(),
                same_user: existing.user == order.user,
            });
        }
        txn.put_cf(orders, key, serde_json::to_vec(order)?)?;
        txn.commit()?;
        Ok(())
    }

    fn commit_transition(&self, transition: &OrderTransition) -> Result<CommitOutcome> {
        let orders = self.cf(CF_ORDERS)?;
        let balances = self.cf(CF_BALANCES)?;
        let order_key = transition.number.as_str().as_bytes();

        let txn = self.db.transaction();
        let Some(bytes) = txn.get_for_update_cf(orders, order_key, true)? else {
            return Err(ReconcileError::UnknownOrder(transition.number.to_string()));
        };
        let mut order: Order = serde_json::from_slice(&bytes)?;
        if order.status != transition.from {
            return Ok(CommitOutcome::Conflict {
                stored: Some(order.status),
            });
        }

        if let Some(credit) = transition.credit() {
            let balance_key = transition.user.to_be_bytes();
            let mut balance = match txn.get_for_update_cf(balances, balance_key, true)? {
                Some(bytes) => serde_json::from_slice(&bytes)?,
                None => UserBalance::new(transition.user),
            };
            balance.credit(credit)?;
            txn.put_cf(balances, balance_key, serde_json::to_vec(&balance)?)?;
        }

        order.apply(transition);
        txn.put_cf(orders, order_key, serde_json::to_vec(&order)?)?;
        Self::finish(txn)
    }

    /// Commits `txn`. A write to any key it read with `get_for_update` since
    /// that read makes RocksDB reject the commit; that is reported as
    /// `CommitOutcome::Conflict` and nothing is written.
    fn finish(txn: Transaction<'_, OptimisticTransactionDB>) -> Result<CommitOutcome> {
        match txn.commit() {
            Ok(()) => Ok(CommitOutcome::Committed),
            Err(e) if matches!(e.kind(), ErrorKind::Busy | ErrorKind::TryAgain) => {
                Ok(CommitOutcome::Conflict { stored: None })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn withdraw_sync(&self, withdrawal: &Withdrawal) -> Result<UserBalance> {
        let balances = self.cf(CF_BALANCES)?;
        let withdrawals = self.cf(CF_WITHDRAWALS)?;
        let balance_key = withdrawal.user.to_be_bytes();

        let txn = self.db.transaction();
        let mut balance = match txn.get_for_update_cf(balances, balance_key, true)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => UserBalance::new(withdrawal.user),
        };
        balance.withdraw(withdrawal.sum)?;

        let mut withdrawal_key = balance_key.to_vec();
        withdrawal_key.extend_from_slice(withdrawal.order.as_str().as_bytes());

        txn.put_cf(balances, balance_key, serde_json::to_vec(&balance)?)?;
        txn.put_cf(withdrawals, withdrawal_key, serde_json::to_vec(withdrawal)?)?;
        txn.commit()?;
        Ok(balance)
    }

    fn get_sync<T: DeserializeOwned>(&self, name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(name)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn create(&self, order: Order) -> Result<()> {
        self.create_order(&order)
    }

    async fn get(&self, number: &OrderNumber) -> Result<Option<Order>> {
        self.get_sync(CF_ORDERS, number.as_str().as_bytes())
    }

    async fn list_by_user(&self, user: UserId) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .scan::<Order>(CF_ORDERS)?
            .into_iter()
            .filter(|order| order.user == user)
            .collect();
        orders.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(orders)
    }

    async fn list_pending(&self) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .scan::<Order>(CF_ORDERS)?
            .into_iter()
            .filter(|order| !order.status.is_terminal())
            .collect();
        orders.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));
        Ok(orders)
    }

    async fn commit(&self, transition: &OrderTransition) -> Result<CommitOutcome> {
        self.commit_transition(transition)
    }
}

#[async_trait]
impl BalanceStore for RocksDBStore {
    async fn balance(&self, user: UserId) -> Result<UserBalance> {
        Ok(self
            .get_sync(CF_BALANCES, &user.to_be_bytes())?
            .unwrap_or_else(|| UserBalance::new(user)))
    }

    async fn all_balances(&self) -> Result<Vec<UserBalance>> {
        self.scan(CF_BALANCES)
    }

    async fn withdraw(&self, withdrawal: Withdrawal) -> Result<UserBalance> {
        self.withdraw_sync(&withdrawal)
    }

    async fn withdrawals(&self, user: UserId) -> Result<Vec<Withdrawal>> {
        let mut withdrawals: Vec<Withdrawal> = self
            .scan::<Withdrawal>(CF_WITHDRAWALS)?
            .into_iter()
            .filter(|withdrawal| withdrawal.user == user)
            .collect();
        withdrawals.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        Ok(withdrawals)
    }
}
