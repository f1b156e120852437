use crate::accrual::backoff::Backoff;
use crate::accrual::client::{AccrualApi, AccrualOutcome};
use crate::application::reconciler::{ReconcileOutcome, Reconciler};
use crate::domain::order::Order;
use crate::domain::ports::OrderStoreHandle;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of independent polling workers.
    pub workers: usize,
    /// Tick interval of each worker.
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            interval: Duration::from_secs(1),
        }
    }
}

/// Per-cycle counters, mostly for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub pending: usize,
    pub committed: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub not_found: usize,
    pub rate_limited: usize,
    pub failed: usize,
}

impl CycleReport {
    fn record(&mut self, result: OrderResult) {
        match result {
            OrderResult::Reconciled(ReconcileOutcome::Committed(_)) => self.committed += 1,
            OrderResult::Reconciled(ReconcileOutcome::Unchanged) => self.unchanged += 1,
            OrderResult::Reconciled(ReconcileOutcome::Conflict) => self.conflicts += 1,
            OrderResult::NotFound => self.not_found += 1,
            OrderResult::RateLimited => self.rate_limited += 1,
            OrderResult::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum OrderResult {
    Reconciled(ReconcileOutcome),
    NotFound,
    RateLimited,
    Failed,
}

struct Poller {
    orders: OrderStoreHandle,
    accrual: Arc<dyn AccrualApi>,
    backoff: Arc<Backoff>,
    reconciler: Arc<Reconciler>,
}

impl Poller {
    async fn run_cycle(&self, shutdown: &mut watch::Receiver<bool>) -> CycleReport {
        let mut report = CycleReport::default();
        let pending = match self.orders.list_pending().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "failed to list pending orders");
                report.failed += 1;
                return report;
            }
        };
        report.pending = pending.len();
        self.reconciler.retain_pending(&pending).await;

        for order in &pending {
            match until_shutdown(shutdown, self.process_order(order)).await {
                Some(result) => report.record(result),
                None => {
                    debug!("shutdown requested, abandoning cycle");
                    break;
                }
            }
        }
        report
    }

    async fn process_order(&self, order: &Order) -> OrderResult {
        self.backoff.wait_while_paused().await;

        match self.accrual.fetch(&order.number).await {
            AccrualOutcome::Success(response) => {
                match self.reconciler.reconcile(order, &response).await {
                    Ok(outcome) => OrderResult::Reconciled(outcome),
                    Err(e) => {
                        warn!(order = %order.number, error = %e, "failed to reconcile order");
                        OrderResult::Failed
                    }
                }
            }
            AccrualOutcome::NotFound => match self.reconciler.not_found(order).await {
                Ok(ReconcileOutcome::Unchanged) => OrderResult::NotFound,
                Ok(outcome) => OrderResult::Reconciled(outcome),
                Err(e) => {
                    warn!(order = %order.number, error = %e, "failed to apply not-found policy");
                    OrderResult::Failed
                }
            },
            AccrualOutcome::RateLimited(retry_after) => {
                self.backoff.pause(retry_after).await;
                OrderResult::RateLimited
            }
            AccrualOutcome::TransientFailure(e) => {
                warn!(order = %order.number, error = %e, "error fetching order from accrual service");
                OrderResult::Failed
            }
        }
    }
}

/// Runs `fut` unless shutdown is (or becomes) requested, in which case the
/// future is dropped and `None` returned.
async fn until_shutdown<F: Future>(
    shutdown: &mut watch::Receiver<bool>,
    fut: F,
) -> Option<F::Output> {
    if *shutdown.borrow() {
        return None;
    }
    tokio::select! {
        biased;
        _ = shutdown.wait_for(|stop| *stop) => None,
        output = fut => Some(output),
    }
}

/// A fixed pool of periodic workers reconciling pending orders.
pub struct Scheduler {
    config: SchedulerConfig,
    poller: Arc<Poller>,
    shutdown: watch::Sender<bool>,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        orders: OrderStoreHandle,
        accrual: Arc<dyn AccrualApi>,
        backoff: Arc<Backoff>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            poller: Arc::new(Poller {
                orders,
                accrual,
                backoff,
                reconciler,
            }),
            shutdown,
        }
    }

    /// Runs a single reconciliation pass over all pending orders.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut shutdown = self.shutdown.subscribe();
        self.poller.run_cycle(&mut shutdown).await
    }

    /// Starts the workers. They tick until `SchedulerHandle::shutdown`.
    pub fn spawn(self) -> SchedulerHandle {
        let mut workers = JoinSet::new();
        for id in 0..self.config.workers.max(1) {
            let poller = Arc::clone(&self.poller);
            let shutdown = self.shutdown.subscribe();
            workers.spawn(run_worker(id, poller, self.config.interval, shutdown));
        }
        info!(
            workers = workers.len(),
            interval = ?self.config.interval,
            "accrual scheduler started"
        );
        SchedulerHandle {
            shutdown: self.shutdown,
            workers,
        }
    }
}

async fn run_worker(
    id: usize,
    poller: Arc<Poller>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    // `interval` panics on a zero period.
    let mut ticker = time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while until_shutdown(&mut shutdown, ticker.tick()).await.is_some() {
        let report = poller.run_cycle(&mut shutdown).await;
        if report.pending > 0 {
            debug!(worker = id, ?report, "accrual cycle finished");
        }
    }
    debug!(worker = id, "accrual worker stopped");
}

pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    workers: JoinSet<()>,
}

impl SchedulerHandle {
    /// Signals every worker to stop and waits up to `grace` for them;
    /// stragglers are aborted. Returns `true` if all workers stopped in time.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        self.shutdown.send_replace(true);

        let drained = time::timeout(grace, async {
            while let Some(joined) = self.workers.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "accrual worker ended abnormally");
                }
            }
        })
        .await;

        match drained {
            Ok(()) => {
                info!("accrual scheduler stopped");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.workers.len(),
                    "accrual workers did not stop in time, aborting"
                );
                self.workers.abort_all();
                false
            }
        }
    }
}
