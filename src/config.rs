use crate::application::reconciler::NotFoundPolicy;
use crate::application::scheduler::SchedulerConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Reconciles uploaded loyalty orders against the accrual service and
/// credits user balances.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Orders CSV (`user,number`) to register before polling starts
    pub orders: Option<PathBuf>,

    /// Base address of the accrual service
    #[arg(short = 'r', long, env = "ACCRUAL_SYSTEM_ADDRESS", default_value = "http://localhost:8080")]
    pub accrual_address: String,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(short = 'd', long, env = "DATABASE_URI")]
    pub db_path: Option<PathBuf>,

    /// Number of polling workers
    #[arg(long, env = "ACCRUAL_SYSTEM_WORKERS", default_value_t = 3,
          value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: u16,

    /// Seconds between polling ticks of each worker
    #[arg(long, env = "ACCRUAL_SYSTEM_INTERVAL", default_value_t = 1,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Timeout in seconds for a single accrual request
    #[arg(long, default_value_t = 10)]
    pub request_timeout: u64,

    /// Pause in seconds after a 429 without a usable Retry-After header
    #[arg(long, default_value_t = 60)]
    pub default_retry_after: u64,

    /// Longest pause in seconds honored from a Retry-After header
    #[arg(long, default_value_t = 300,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub max_retry_after: u64,

    /// Mark an order INVALID after this many consecutive 204 responses
    #[arg(long)]
    pub not_found_limit: Option<u32>,

    /// Seconds to wait for workers to stop on shutdown
    #[arg(long, default_value_t = 10)]
    pub shutdown_grace: u64,

    /// Run a single reconciliation cycle and exit
    #[arg(long)]
    pub once: bool,
}

impl Config {
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            workers: usize::from(self.workers),
            interval: Duration::from_secs(self.interval),
        }
    }

    pub fn not_found_policy(&self) -> NotFoundPolicy {
        NotFoundPolicy {
            limit: self.not_found_limit,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_secs(self.default_retry_after)
    }

    pub fn max_retry_after(&self) -> Duration {
        Duration::from_secs(self.max_retry_after)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }
}
