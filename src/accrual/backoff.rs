use tokio::sync::{Mutex, Notify};
use tokio::time::{self, Duration, Instant};
use tracing::{debug, info, warn};

/// Upper bound on a single pause, whatever the accrual service asks for.
pub const MAX_PAUSE: Duration = Duration::from_secs(60 * 60);

/// Process-wide pause shared by every poller.
///
/// The accrual service enforces one global rate limit, so a 429 seen by any
/// worker halts all outbound polling. The pause deadline sits behind a single
/// exclusive lock used for both reads and writes; waiters are released by a
/// `Notify` broadcast, or by the deadline itself if the pausing task went away.
#[derive(Debug, Default)]
pub struct Backoff {
    paused_until: Mutex<Option<Instant>>,
    resumed: Notify,
}

impl Backoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_paused(&self) -> bool {
        self.deadline().await.is_some()
    }

    /// Pauses all polling for `duration` and blocks the caller until the
    /// pause lifts. A pause already in flight is extended if this one ends
    /// later; otherwise the caller just waits for it. `duration` is capped at
    /// `MAX_PAUSE`.
    pub async fn pause(&self, duration: Duration) {
        let duration = duration.min(MAX_PAUSE);
        let now = Instant::now();
        let deadline = now.checked_add(duration).unwrap_or(now);
        let extended = {
            let mut paused_until = self.paused_until.lock().await;
            match *paused_until {
                Some(until) if until >= deadline => false,
                _ => {
                    *paused_until = Some(deadline);
                    true
                }
            }
        };

        if extended {
            warn!(seconds = duration.as_secs(), "rate limited, pausing accrual polling");
        } else {
            debug!("rate limited during an active pause, waiting for it");
        }

        self.wait_while_paused().await;
        self.resumed.notify_waiters();
        if extended {
            info!("accrual polling resumed");
        }
    }

    /// Returns once no pause is active.
    pub async fn wait_while_paused(&self) {
        loop {
            let resumed = self.resumed.notified();
            tokio::pin!(resumed);
            resumed.as_mut().enable();

            let Some(until) = self.deadline().await else {
                return;
            };
            tokio::select! {
                _ = &mut resumed => {}
                _ = time::sleep_until(until) => {}
            }
        }
    }

    /// The active deadline, clearing it once it has passed.
    async fn deadline(&self) -> Option<Instant> {
        let mut paused_until = self.paused_until.lock().await;
        match *paused_until {
            Some(until) if until > Instant::now() => Some(until),
            Some(_) => {
                *paused_until = None;
                None
            }
            None => None,
        }
    }
}
