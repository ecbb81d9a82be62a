// ── Reconnect scheduler ──
//
// Holds at most one pending restart. Losses reported while one is
// pending are absorbed. Failed restarts back off exponentially until a
// successful session clears the schedule, or a configuration error
// stops it. A separate periodic timer forces a full refresh.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;

/// Restartable unit of work, invoked by background tasks.
pub type Job = Arc<dyn Fn() -> BoxFuture<'static, Result<(), CoreError>> + Send + Sync>;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first restart attempt. Default: 5s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 5min.
    pub max_delay: Duration,

    /// Maximum restart attempts per loss before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            max_retries: None,
        }
    }
}

/// Exponential backoff with deterministic ±25% jitter, capped at `max_delay`.
pub fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Seeded from the attempt number so consecutive delays spread out.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── ReconnectScheduler ───────────────────────────────────────────────

struct Pending {
    id: u64,
    cancel: CancellationToken,
}

struct Shared {
    config: ReconnectConfig,
    restart: Job,
    pending: Mutex<Option<Pending>>,
    attempt: AtomicU32,
    next_id: AtomicU64,
}

impl Shared {
    fn release(&self, id: u64) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.as_ref().is_some_and(|p| p.id == id) {
            *pending = None;
        }
    }
}

pub struct ReconnectScheduler {
    shared: Arc<Shared>,
    refresh: Mutex<Option<CancellationToken>>,
    cancel: CancellationToken,
}

impl ReconnectScheduler {
    pub fn new(config: ReconnectConfig, restart: Job, cancel: CancellationToken) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                restart,
                pending: Mutex::new(None),
                attempt: AtomicU32::new(0),
                next_id: AtomicU64::new(0),
            }),
            refresh: Mutex::new(None),
            cancel,
        }
    }

    /// Schedule a restart after the current backoff delay.
    ///
    /// Returns `false` when one is already pending.
    pub fn schedule(&self, reason: &str) -> bool {
        let mut pending = self
            .shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if pending.is_some() {
            debug!(reason, "Restart already pending");
            return false;
        }
        if self.cancel.is_cancelled() {
            return false;
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.cancel.child_token();
        *pending = Some(Pending {
            id,
            cancel: cancel.clone(),
        });
        drop(pending);

        info!(reason, "Scheduling controller restart");
        tokio::spawn(restart_loop(Arc::clone(&self.shared), id, cancel));
        true
    }

    /// Drop any pending restart and reset the backoff.
    pub fn clear(&self) {
        let pending = self
            .shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(p) = pending {
            debug!("Pending restart cleared");
            p.cancel.cancel();
        }
        self.shared.attempt.store(0, Ordering::Relaxed);
    }

    pub fn is_pending(&self) -> bool {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Replace the periodic full-refresh timer. `None` disables it.
    pub fn set_refresh_interval(&self, interval: Option<Duration>) {
        let mut refresh = self.refresh.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = refresh.take() {
            previous.cancel();
        }
        let Some(period) = interval.filter(|d| !d.is_zero()) else {
            return;
        };

        let cancel = self.cancel.child_token();
        *refresh = Some(cancel.clone());
        let restart = Arc::clone(&self.shared.restart);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        info!(period_secs = period.as_secs(), "Periodic refresh");
                        if let Err(e) = restart().await {
                            warn!(error = %e, "Periodic refresh failed");
                        }
                    }
                }
            }
        });
    }

    /// Cancel the pending restart and the refresh timer for good.
    pub fn shutdown(&self) {
        self.clear();
        self.set_refresh_interval(None);
        self.cancel.cancel();
    }
}

async fn restart_loop(shared: Arc<Shared>, id: u64, cancel: CancellationToken) {
    loop {
        let attempt = shared.attempt.load(Ordering::Relaxed);
        if let Some(max) = shared.config.max_retries {
            if attempt >= max {
                warn!(max_retries = max, "Restart limit reached, giving up");
                break;
            }
        }

        let delay = calculate_backoff(attempt, &shared.config);
        debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "Waiting before restart"
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        match (shared.restart)().await {
            Ok(()) => break,
            Err(e) if e.is_configuration() => {
                warn!(error = %e, "Restart needs a configuration change, not retrying");
                break;
            }
            Err(e) => {
                warn!(error = %e, attempt, "Restart failed");
                shared.attempt.fetch_add(1, Ordering::Relaxed);
                if cancel.is_cancelled() {
                    break;
                }
            }
        }
    }
    shared.release(id);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(results: Vec<Result<(), CoreError>>) -> (Job, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(Mutex::new(results.into_iter()));
        let counter = Arc::clone(&calls);
        let job: Job = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let next = results.lock().unwrap().next().unwrap_or(Ok(()));
            Box::pin(async move { next })
        });
        (job, calls)
    }

    fn config() -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let cfg = config();
        let first = calculate_backoff(0, &cfg);
        let third = calculate_backoff(3, &cfg);
        assert!(first <= Duration::from_millis(1250));
        assert!(third > first);
        assert!(calculate_backoff(20, &cfg) <= Duration::from_millis(37_500));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_losses_schedule_one_restart() {
        let (job, calls) = counting(vec![]);
        let scheduler = ReconnectScheduler::new(config(), job, CancellationToken::new());

        assert!(scheduler.schedule("connection lost"));
        assert!(!scheduler.schedule("connection lost again"));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_pending_restart() {
        let (job, calls) = counting(vec![]);
        let scheduler = ReconnectScheduler::new(config(), job, CancellationToken::new());

        scheduler.schedule("connection lost");
        scheduler.clear();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(scheduler.schedule("lost again"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_restart_backs_off_and_retries() {
        let (job, calls) = counting(vec![Err(CoreError::ControllerDisconnected), Ok(())]);
        let scheduler = ReconnectScheduler::new(config(), job, CancellationToken::new());

        scheduler.schedule("connection lost");
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn configuration_error_stops_retrying() {
        let (job, calls) = counting(vec![Err(CoreError::Configuration {
            reason: "token expired".into(),
        })]);
        let scheduler = ReconnectScheduler::new(config(), job, CancellationToken::new());

        scheduler.schedule("connection lost");
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_timer_is_recreated() {
        let (job, calls) = counting(vec![]);
        let scheduler = ReconnectScheduler::new(config(), job, CancellationToken::new());

        scheduler.set_refresh_interval(Some(Duration::from_secs(60)));
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        scheduler.set_refresh_interval(Some(Duration::from_secs(600)));
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        scheduler.shutdown();
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
