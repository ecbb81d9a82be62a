// ── Live meter readings ──
//
// The controller streams instantaneous power for about 30 s after each
// `ReportInstantUsage=True`. While any caller holds a subscription the
// command is re-issued on a fixed period; the last holder to leave
// cancels the timer and the caller sends a single stop.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::DeviceId;
use crate::scheduler::Job;

struct Subscription {
    holders: usize,
    cancel: CancellationToken,
}

pub(crate) struct LiveReadings {
    subscriptions: DashMap<DeviceId, Subscription>,
    period: Duration,
}

impl LiveReadings {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            subscriptions: DashMap::new(),
            period,
        }
    }

    /// Add a holder. The first holder spawns the re-subscribe timer, which
    /// fires `subscribe` immediately and then once per period.
    ///
    /// Returns `true` when this call started the timer.
    pub(crate) fn start(&self, id: &DeviceId, subscribe: Job) -> bool {
        match self.subscriptions.entry(id.clone()) {
            Entry::Occupied(mut existing) => {
                existing.get_mut().holders += 1;
                debug!(device = %id, holders = existing.get().holders, "Live readings already active");
                false
            }
            Entry::Vacant(slot) => {
                let cancel = CancellationToken::new();
                slot.insert(Subscription {
                    holders: 1,
                    cancel: cancel.clone(),
                });
                tokio::spawn(resubscribe_loop(id.clone(), self.period, subscribe, cancel));
                true
            }
        }
    }

    /// Drop a holder. Returns `true` when it was the last one, in which
    /// case the timer is already cancelled and the caller sends the stop.
    pub(crate) fn stop(&self, id: &DeviceId) -> bool {
        let Entry::Occupied(mut existing) = self.subscriptions.entry(id.clone()) else {
            return false;
        };
        let sub = existing.get_mut();
        sub.holders = sub.holders.saturating_sub(1);
        if sub.holders > 0 {
            return false;
        }
        let (_, sub) = existing.remove_entry();
        sub.cancel.cancel();
        true
    }

    /// Drop every holder of `id` without sending a stop. Used when the
    /// device itself went away.
    pub(crate) fn cancel(&self, id: &DeviceId) -> bool {
        match self.subscriptions.remove(id) {
            Some((_, sub)) => {
                sub.cancel.cancel();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    fn is_active(&self, id: &DeviceId) -> bool {
        self.subscriptions.contains_key(id)
    }

    /// Cancel every timer without sending anything.
    pub(crate) fn cancel_all(&self) {
        self.subscriptions.retain(|_, sub| {
            sub.cancel.cancel();
            false
        });
    }
}

async fn resubscribe_loop(id: DeviceId, period: Duration, subscribe: Job, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = subscribe().await {
                    warn!(device = %id, error = %e, "Live readings subscribe failed");
                }
            }
        }
    }
    debug!(device = %id, "Live readings timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Job, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let job: Job = Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        });
        (job, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn resubscribes_each_period_while_held() {
        let live = LiveReadings::new(Duration::from_secs(25));
        let (job, calls) = counter();
        let id = DeviceId::new("meter");

        assert!(live.start(&id, job));
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(live.stop(&id));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!live.is_active(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn last_holder_stops() {
        let live = LiveReadings::new(Duration::from_secs(25));
        let (job, calls) = counter();
        let id = DeviceId::new("meter");

        assert!(live.start(&id, Arc::clone(&job)));
        assert!(!live.start(&id, job));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(!live.stop(&id));
        assert!(live.is_active(&id));
        assert!(live.stop(&id));
        assert!(!live.stop(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_stops_timers() {
        let live = LiveReadings::new(Duration::from_secs(25));
        let (job, calls) = counter();
        live.start(&DeviceId::new("a"), Arc::clone(&job));
        live.start(&DeviceId::new("b"), job);
        tokio::time::sleep(Duration::from_secs(1)).await;

        live.cancel_all();
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!live.is_active(&DeviceId::new("a")));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_drops_all_holders() {
        let live = LiveReadings::new(Duration::from_secs(25));
        let (job, calls) = counter();
        let id = DeviceId::new("meter");
        live.start(&id, Arc::clone(&job));
        live.start(&id, job);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(live.cancel(&id));
        assert!(!live.cancel(&id));
        assert!(!live.stop(&id));
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
