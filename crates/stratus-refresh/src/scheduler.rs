//! Periodic refresh triggers.
//!
//! One recurring schedule at a time: arming again replaces the running one.
//! Every fire is written back to the `ScheduleStore`, so the next process can
//! pick the cadence up where this one left off.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::coordinator::TriggerSource;
use crate::schedule_store::{ScheduleRecord, ScheduleStore};

/// Shortest accepted interval; shorter ones are raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

struct ActiveSchedule {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct RefreshScheduler {
    store: Arc<dyn ScheduleStore>,
    trigger_tx: mpsc::UnboundedSender<TriggerSource>,
    runtime: Handle,
    // Also held by schedule tasks while they persist, so a replaced schedule
    // can never write after its successor
    active: Arc<Mutex<Option<ActiveSchedule>>>,
}

impl RefreshScheduler {
    /// Fires are delivered as `TriggerSource::Periodic` on `trigger_tx`.
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        trigger_tx: mpsc::UnboundedSender<TriggerSource>,
        runtime: Handle,
    ) -> Self {
        Self {
            store,
            trigger_tx,
            runtime,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Fire every `interval`, first after `first_fire_offset`. Replaces any
    /// schedule that is already running.
    pub fn arm(&self, interval: Duration, first_fire_offset: Duration) {
        let interval = clamp_interval(interval);
        let first_fire_at = Utc::now() + to_chrono(first_fire_offset);

        self.start_delivery(
            interval,
            first_fire_offset,
            Some(ScheduleRecord::new(interval, first_fire_at)),
        );
        tracing::info!(
            "Refresh scheduled every {}s, first in {}s",
            interval.as_secs(),
            first_fire_offset.as_secs()
        );
    }

    /// Startup re-arm: continue a saved cadence with the same interval, or arm
    /// a fresh one. A saved fire time already in the past fires immediately,
    /// once. Returns whether a saved schedule was resumed.
    pub fn resume_or_arm(&self, interval: Duration, first_fire_offset: Duration) -> bool {
        let interval = clamp_interval(interval);
        match self.store.load() {
            Ok(Some(record)) if record.interval() == interval => {
                let delay = record.delay_from(Utc::now());
                self.start_delivery(interval, delay, None);
                tracing::info!(
                    "Resumed refresh schedule every {}s, next in {}s",
                    interval.as_secs(),
                    delay.as_secs()
                );
                true
            }
            Ok(Some(record)) => {
                tracing::info!(
                    "Refresh interval changed from {}s to {}s, re-arming",
                    record.interval_secs,
                    interval.as_secs()
                );
                self.arm(interval, first_fire_offset);
                false
            }
            Ok(None) => {
                self.arm(interval, first_fire_offset);
                false
            }
            Err(e) => {
                tracing::warn!("Ignoring unreadable refresh schedule: {}", e);
                self.arm(interval, first_fire_offset);
                false
            }
        }
    }

    /// Stop delivering triggers. The saved cadence is kept for the next
    /// session's `resume_or_arm`.
    pub fn disarm(&self) {
        match self.active.lock().take() {
            Some(active) => {
                active.cancel.cancel();
                tracing::info!("Refresh schedule disarmed");
            }
            None => tracing::debug!("Refresh schedule already disarmed"),
        }
    }

    pub fn is_armed(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Replace the running schedule. `record` is saved once the previous
    /// schedule is cancelled.
    fn start_delivery(
        &self,
        interval: Duration,
        first_delay: Duration,
        record: Option<ScheduleRecord>,
    ) {
        let mut active = self.active.lock();
        if let Some(previous) = active.take() {
            previous.cancel.cancel();
            tracing::debug!("Replacing existing refresh schedule");
        }
        if let Some(record) = record {
            persist(&*self.store, &record);
        }

        let cancel = CancellationToken::new();
        let handle = self.runtime.spawn(run_schedule(
            interval,
            first_delay,
            self.trigger_tx.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.active),
            cancel.clone(),
        ));
        *active = Some(ActiveSchedule { cancel, handle });
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(active) = self.active.lock().take() {
            active.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("armed", &self.is_armed())
            .finish()
    }
}

async fn run_schedule(
    interval: Duration,
    first_delay: Duration,
    trigger_tx: mpsc::UnboundedSender<TriggerSource>,
    store: Arc<dyn ScheduleStore>,
    active: Arc<Mutex<Option<ActiveSchedule>>>,
    cancel: CancellationToken,
) {
    let mut deadline = Instant::now() + first_delay;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => {}
        }

        if trigger_tx.send(TriggerSource::Periodic).is_err() {
            tracing::debug!("Trigger receiver dropped, stopping refresh schedule");
            break;
        }

        // After a long stall, skip the missed ticks instead of replaying them
        let now = Instant::now();
        deadline += interval;
        if deadline <= now {
            deadline = now + interval;
        }

        let next_fire_at = Utc::now() + to_chrono(deadline - now);
        {
            let _active = active.lock();
            if cancel.is_cancelled() {
                break;
            }
            persist(&*store, &ScheduleRecord::new(interval, next_fire_at));
        }
    }
}

fn persist(store: &dyn ScheduleStore, record: &ScheduleRecord) {
    if let Err(e) = store.save(record) {
        tracing::warn!("Failed to save refresh schedule: {}", e);
    }
}

fn clamp_interval(interval: Duration) -> Duration {
    if interval < MIN_INTERVAL {
        tracing::warn!(
            "Refresh interval {:?} is too short, using {:?}",
            interval,
            MIN_INTERVAL
        );
        MIN_INTERVAL
    } else {
        interval
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}
