//! Background worker for buffered mode: periodically merges the latest local
//! snapshot into the canonical document.

use crate::core::{PartialDocument, Result, StoreError};
use crate::facade::{DocumentStore, SaveOutcome};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{Instrument, Level, event, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSchedule {
    pub enabled: bool,
    period: Duration,
}

impl SyncSchedule {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            period: Duration::from_secs(60),
        }
    }

    /// Interval in whole minutes, clamped to at least one.
    pub fn from_minutes(enabled: bool, minutes: u32) -> Self {
        Self {
            enabled,
            period: Duration::from_secs(u64::from(minutes.max(1)) * 60),
        }
    }

    pub fn every(period: Duration) -> Self {
        Self {
            enabled: true,
            period: period.max(Duration::from_millis(1)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub ticks: u64,
    pub skipped: u64,
    pub warnings: u64,
    pub errors: u64,
}

#[derive(Debug, Default)]
struct SyncCounters {
    ticks: AtomicU64,
    skipped: AtomicU64,
    warnings: AtomicU64,
    errors: AtomicU64,
}

impl SyncCounters {
    fn snapshot(&self) -> SyncStats {
        SyncStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Handle to the running sync timer. Dropping it stops the worker.
pub struct BufferedSyncWorker {
    schedule_tx: watch::Sender<SyncSchedule>,
    counters: Arc<SyncCounters>,
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl BufferedSyncWorker {
    /// Applies a new schedule. The timer is re-armed only when the schedule
    /// actually differs from the running one.
    pub fn reconfigure(&self, schedule: SyncSchedule) -> bool {
        self.schedule_tx.send_if_modified(|current| {
            if *current == schedule {
                false
            } else {
                *current = schedule;
                true
            }
        })
    }

    pub fn schedule(&self) -> SyncSchedule {
        *self.schedule_tx.borrow()
    }

    pub fn stats(&self) -> SyncStats {
        self.counters.snapshot()
    }

    /// Signals the worker to stop and waits for it to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle
                .await
                .map_err(|err| StoreError::Io(format!("sync worker join: {}", err)))?;
        }
        Ok(())
    }
}

impl Drop for BufferedSyncWorker {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Spawns the periodic sync worker.
///
/// `state` carries the latest persistable snapshot; the worker only reads it
/// when a tick fires, so state updates never affect the timer.
pub fn spawn_buffered_sync(
    store: Arc<DocumentStore>,
    state: watch::Receiver<Option<PartialDocument>>,
    schedule: SyncSchedule,
) -> BufferedSyncWorker {
    let (schedule_tx, mut schedule_rx) = watch::channel(schedule);
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let counters = Arc::new(SyncCounters::default());
    let worker_counters = counters.clone();

    let join_handle = tokio::spawn(async move {
        'worker: loop {
            let current = *schedule_rx.borrow_and_update();
            if !current.enabled {
                tokio::select! {
                    _ = &mut stop_rx => break 'worker,
                    changed = schedule_rx.changed() => {
                        if changed.is_err() {
                            break 'worker;
                        }
                        continue 'worker;
                    }
                }
            }

            let period = current.period();
            event!(Level::DEBUG, period_ms = period.as_millis() as u64, "sync timer armed");
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break 'worker,
                    changed = schedule_rx.changed() => {
                        if changed.is_err() {
                            break 'worker;
                        }
                        continue 'worker;
                    }
                    _ = ticker.tick() => {
                        run_tick(&store, &state, &worker_counters)
                            .instrument(info_span!("sync.tick"))
                            .await;
                    }
                }
            }
        }
    });

    BufferedSyncWorker {
        schedule_tx,
        counters,
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}

async fn run_tick(
    store: &DocumentStore,
    state: &watch::Receiver<Option<PartialDocument>>,
    counters: &SyncCounters,
) {
    let snapshot = state.borrow().clone();
    let Some(local) = snapshot.filter(|local| !local.is_empty()) else {
        counters.skipped.fetch_add(1, Ordering::Relaxed);
        return;
    };

    counters.ticks.fetch_add(1, Ordering::Relaxed);
    match store.sync(local).await {
        Ok(SaveOutcome::SavedWithWarning { warning, .. }) => {
            counters.warnings.fetch_add(1, Ordering::Relaxed);
            event!(Level::WARN, %warning, "sync completed with warning");
        }
        Ok(_) => event!(Level::DEBUG, "sync completed"),
        Err(err) => {
            counters.errors.fetch_add(1, Ordering::Relaxed);
            event!(Level::ERROR, error = %err, "periodic sync failed");
        }
    }
}
