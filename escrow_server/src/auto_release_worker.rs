use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use escrow_engine::{PaymentReleaseApi, ReleaseError, SqliteDatabase, SweepResult};
use log::*;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

struct SweepTask {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Runs the auto-release sweep on a fixed interval.
///
/// The scheduler is either idle or running. [`Self::start`] is a no-op while running, and [`Self::stop`] cancels the
/// timer. The first sweep runs as soon as the scheduler starts. Sweeps never overlap with themselves, but may overlap
/// with [`Self::trigger_now`] or an admin release; the release engine's claims keep those safe.
///
/// A sweep that has started always runs to the end. Stopping only prevents the next one, so a transfer the provider
/// has accepted is always recorded.
pub struct AutoReleaseScheduler {
    api: PaymentReleaseApi<SqliteDatabase>,
    interval: Duration,
    task: Mutex<Option<SweepTask>>,
}

impl AutoReleaseScheduler {
    pub fn new(api: PaymentReleaseApi<SqliteDatabase>, interval: Duration) -> Self {
        Self { api, interval, task: Mutex::new(None) }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts the periodic sweep. Returns `false` if the scheduler was already running. Must be called from within a
    /// tokio runtime.
    pub fn start(&self) -> bool {
        let mut task = self.task();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            debug!("🕰️ Auto-release scheduler is already running");
            return false;
        }
        let api = self.api.clone();
        let period = self.interval;
        let (shutdown, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("🕰️ Auto-release scheduler started. Sweeping every {}s", period.as_secs());
            loop {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = timer.tick() => run_sweep(&api).await,
                }
            }
            debug!("🕰️ Auto-release loop has exited");
        });
        *task = Some(SweepTask { handle, shutdown });
        true
    }

    /// Cancels the timer and returns immediately. A sweep that is already under way finishes in the background; use
    /// [`Self::shutdown`] to wait for it.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let task = self.task().take()?;
        // The loop may already have exited, in which case there is nobody left to tell
        let _ = task.shutdown.send(true);
        info!("🕰️ Auto-release scheduler stopped");
        Some(task.handle)
    }

    /// Stops the scheduler and waits for any sweep in progress to complete.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.stop() {
            if let Err(e) = handle.await {
                error!("🕰️ Auto-release loop did not exit cleanly. {e}");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task().as_ref().is_some_and(|t| !t.handle.is_finished())
    }

    /// Runs one sweep right now and waits for it to finish.
    pub async fn trigger_now(&self) -> Result<SweepResult, ReleaseError> {
        info!("🕰️ Auto-release sweep triggered manually");
        self.api.run_auto_release_sweep().await
    }

    fn task(&self) -> MutexGuard<'_, Option<SweepTask>> {
        // The guarded value is just a handle, so a poisoned lock is still usable
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for AutoReleaseScheduler {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

async fn run_sweep(api: &PaymentReleaseApi<SqliteDatabase>) {
    info!("🕰️ Running auto-release sweep");
    match api.run_auto_release_sweep().await {
        Ok(result) => {
            debug!("🕰️ {} delivered orders are not yet due for release", result.not_yet_due());
            for failure in &result.failed {
                warn!("🕰️ Order {} could not be released: {}", failure.order_id, failure.reason);
            }
        },
        Err(e) => {
            error!("🕰️ Error running auto-release sweep: {e}");
        },
    }
}
