//! Cancellable interval runner shared by the background jobs.

use std::time::Duration;

use async_trait::async_trait;
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, warn};

/// Work performed on every tick of a [`PeriodicTask`].
#[async_trait]
pub trait PeriodicJob: Send + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    async fn tick(&mut self);
}

/// Handle to a spawned job. Dropping it stops the loop at its next wait point.
pub struct PeriodicTask {
    name: &'static str,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Run `job` now and then every `period`. Late ticks are delayed, never bursted.
    pub fn spawn<J: PeriodicJob>(mut job: J, period: Duration) -> Self {
        let name = job.name();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => job.tick().await,
                }
            }
            debug!(target = "beacon_cache_proxy::jobs", job = name, "periodic job stopped");
        });

        Self {
            name,
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Signal the loop to stop and wait for an in-flight tick to finish.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take()
            && let Err(err) = handle.await
        {
            warn!(
                target = "beacon_cache_proxy::jobs",
                job = self.name,
                error = %err,
                "periodic job ended abnormally"
            );
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}
