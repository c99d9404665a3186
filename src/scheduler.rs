use crate::coordinator::{Coordinator, Refresh};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Drives `Coordinator::refresh` every `interval`. Each refresh runs on its own task, so a slow
/// fetch never holds back the timer; a tick landing on a running refresh is skipped by the
/// coordinator.
pub struct Scheduler {
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Start ticking. The first tick comes one `interval` from now, setup already fetched once.
    pub fn start(coordinator: Arc<Coordinator>, interval: Duration) -> Scheduler {
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    match coordinator.refresh().await {
                        Ok(Refresh::Updated) => log::debug!("{}: refreshed", coordinator.name()),
                        Ok(Refresh::Skipped) => {}
                        Err(e) => log::debug!(
                            "{}: {}, next attempt in {:?}",
                            coordinator.name(),
                            e,
                            interval
                        ),
                    }
                });
            }
        });

        Scheduler { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
