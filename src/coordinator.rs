//! Scheduled refresh of the virtual battery and fan-out to subscribers.

use crate::api::Error;
use crate::model::BatteryRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

/// Source of battery records, usually the provider API.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self) -> Result<BatteryRecord, Error>;
}

/// Outcome of one completed refresh, as seen by subscribers.
#[derive(Debug, Clone)]
pub enum Update {
    Fetched(Arc<BatteryRecord>),
    Failed(Error),
}

pub trait Subscriber: Send + Sync {
    fn handle_update(&self, update: &Update);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Updated,
    /// Another refresh was still running
    Skipped,
}

#[derive(Default)]
struct Status {
    record: Option<Arc<BatteryRecord>>,
    last_update_success: bool,
    last_success_at: Option<DateTime<Utc>>,
    successes: u64,
    failures: u64,
}

/// Set while a refresh runs. The task doing the work owns it, so the flag stays set until that
/// task ends, even when whoever triggered the refresh stops waiting for it.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<InFlight> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag.clone()))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// State the refresh task works on.
struct Shared {
    name: String,
    fetcher: Arc<dyn Fetch>,
    timeout: Duration,
    status: RwLock<Status>,
    subscribers: Mutex<Vec<(SubscriptionId, Arc<dyn Subscriber>)>>,
}

impl Shared {
    fn status(&self) -> std::sync::RwLockReadGuard<'_, Status> {
        self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, update: &Update) {
        let subscribers: Vec<Arc<dyn Subscriber>> = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, subscriber)| subscriber.clone())
            .collect();

        for subscriber in subscribers {
            subscriber.handle_update(update);
        }
    }

    /// Fetch bounded by `timeout`, then publish the outcome. A fetch that does not answer in
    /// time is dropped.
    async fn run(&self) -> Result<(), Error> {
        log::debug!("{}: refreshing", self.name);

        let fetched = match tokio::time::timeout(self.timeout, self.fetcher.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.timeout)),
        };

        match fetched {
            Ok(record) => {
                let record = Arc::new(record);
                {
                    let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
                    status.record = Some(record.clone());
                    status.last_update_success = true;
                    status.last_success_at = Some(Utc::now());
                    status.successes += 1;
                }
                log::debug!("{}: fetched {:?}", self.name, record);
                self.notify(&Update::Fetched(record));
                Ok(())
            }
            Err(e) => {
                {
                    let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
                    status.last_update_success = false;
                    status.failures += 1;
                }
                log::error!("{}: error fetching data: {}", self.name, e);
                self.notify(&Update::Failed(e.clone()));
                Err(Error::UpdateFailed(Box::new(e)))
            }
        }
    }
}

pub struct Coordinator {
    shared: Arc<Shared>,
    in_flight: Arc<AtomicBool>,
    next_subscription: AtomicU64,
}

impl Coordinator {
    pub fn new(name: &str, fetcher: Arc<dyn Fetch>, timeout: Duration) -> Coordinator {
        Coordinator {
            shared: Arc::new(Shared {
                name: name.to_owned(),
                fetcher,
                timeout,
                status: RwLock::new(Status::default()),
                subscribers: Mutex::new(Vec::new()),
            }),
            in_flight: Arc::new(AtomicBool::new(false)),
            next_subscription: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, subscriber));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(subscription, _)| *subscription != id);
    }

    /// Last successfully fetched record. Kept after a failed refresh; check
    /// `last_update_success()` to know whether it is current.
    pub fn data(&self) -> Option<Arc<BatteryRecord>> {
        self.shared.status().record.clone()
    }

    pub fn last_update_success(&self) -> bool {
        self.shared.status().last_update_success
    }

    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.shared.status().last_success_at
    }

    pub fn success_count(&self) -> u64 {
        self.shared.status().successes
    }

    pub fn failure_count(&self) -> u64 {
        self.shared.status().failures
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Fetch a new record and publish it. At most one refresh runs at a time; a call made while
    /// one is running returns `Refresh::Skipped` without fetching.
    ///
    /// The work runs on its own task. Dropping the returned future does not stop it, and no
    /// other refresh starts before it has published its outcome.
    pub async fn refresh(&self) -> Result<Refresh, Error> {
        let in_flight = match InFlight::acquire(&self.in_flight) {
            Some(guard) => guard,
            None => {
                log::warn!("{}: refresh already in progress, skipping", self.name());
                return Ok(Refresh::Skipped);
            }
        };

        let shared = self.shared.clone();
        let task = tokio::spawn(async move {
            let _in_flight = in_flight;
            shared.run().await
        });

        match task.await {
            Ok(result) => result.map(|()| Refresh::Updated),
            Err(join_error) => {
                log::error!("{}: refresh task failed: {}", self.name(), join_error);
                Err(Error::UpdateFailed(Box::new(Error::InternalError)))
            }
        }
    }

    /// Refresh made while setting up. Failing here means there is nothing to build sensors on.
    pub async fn first_refresh(&self) -> Result<(), Error> {
        match self.refresh().await {
            Ok(Refresh::Updated) => Ok(()),
            Ok(Refresh::Skipped) => Err(Error::NotReady(Box::new(Error::InternalError))),
            Err(Error::UpdateFailed(e)) => Err(Error::NotReady(e)),
            Err(e) => Err(Error::NotReady(Box::new(e))),
        }
    }
}
