use crate::api::Error;
use crate::coordinator::{Fetch, Subscriber, Update};
use crate::model::BatteryRecord;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// `{currentCharge: 12.5, totalInjection: 3.2, updateDate: "2024-01-01T10:00:00"}`
pub fn record() -> BatteryRecord {
    BatteryRecord {
        current_charge: Some(12.5),
        total_injection: Some(3.2),
        start_date: NaiveDate::from_ymd_opt(2023, 6, 1).and_then(|d| d.and_hms_opt(0, 0, 0)),
        update_date: NaiveDate::from_ymd_opt(2024, 1, 1).and_then(|d| d.and_hms_opt(10, 0, 0)),
    }
}

/// Answers fetches from a fixed list, in order.
pub struct ScriptedFetch {
    responses: Mutex<VecDeque<Result<BatteryRecord, Error>>>,
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    delay: Option<Duration>,
}

/// Counts a fetch as running until dropped, completed or cancelled.
struct Running<'a>(&'a AtomicUsize);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedFetch {
    pub fn new(responses: Vec<Result<BatteryRecord, Error>>) -> ScriptedFetch {
        ScriptedFetch {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> ScriptedFetch {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most fetches ever running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for ScriptedFetch {
    async fn fetch(&self) -> Result<BatteryRecord, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        let _running = Running(&self.running);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(Error::ApiError("no scripted response left".to_string())))
    }
}

#[derive(Default)]
pub struct Recorder {
    fetched: AtomicUsize,
    failed: AtomicUsize,
}

impl Recorder {
    pub fn fetched(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

impl Subscriber for Recorder {
    fn handle_update(&self, update: &Update) {
        match update {
            Update::Fetched(_) => self.fetched.fetch_add(1, Ordering::SeqCst),
            Update::Failed(_) => self.failed.fetch_add(1, Ordering::SeqCst),
        };
    }
}
