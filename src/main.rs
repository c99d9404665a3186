#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate prometheus;
#[macro_use]
extern crate rocket;

use rocket::http::{ContentType, Status};
use rocket::State;
use std::sync::Arc;
use std::time::Duration;
use urbansolar_bv_rs::settings::{self, Settings};
use urbansolar_bv_rs::{Error, Integration, Refresh, Scheduler};

mod metrics;

/// First delay before retrying a failed setup, doubled on every failure.
const SETUP_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Structure containing state for API handlers.
pub struct StateData {
    integration: Integration,
}

#[get("/metrics")]
fn metrics_route(state: &State<StateData>) -> Result<String, Error> {
    metrics::read(&state.integration)
}

#[get("/sensors")]
fn sensors_route(state: &State<StateData>) -> Result<(ContentType, String), Error> {
    let snapshots: Vec<_> = state
        .integration
        .sensors()
        .iter()
        .map(|sensor| sensor.snapshot())
        .collect();

    serde_json::to_string(&snapshots)
        .map(|json| (ContentType::JSON, json))
        .or(Err(Error::FormatError))
}

#[post("/refresh")]
async fn refresh_route(state: &State<StateData>) -> Result<(Status, &'static str), Error> {
    match state.integration.coordinator().refresh().await? {
        Refresh::Updated => Ok((Status::Ok, "updated")),
        Refresh::Skipped => {
            log::info!("refresh already in progress; not starting another one");
            Ok((Status::Accepted, "refresh already in progress"))
        }
    }
}

/// Retry setup until the provider answers, backing off up to one refresh interval.
async fn setup(settings: &Settings) -> Integration {
    let max_delay = Duration::from_secs(settings.interval);
    let mut delay = SETUP_RETRY_DELAY.min(max_delay);

    loop {
        match Integration::setup(settings).await {
            Ok(integration) => return integration,
            Err(e) => {
                log::warn!("Setup failed ({}), retrying in {:?}", e, delay);
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(max_delay);
            }
        }
    }
}

#[rocket::main]
async fn main() {
    env_logger::init();

    let settings = match settings::read_settings() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let integration = setup(&settings).await;
    integration
        .coordinator()
        .subscribe(Arc::new(metrics::RefreshCounter));
    let scheduler = Scheduler::start(
        integration.coordinator().clone(),
        Duration::from_secs(settings.interval),
    );

    let result = rocket::build()
        .manage(StateData { integration })
        .mount("/", routes![metrics_route, sensors_route, refresh_route])
        .launch()
        .await;

    scheduler.stop();
    match result {
        Ok(rocket) => {
            if let Some(state) = rocket.state::<StateData>() {
                state.integration.unload();
            }
        }
        Err(e) => {
            log::error!("Server error: {}", e);
            std::process::exit(1);
        }
    }
}
