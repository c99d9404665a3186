use crate::api::{self, Error};
use crate::coordinator::{Coordinator, SubscriptionId};
use crate::model::Credentials;
use crate::sensor::{BatterySensor, DeviceInfo, SensorKind};
use crate::settings::Settings;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const COORDINATOR_NAME: &str = "USE BV";

/// One configured account: its coordinator and the sensors fed by it.
pub struct Integration {
    coordinator: Arc<Coordinator>,
    sensors: Vec<Arc<BatterySensor>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl Integration {
    pub async fn setup(settings: &Settings) -> Result<Integration, Error> {
        let api = api::api(
            settings.api_url.clone(),
            Credentials::new(&settings.username, &settings.password),
            settings.timeout,
        );
        let coordinator = Arc::new(Coordinator::new(
            COORDINATOR_NAME,
            Arc::new(api),
            Duration::from_secs(settings.timeout),
        ));

        Integration::with_coordinator(coordinator, settings.device_id()).await
    }

    /// Run the first refresh, then create the sensors from its record. No sensor is created if
    /// that refresh fails.
    pub async fn with_coordinator(
        coordinator: Arc<Coordinator>,
        device_id: &str,
    ) -> Result<Integration, Error> {
        coordinator.first_refresh().await?;

        let device = DeviceInfo::new(device_id);
        let record = coordinator.data();
        let sensors: Vec<Arc<BatterySensor>> = SensorKind::ALL
            .iter()
            .map(|kind| Arc::new(BatterySensor::new(*kind, device.clone(), record.as_deref())))
            .collect();

        let subscriptions: Vec<SubscriptionId> = sensors
            .iter()
            .map(|sensor| coordinator.subscribe(sensor.clone()))
            .collect();

        log::info!(
            "{}: set up {} sensors for device {}",
            coordinator.name(),
            sensors.len(),
            device_id
        );

        Ok(Integration {
            coordinator,
            sensors,
            subscriptions: Mutex::new(subscriptions),
        })
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn sensors(&self) -> &[Arc<BatterySensor>] {
        &self.sensors
    }

    /// Detach the sensors from the coordinator. Calling it twice is harmless.
    pub fn unload(&self) {
        let subscriptions: Vec<SubscriptionId> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for id in &subscriptions {
            self.coordinator.unsubscribe(*id);
        }
        if !subscriptions.is_empty() {
            log::info!("{}: unloaded", self.coordinator.name());
        }
    }
}
