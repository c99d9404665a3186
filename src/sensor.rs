//! Read-only sensors, each publishing one field of the latest battery record.

use crate::coordinator::{Subscriber, Update};
use crate::model::{BatteryRecord, KWh, PROVIDER_TZ};
use chrono::{Duration, NaiveDateTime, TimeZone};
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, PoisonError};

pub const DOMAIN: &str = "batterie_virtuelle_use";
pub const DEVICE_NAME: &str = "Batterie virtuelle USE";
pub const DEVICE_MANUFACTURER: &str = "USE";

const ICON: &str = "mdi:timer-play";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    EnergyStorage,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Unit {
    #[serde(rename = "kWh")]
    KiloWattHour,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::KiloWattHour => write!(f, "kWh"),
        }
    }
}

/// Static metadata of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorDescription {
    pub key: &'static str,
    pub name: &'static str,
    pub icon: &'static str,
    pub device_class: DeviceClass,
    pub state_class: Option<StateClass>,
    pub unit: Option<Unit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    CurrentIndex,
    TotalInjection,
    LastUpdateDate,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [
        SensorKind::CurrentIndex,
        SensorKind::TotalInjection,
        SensorKind::LastUpdateDate,
    ];

    pub fn description(self) -> SensorDescription {
        match self {
            SensorKind::CurrentIndex => SensorDescription {
                key: "current_index",
                name: "Index batterie virtuelle",
                icon: ICON,
                device_class: DeviceClass::EnergyStorage,
                state_class: Some(StateClass::Measurement),
                unit: Some(Unit::KiloWattHour),
            },
            SensorKind::TotalInjection => SensorDescription {
                key: "total_injection",
                name: "Total injection BV",
                icon: ICON,
                device_class: DeviceClass::EnergyStorage,
                state_class: Some(StateClass::Measurement),
                unit: Some(Unit::KiloWattHour),
            },
            SensorKind::LastUpdateDate => SensorDescription {
                key: "last_update_date",
                name: "Date mise à jour index",
                icon: ICON,
                device_class: DeviceClass::Timestamp,
                state_class: None,
                unit: None,
            },
        }
    }

    /// The field this sensor publishes, if the record has it.
    pub fn value(self, record: &BatteryRecord) -> Option<SensorValue> {
        match self {
            SensorKind::CurrentIndex => record.current_charge.map(SensorValue::Energy),
            SensorKind::TotalInjection => record.total_injection.map(SensorValue::Energy),
            SensorKind::LastUpdateDate => record.update_date.map(SensorValue::Timestamp),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    Energy(KWh),
    Timestamp(NaiveDateTime),
}

impl SensorValue {
    /// Numeric form, timestamps as seconds since the epoch.
    pub fn as_f64(&self) -> f64 {
        match self {
            SensorValue::Energy(kwh) => *kwh,
            SensorValue::Timestamp(dt) => epoch_seconds(dt) as f64,
        }
    }
}

/// Read a provider wall-clock time in `PROVIDER_TZ`. An ambiguous time takes its first
/// occurrence; a time skipped by the spring change reads as one hour later.
fn epoch_seconds(dt: &NaiveDateTime) -> i64 {
    PROVIDER_TZ
        .from_local_datetime(dt)
        .earliest()
        .or_else(|| PROVIDER_TZ.from_local_datetime(&(*dt + Duration::hours(1))).earliest())
        .map(|local| local.timestamp())
        .unwrap_or_else(|| dt.and_utc().timestamp())
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Energy(kwh) => write!(f, "{}", kwh),
            SensorValue::Timestamp(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

/// Uninitialized until the first update, then `Value` or `Unavailable` for as long as the
/// integration lives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorState {
    Uninitialized,
    Value(SensorValue),
    Unavailable,
}

impl SensorState {
    pub fn value(&self) -> Option<SensorValue> {
        match self {
            SensorState::Value(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for SensorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorState::Uninitialized => write!(f, "unknown"),
            SensorState::Value(value) => write!(f, "{}", value),
            SensorState::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Groups the sensors of one account in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: (String, String),
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub entry_type: String,
}

impl DeviceInfo {
    pub fn new(device_id: &str) -> DeviceInfo {
        DeviceInfo {
            identifiers: (DOMAIN.to_string(), device_id.to_string()),
            name: DEVICE_NAME.to_string(),
            manufacturer: DEVICE_MANUFACTURER.to_string(),
            model: DOMAIN.to_string(),
            entry_type: "service".to_string(),
        }
    }
}

/// What the host surface shows for a sensor.
#[derive(Debug, Clone, Serialize)]
pub struct SensorSnapshot {
    pub unique_id: String,
    pub name: &'static str,
    pub state: serde_json::Value,
    pub unit_of_measurement: Option<Unit>,
    pub device_class: DeviceClass,
    pub state_class: Option<StateClass>,
    pub icon: &'static str,
    pub device: DeviceInfo,
}

pub struct BatterySensor {
    kind: SensorKind,
    unique_id: String,
    device: DeviceInfo,
    state: Mutex<SensorState>,
}

impl BatterySensor {
    /// A sensor seeded from `record`, the coordinator's data at setup time.
    pub fn new(
        kind: SensorKind,
        device: DeviceInfo,
        record: Option<&BatteryRecord>,
    ) -> BatterySensor {
        let state = match record {
            Some(record) => state_from(kind, record),
            None => SensorState::Uninitialized,
        };

        BatterySensor {
            kind,
            unique_id: format!("{}_{}", DOMAIN, kind.description().key),
            device,
            state: Mutex::new(state),
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn description(&self) -> SensorDescription {
        self.kind.description()
    }

    pub fn state(&self) -> SensorState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a coordinator update, returning whether the displayed state changed.
    pub fn apply(&self, update: &Update) -> bool {
        let new_state = match update {
            Update::Fetched(record) => state_from(self.kind, record),
            Update::Failed(_) => SensorState::Unavailable,
        };

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = *state != new_state;
        *state = new_state;
        changed
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        let description = self.description();
        let state = match self.state() {
            SensorState::Value(SensorValue::Energy(kwh)) => serde_json::json!(kwh),
            other => serde_json::Value::String(other.to_string()),
        };

        SensorSnapshot {
            unique_id: self.unique_id.clone(),
            name: description.name,
            state,
            unit_of_measurement: description.unit,
            device_class: description.device_class,
            state_class: description.state_class,
            icon: description.icon,
            device: self.device.clone(),
        }
    }
}

fn state_from(kind: SensorKind, record: &BatteryRecord) -> SensorState {
    kind.value(record)
        .map(SensorState::Value)
        .unwrap_or(SensorState::Unavailable)
}

impl Subscriber for BatterySensor {
    fn handle_update(&self, update: &Update) {
        if self.apply(update) {
            log::debug!("{}: state is now {}", self.unique_id, self.state());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::api::Error;
    use crate::testing::record;
    use chrono::NaiveDate;
    use std::sync::Arc;
    use std::time::Duration;

    fn sensor(kind: SensorKind) -> BatterySensor {
        BatterySensor::new(kind, DeviceInfo::new("jean@example.com"), None)
    }

    fn fetched(record: BatteryRecord) -> Update {
        Update::Fetched(Arc::new(record))
    }

    #[test]
    fn starts_uninitialized() {
        let sensor = sensor(SensorKind::CurrentIndex);
        assert_eq!(SensorState::Uninitialized, sensor.state());
        assert_eq!("unknown", sensor.state().to_string());
    }

    #[test]
    fn seeded_from_first_record() {
        let sensor = BatterySensor::new(
            SensorKind::TotalInjection,
            DeviceInfo::new("jean@example.com"),
            Some(&record()),
        );
        assert_eq!(SensorState::Value(SensorValue::Energy(3.2)), sensor.state());
    }

    #[test]
    fn projects_each_field() {
        let update = fetched(record());
        let current = sensor(SensorKind::CurrentIndex);
        let injection = sensor(SensorKind::TotalInjection);
        let last_update = sensor(SensorKind::LastUpdateDate);

        for s in &[&current, &injection, &last_update] {
            s.handle_update(&update);
        }

        assert_eq!(Some(SensorValue::Energy(12.5)), current.state().value());
        assert_eq!(Some(SensorValue::Energy(3.2)), injection.state().value());
        assert_eq!(
            Some(SensorValue::Timestamp(
                NaiveDate::from_ymd_opt(2024, 1, 1)
                    .unwrap()
                    .and_hms_opt(10, 0, 0)
                    .unwrap()
            )),
            last_update.state().value()
        );
        assert_eq!("2024-01-01T10:00:00", last_update.state().to_string());
    }

    #[test]
    fn failure_makes_unavailable() {
        let sensor = sensor(SensorKind::CurrentIndex);
        sensor.apply(&fetched(record()));

        assert!(sensor.apply(&Update::Failed(Error::Timeout(Duration::from_secs(10)))));
        assert_eq!(SensorState::Unavailable, sensor.state());
        assert_eq!("unavailable", sensor.state().to_string());

        assert!(sensor.apply(&fetched(record())));
        assert_eq!(Some(SensorValue::Energy(12.5)), sensor.state().value());
    }

    #[test]
    fn missing_field_only_affects_its_sensor() {
        let partial = BatteryRecord {
            current_charge: None,
            ..record()
        };
        let current = sensor(SensorKind::CurrentIndex);
        let injection = sensor(SensorKind::TotalInjection);

        current.apply(&fetched(partial.clone()));
        injection.apply(&fetched(partial));

        assert_eq!(SensorState::Unavailable, current.state());
        assert_eq!(Some(SensorValue::Energy(3.2)), injection.state().value());
    }

    #[test]
    fn identical_update_changes_nothing() {
        let sensor = sensor(SensorKind::CurrentIndex);
        assert!(sensor.apply(&fetched(record())));
        assert!(!sensor.apply(&fetched(record())));
        assert_eq!(Some(SensorValue::Energy(12.5)), sensor.state().value());
    }

    #[test]
    fn unique_ids_are_stable() {
        let ids: Vec<String> = SensorKind::ALL
            .iter()
            .map(|kind| sensor(*kind).unique_id().to_string())
            .collect();
        assert_eq!(
            vec![
                "batterie_virtuelle_use_current_index",
                "batterie_virtuelle_use_total_injection",
                "batterie_virtuelle_use_last_update_date",
            ],
            ids
        );
    }

    #[test]
    fn metadata() {
        let current = SensorKind::CurrentIndex.description();
        assert_eq!(DeviceClass::EnergyStorage, current.device_class);
        assert_eq!(Some(Unit::KiloWattHour), current.unit);
        assert_eq!("mdi:timer-play", current.icon);

        let last_update = SensorKind::LastUpdateDate.description();
        assert_eq!(DeviceClass::Timestamp, last_update.device_class);
        assert_eq!(None, last_update.unit);
    }

    #[test]
    fn snapshot_serializes() {
        let sensor = sensor(SensorKind::CurrentIndex);
        sensor.apply(&fetched(record()));

        let value = serde_json::to_value(sensor.snapshot()).unwrap();

        assert_eq!(serde_json::json!(12.5), value["state"]);
        assert_eq!("kWh", value["unit_of_measurement"]);
        assert_eq!("energy_storage", value["device_class"]);
        assert_eq!("measurement", value["state_class"]);
        assert_eq!(
            serde_json::json!(["batterie_virtuelle_use", "jean@example.com"]),
            value["device"]["identifiers"]
        );
    }

    #[test]
    fn timestamps_read_as_paris_time() {
        let at = |month, hour| {
            SensorValue::Timestamp(
                NaiveDate::from_ymd_opt(2024, month, 1)
                    .unwrap()
                    .and_hms_opt(hour, 0, 0)
                    .unwrap(),
            )
        };

        /* 09:00 UTC in winter, 08:00 UTC in summer */
        assert_eq!(1_704_099_600.0, at(1, 10).as_f64());
        assert_eq!(1_719_820_800.0, at(7, 10).as_f64());
        assert_eq!(12.5, SensorValue::Energy(12.5).as_f64());
    }
}
