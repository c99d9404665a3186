use prometheus::{Encoder, GaugeVec, IntCounter, IntGauge, TextEncoder};
use urbansolar_bv_rs::coordinator::{Subscriber, Update};
use urbansolar_bv_rs::sensor::SensorState;
use urbansolar_bv_rs::{Error, Integration};

lazy_static! {
    static ref SENSOR_GAUGE: GaugeVec = register_gauge_vec!(
        opts!(
            "virtual_battery_value",
            "value of each virtual battery sensor (kWh, or seconds since epoch for dates)",
        ),
        &["unique_id", "unit"],
    )
    .unwrap();
    static ref REFRESH_COUNTER: IntCounter = register_int_counter!(
        "virtual_battery_refresh_total",
        "number of successful scheduled or manual refreshes"
    )
    .unwrap();
    static ref REFRESH_FAILURE_COUNTER: IntCounter = register_int_counter!(
        "virtual_battery_refresh_failures_total",
        "number of refreshes that ended without data"
    )
    .unwrap();
    static ref LAST_UPDATE_SUCCESS: IntGauge = register_int_gauge!(
        "virtual_battery_last_update_success",
        "1 if the last refresh produced data, 0 otherwise"
    )
    .unwrap();
}

/// Counts refresh outcomes as the coordinator publishes them. Subscribed once setup is done,
/// so the setup refresh is not counted.
pub struct RefreshCounter;

impl Subscriber for RefreshCounter {
    fn handle_update(&self, update: &Update) {
        match update {
            Update::Fetched(_) => REFRESH_COUNTER.inc(),
            Update::Failed(_) => REFRESH_FAILURE_COUNTER.inc(),
        }
    }
}

/// Set gauges from the current coordinator and sensor states. Unavailable sensors have no
/// sample.
fn collect(integration: &Integration) {
    LAST_UPDATE_SUCCESS.set(integration.coordinator().last_update_success() as i64);
    SENSOR_GAUGE.reset();

    for sensor in integration.sensors() {
        if let SensorState::Value(value) = sensor.state() {
            let unit = sensor
                .description()
                .unit
                .map(|unit| unit.to_string())
                .unwrap_or_else(|| "timestamp".to_string());

            SENSOR_GAUGE
                .with_label_values(&[sensor.unique_id(), unit.as_str()])
                .set(value.as_f64());
        }
    }
}

/// Read metrics from Prometheus exporter registry.
pub fn read(integration: &Integration) -> Result<String, Error> {
    collect(integration);

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    encoder
        .encode(&metric_families, &mut buffer)
        .or(Err(Error::FormatError))?;
    String::from_utf8(buffer).or(Err(Error::FormatError))
}
