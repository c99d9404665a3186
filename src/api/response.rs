use crate::model::PROVIDER_TZ;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/* Generic GraphQL error */
#[derive(Deserialize, Debug)]
pub struct GraphqlError {
    pub message: String,
}

#[derive(Deserialize, Debug)]
pub struct Payload {
    pub data: Option<Data>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

#[derive(Deserialize, Debug)]
pub struct Data {
    pub me: Option<Me>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Me {
    pub billing_accounts: Option<Vec<BillingAccount>>,
}

#[derive(Deserialize, Debug)]
pub struct BillingAccount {
    pub agreements: Option<Vec<Agreement>>,
}

#[derive(Deserialize, Debug)]
pub struct Agreement {
    pub bv: Option<Bv>,
}

/// Virtual battery ("batterie virtuelle") figures of one agreement.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Bv {
    #[serde(default, deserialize_with = "lenient_kwh")]
    pub current_charge: Option<f64>,
    #[serde(default, deserialize_with = "lenient_kwh")]
    pub total_injection: Option<f64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub start_date: Option<NaiveDateTime>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub update_date: Option<NaiveDateTime>,
}

/* Valid response shapes: batched (what the provider sends back for our batched query) or bare */
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum GraphqlResponse {
    Batch(Vec<Payload>),
    Single(Payload),
}

/// A kWh figure may come as a number or as a numeric string. Anything else makes the field
/// absent instead of failing the whole record.
fn lenient_kwh<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(d)?;
    let kwh = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    if kwh.is_none() && !value.is_null() {
        log::warn!("Ignoring non numeric energy value: {}", value);
    }
    Ok(kwh)
}

fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
    let value = Value::deserialize(d)?;
    let timestamp = value.as_str().and_then(parse_timestamp);
    if timestamp.is_none() && !value.is_null() {
        log::warn!("Ignoring unreadable timestamp: {}", value);
    }
    Ok(timestamp)
}

/// Parse an ISO-8601 timestamp into provider local time. Values carrying an offset are converted
/// to `PROVIDER_TZ`, values without one are kept as written, and a bare date means midnight.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&PROVIDER_TZ).naive_local())
        .ok()
        .or_else(|| s.parse::<NaiveDateTime>().ok())
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
