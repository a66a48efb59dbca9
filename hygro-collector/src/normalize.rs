use hygro_core::{DeviceProfile, ProfileField, Sample};
use serde::Deserialize;
use thiserror::Error;

use crate::fetcher::RawPayload;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("payload does not match the device schema: {0}")]
    Schema(#[from] serde_json::Error),
}

/// Device status body as the upstream API sends it. Every field is optional
/// and unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireStatus {
    device_id: Option<String>,
    device_type: Option<String>,
    hub_device_id: Option<String>,
    version: Option<String>,
    temperature: Option<f64>,
    humidity: Option<i64>,
    battery: Option<i64>,
    #[serde(rename = "CO2")]
    co2: Option<i64>,
}

/// Map a status body into a [`Sample`] using the profile's field table.
pub fn normalize(payload: &RawPayload, profile: DeviceProfile) -> Result<Sample, NormalizeError> {
    normalize_with_fields(payload, profile.fields())
}

/// Like [`normalize`], for an arbitrary set of profile-specific fields.
pub fn normalize_with_fields(
    payload: &RawPayload,
    fields: &[ProfileField],
) -> Result<Sample, NormalizeError> {
    let wire: WireStatus = serde_json::from_str(payload.as_str())?;

    let mut sample = Sample {
        device_id: wire.device_id.unwrap_or_default().into(),
        device_type: wire.device_type.unwrap_or_default().into(),
        hub_device_id: wire.hub_device_id.unwrap_or_default().into(),
        version: wire.version.unwrap_or_default().into(),
        temperature: wire.temperature,
        humidity: wire.humidity,
        battery: None,
        co2: None,
        observed_at: jiff::Timestamp::now(),
    };

    for field in fields {
        match field {
            ProfileField::Battery => sample.battery = wire.battery,
            ProfileField::Co2 => sample.co2 = wire.co2,
        }
    }

    Ok(sample)
}
