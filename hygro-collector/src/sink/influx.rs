use std::time::Duration;

use async_trait::async_trait;
use hygro_core::Sample;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::line_protocol::{FieldValue, Point};
use super::{MEASUREMENT, Sink};

#[derive(Debug, Error)]
pub enum InfluxError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("InfluxDB rejected the write with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("sample for device {0} has no measurement fields")]
    NoFields(Box<str>),
}

/// Connection parameters for an InfluxDB v2 bucket.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfluxConfig {
    pub url: String,
    pub org: String,
    pub bucket: String,
    pub token: String,
}

impl std::fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Writes samples through the InfluxDB v2 HTTP write API, one point per call.
#[derive(Clone)]
pub struct InfluxSink {
    http: HttpClient,
    write_url: String,
    config: InfluxConfig,
}

impl InfluxSink {
    pub fn new(config: InfluxConfig, timeout: Duration) -> Result<Self, InfluxError> {
        let http = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self::with_http_client(http, config))
    }

    pub fn with_http_client(http: HttpClient, config: InfluxConfig) -> Self {
        let write_url = format!("{}/api/v2/write", config.url.trim_end_matches('/'));
        Self {
            http,
            write_url,
            config,
        }
    }
}

/// `sensor_data,device_id=<id> temperature=..,humidity=..i[,battery=..i][,co2=..i] <ns>`
pub fn point_for(sample: &Sample) -> Point {
    Point::new(MEASUREMENT)
        .tag("device_id", &*sample.device_id)
        .field_opt("temperature", sample.temperature.map(FieldValue::Float))
        .field_opt("humidity", sample.humidity.map(FieldValue::Integer))
        .field_opt("battery", sample.battery.map(FieldValue::Integer))
        .field_opt("co2", sample.co2.map(FieldValue::Integer))
        .timestamp(sample.observed_at.as_nanosecond())
}

#[async_trait]
impl Sink for InfluxSink {
    type Error = InfluxError;

    async fn write(&self, sample: &Sample) -> Result<(), Self::Error> {
        let line = point_for(sample)
            .to_line()
            .ok_or_else(|| InfluxError::NoFields(sample.device_id.clone()))?;

        let response = self
            .http
            .post(&self.write_url)
            .query(&[
                ("org", self.config.org.as_str()),
                ("bucket", self.config.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", format!("Token {}", self.config.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(InfluxError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}
