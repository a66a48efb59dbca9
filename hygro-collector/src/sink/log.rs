use std::convert::Infallible;

use async_trait::async_trait;
use hygro_core::Sample;
use tracing::info;

use super::{MEASUREMENT, Sink};

/// Sink that only emits each sample as a log event. Used for dry runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

#[async_trait]
impl Sink for LogSink {
    type Error = Infallible;

    async fn write(&self, sample: &Sample) -> Result<(), Self::Error> {
        info!(
            measurement = MEASUREMENT,
            device_id = %sample.device_id,
            device_type = %sample.device_type,
            temperature = ?sample.temperature,
            humidity = ?sample.humidity,
            battery = ?sample.battery,
            co2 = ?sample.co2,
            observed_at = %sample.observed_at,
            "sample"
        );
        Ok(())
    }
}
