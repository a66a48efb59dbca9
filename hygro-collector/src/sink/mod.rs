pub mod influx;
pub mod line_protocol;
pub mod log;
pub mod memory;

use async_trait::async_trait;
use hygro_core::Sample;

pub use influx::{InfluxConfig, InfluxError, InfluxSink};
pub use log::LogSink;
pub use memory::MemorySink;

/// Measurement every sample is written under.
pub const MEASUREMENT: &str = "sensor_data";

/// Destination for normalized samples.
///
/// `write` returns once the store has acknowledged the sample or failed.
#[async_trait]
pub trait Sink: Clone + Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn write(&self, sample: &Sample) -> Result<(), Self::Error>;
}
