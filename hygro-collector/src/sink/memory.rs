use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hygro_core::Sample;

use super::Sink;

#[derive(Debug, thiserror::Error)]
pub enum MemorySinkError {
    #[error("samples mutex poisoned")]
    Poisoned,
}

/// In memory sink.
/// This is primarily intended for testing and as a reference
/// implementation of the Sink trait.
#[derive(Clone, Default)]
pub struct MemorySink {
    samples: Arc<Mutex<Vec<Sample>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far, in write order.
    pub fn samples(&self) -> Result<Vec<Sample>, MemorySinkError> {
        let samples = self
            .samples
            .lock()
            .map_err(|_| MemorySinkError::Poisoned)?;
        Ok(samples.clone())
    }
}

#[async_trait]
impl Sink for MemorySink {
    type Error = MemorySinkError;

    async fn write(&self, sample: &Sample) -> Result<(), Self::Error> {
        let mut samples = self
            .samples
            .lock()
            .map_err(|_| MemorySinkError::Poisoned)?;
        samples.push(sample.clone());
        Ok(())
    }
}
