//! Telemetry publisher implementations.
//!
//! The production deployment hands the JSON readout to the site's message
//! bus; that client implements [`TelemetryPublisher`] and lives outside this
//! repository. [`LogPublisher`] keeps the side-channel observable without a
//! broker, and [`CapturingPublisher`] records documents for tests.

use std::sync::Mutex;

use tracing::info;

use crate::application::telemetry::{PublishError, TelemetryPublisher};

/// Writes every readout to the log.
#[derive(Debug, Default)]
pub struct LogPublisher;

impl TelemetryPublisher for LogPublisher {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        info!("publish {topic}: {payload}");
        Ok(())
    }
}

/// Records every published document for test assertions.
#[derive(Debug, Default)]
pub struct CapturingPublisher {
    pub published: Mutex<Vec<(String, String)>>,
}

impl CapturingPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TelemetryPublisher for CapturingPublisher {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}
