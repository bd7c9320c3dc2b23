//! Analog sampling implementations.
//!
//! The production sampler talks to the MCP3008 over SPI; it lives with the
//! board support package and implements [`AdcSampler`]. [`SimulatedAdc`]
//! serves the simulator build and tests with settable fixed readings.

use std::sync::Mutex;

use crate::application::telemetry::{AdcError, AdcSampler};

use pump_core::protocol::messages::ADC_CHANNELS;

/// Fixed in-memory readings, one per channel.
pub struct SimulatedAdc {
    samples: Mutex<[u16; ADC_CHANNELS]>,
}

impl SimulatedAdc {
    /// Plausible idle readings: mid-scale coil current, live phases.
    pub fn new() -> Self {
        Self::with_samples([512, 450, 560, 190])
    }

    pub fn with_samples(samples: [u16; ADC_CHANNELS]) -> Self {
        Self {
            samples: Mutex::new(samples),
        }
    }

    /// Replaces the readings for subsequent samples.
    pub fn set_samples(&self, samples: [u16; ADC_CHANNELS]) {
        *self.samples.lock().unwrap() = samples;
    }
}

impl Default for SimulatedAdc {
    fn default() -> Self {
        Self::new()
    }
}

impl AdcSampler for SimulatedAdc {
    fn sample(&self, channel: usize) -> Result<u16, AdcError> {
        self.samples
            .lock()
            .unwrap()
            .get(channel)
            .copied()
            .ok_or(AdcError::BadChannel(channel))
    }
}
