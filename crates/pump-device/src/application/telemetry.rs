//! Telemetry assembly: the binary report frame and the JSON readout.
//!
//! Two consumers want to know the same things on each tick. The relay gets
//! the compact binary [`TelemetryReport`] (raw ADC counts, status bits,
//! remaining cutoff minutes). The operations dashboard gets an
//! engineering-units [`EngineeringReadout`] — amps, volts, open/close
//! strings — serialized as JSON and handed to whatever
//! [`TelemetryPublisher`] is wired in.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use pump_core::domain::DeviceId;
use pump_core::protocol::messages::{TelemetryReport, ADC_CHANNELS, ADC_MAX};

use crate::application::control::{PinDriver, PinError};

/// Error type for ADC access.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdcError {
    #[error("no adc channel {0}")]
    BadChannel(usize),
    #[error("spi error: {0}")]
    Spi(String),
}

/// 10-bit analog sampling.
///
/// Channel 0 carries the motor coil current sensor; channels 1–3 carry the
/// three phase-voltage dividers.
pub trait AdcSampler: Send + Sync {
    fn sample(&self, channel: usize) -> Result<u16, AdcError>;
}

/// Outbound side-channel for the JSON readout.
///
/// The production implementation hands the document to the site's message
/// bus; the in-repo implementation writes it to the log.
pub trait TelemetryPublisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), PublishError>;
}

/// Error type for the publisher port.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish failed: {0}")]
    Transport(String),
}

/// Errors while assembling telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Adc(#[from] AdcError),
    #[error(transparent)]
    Pin(#[from] PinError),
    #[error("readout serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ── Engineering-unit conversions ──────────────────────────────────────────────

/// ADC reference voltage.
const VREF: f32 = 3.3;
/// Coil current sensor: volts at zero amps.
const COIL_ZERO_VOLTS: f32 = 1.65;
/// Coil current sensor: volts per amp.
const COIL_VOLTS_PER_AMP: f32 = 0.05;
/// Phase voltage divider resistors.
const DIVIDER_R1: f32 = 2.0e6;
const DIVIDER_R2: f32 = 20.0e3;

fn adc_volts(raw: u16) -> f32 {
    f32::from(raw.min(ADC_MAX)) * VREF / f32::from(ADC_MAX)
}

fn coil_current_amps(raw: u16) -> f32 {
    (adc_volts(raw) - COIL_ZERO_VOLTS) / COIL_VOLTS_PER_AMP
}

fn phase_volts(raw: u16) -> f32 {
    adc_volts(raw) * (DIVIDER_R1 + DIVIDER_R2) / DIVIDER_R2
}

fn open_close(closed: bool) -> &'static str {
    if closed {
        "close"
    } else {
        "open"
    }
}

/// The JSON document published on the side-channel.
///
/// Values are strings, matching what the dashboard ingests.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct EngineeringReadout {
    pub valve0_state: String,
    pub valve1_state: String,
    pub nc_state: String,
    pub no_state: String,
    pub motor_state: String,
    pub cutoff_time: String,
    pub coil_current: String,
    pub phase1: String,
    pub phase2: String,
    pub phase3: String,
}

/// Builds reports and readouts from the hardware ports.
pub struct TelemetrySource {
    device_id: DeviceId,
    pins: Arc<dyn PinDriver>,
    adc: Arc<dyn AdcSampler>,
}

impl TelemetrySource {
    pub fn new(device_id: DeviceId, pins: Arc<dyn PinDriver>, adc: Arc<dyn AdcSampler>) -> Self {
        Self {
            device_id,
            pins,
            adc,
        }
    }

    /// Samples every channel once and packs the binary report.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when a channel or line read fails.
    pub fn report(&self, rssi: i8, remaining_minutes: u16) -> Result<TelemetryReport, TelemetryError> {
        let mut adc = [0u16; ADC_CHANNELS];
        for (channel, sample) in adc.iter_mut().enumerate() {
            *sample = self.adc.sample(channel)?;
        }
        let status = self.pins.line_states()?.status_bits();
        Ok(TelemetryReport {
            device_id: self.device_id,
            rssi,
            adc,
            remaining_minutes,
            status,
        })
    }

    /// Averages `count` samples of one channel.
    fn averaged(&self, channel: usize, count: u32) -> Result<u16, AdcError> {
        let mut total: u32 = 0;
        for _ in 0..count {
            total += u32::from(self.adc.sample(channel)?);
        }
        Ok((total / count.max(1)) as u16)
    }

    /// Builds the engineering-units readout for the side-channel.
    ///
    /// Phase and current channels are averaged over a few samples to steady
    /// the dashboard figures.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when a channel or line read fails.
    pub fn readout(&self, remaining_minutes: u16) -> Result<EngineeringReadout, TelemetryError> {
        const AVERAGE_OVER: u32 = 5;

        let coil = coil_current_amps(self.averaged(0, AVERAGE_OVER)?);
        let phase1 = phase_volts(self.averaged(1, AVERAGE_OVER)?);
        let phase2 = phase_volts(self.averaged(2, AVERAGE_OVER)?);
        let phase3 = phase_volts(self.averaged(3, AVERAGE_OVER)?);
        let lines = self.pins.line_states()?;

        Ok(EngineeringReadout {
            valve0_state: open_close(lines.valve0_closed).to_string(),
            valve1_state: open_close(lines.valve1_closed).to_string(),
            nc_state: open_close(lines.nc_relay).to_string(),
            no_state: open_close(lines.no_relay).to_string(),
            motor_state: if lines.motor_running { "on" } else { "off" }.to_string(),
            cutoff_time: remaining_minutes.to_string(),
            coil_current: format!("{coil:.2}"),
            phase1: format!("{phase1:.2}"),
            phase2: format!("{phase2:.2}"),
            phase3: format!("{phase3:.2}"),
        })
    }

    /// The readout as a JSON string ready for the publisher.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError`] when sampling or serialization fails.
    pub fn readout_json(&self, remaining_minutes: u16) -> Result<String, TelemetryError> {
        Ok(serde_json::to_string(&self.readout(remaining_minutes)?)?)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
