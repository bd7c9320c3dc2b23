//! Recording pin driver for unit tests.
//!
//! The real driver moves contactors; nothing about that is observable from
//! test code. `RecordingPins` replaces every line operation with in-memory
//! recording so tests can assert exactly how many pulses were issued and
//! what the valves were driven to, and can flip the motor-state input line
//! to simulate the starter engaging.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use pump_core::domain::ValvePair;

use crate::application::control::{LineStates, PinDriver, PinError};

/// A pin driver that records calls instead of driving hardware.
///
/// Construct with [`RecordingPins::failing`] to make every call return a
/// [`PinError`], for exercising error paths.
pub struct RecordingPins {
    motor_running: Mutex<bool>,
    valves: Mutex<ValvePair>,
    start_pulses: Mutex<Vec<Duration>>,
    stop_pulses: Mutex<Vec<Duration>>,
    valve_history: Mutex<Vec<ValvePair>>,
    should_fail: bool,
}

impl Default for RecordingPins {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingPins {
    pub fn new() -> Self {
        Self {
            motor_running: Mutex::new(false),
            valves: Mutex::new(ValvePair::DEFAULT),
            start_pulses: Mutex::new(Vec::new()),
            stop_pulses: Mutex::new(Vec::new()),
            valve_history: Mutex::new(Vec::new()),
            should_fail: false,
        }
    }

    /// Every call fails with a [`PinError`].
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    /// Simulates the motor-state input line changing.
    pub fn set_motor_running(&self, running: bool) {
        *self.motor_running.lock().unwrap() = running;
    }

    pub fn start_pulses(&self) -> usize {
        self.start_pulses.lock().unwrap().len()
    }

    pub fn stop_pulses(&self) -> usize {
        self.stop_pulses.lock().unwrap().len()
    }

    /// How many times the valves were driven.
    pub fn valve_changes(&self) -> usize {
        self.valve_history.lock().unwrap().len()
    }

    fn check(&self) -> Result<(), PinError> {
        if self.should_fail {
            Err(PinError::Gpio("mock failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PinDriver for RecordingPins {
    fn motor_running(&self) -> Result<bool, PinError> {
        self.check()?;
        Ok(*self.motor_running.lock().unwrap())
    }

    fn drive_valves(&self, valves: ValvePair) -> Result<(), PinError> {
        self.check()?;
        *self.valves.lock().unwrap() = valves;
        self.valve_history.lock().unwrap().push(valves);
        Ok(())
    }

    async fn pulse_start(&self, duration: Duration) -> Result<(), PinError> {
        self.check()?;
        self.start_pulses.lock().unwrap().push(duration);
        Ok(())
    }

    async fn pulse_stop(&self, duration: Duration) -> Result<(), PinError> {
        self.check()?;
        self.stop_pulses.lock().unwrap().push(duration);
        Ok(())
    }

    fn line_states(&self) -> Result<LineStates, PinError> {
        self.check()?;
        let valves = *self.valves.lock().unwrap();
        Ok(LineStates {
            motor_running: *self.motor_running.lock().unwrap(),
            valve0_closed: valves.valve0_closed,
            valve1_closed: valves.valve1_closed,
            nc_relay: false,
            no_relay: false,
        })
    }
}
