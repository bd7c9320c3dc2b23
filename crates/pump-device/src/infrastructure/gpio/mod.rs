//! Pin-driver implementations.
//!
//! The production build drives the controller board's GPIO character device;
//! that driver lives with the board support package and implements the same
//! [`PinDriver`] trait. In this repository:
//!
//! - [`SimulatedPins`] keeps the line states in memory and behaves like a
//!   motor whose starter and stop contacts actually work — useful for
//!   running the agent against a live relay without hardware.
//! - [`mock::RecordingPins`] records every call for test assertions.

pub mod mock;

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use pump_core::domain::ValvePair;

use crate::application::control::{LineStates, PinDriver, PinError};

#[derive(Debug)]
struct SimState {
    motor_running: bool,
    valves: ValvePair,
    nc_relay: bool,
    no_relay: bool,
}

/// In-memory pin driver that reacts to pulses the way the real motor does:
/// a start pulse raises the motor-state line, a stop pulse drops it.
pub struct SimulatedPins {
    state: Mutex<SimState>,
}

impl SimulatedPins {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                motor_running: false,
                valves: ValvePair::DEFAULT,
                nc_relay: false,
                no_relay: false,
            }),
        }
    }
}

impl Default for SimulatedPins {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PinDriver for SimulatedPins {
    fn motor_running(&self) -> Result<bool, PinError> {
        Ok(self.state.lock().unwrap().motor_running)
    }

    fn drive_valves(&self, valves: ValvePair) -> Result<(), PinError> {
        debug!(
            "valves driven: valve0 {}, valve1 {}",
            if valves.valve0_closed { "closed" } else { "open" },
            if valves.valve1_closed { "closed" } else { "open" },
        );
        self.state.lock().unwrap().valves = valves;
        Ok(())
    }

    async fn pulse_start(&self, duration: Duration) -> Result<(), PinError> {
        self.state.lock().unwrap().no_relay = true;
        tokio::time::sleep(duration).await;
        let mut state = self.state.lock().unwrap();
        state.no_relay = false;
        state.motor_running = true;
        debug!("start contact pulsed for {duration:?}; motor line up");
        Ok(())
    }

    async fn pulse_stop(&self, duration: Duration) -> Result<(), PinError> {
        self.state.lock().unwrap().nc_relay = true;
        tokio::time::sleep(duration).await;
        let mut state = self.state.lock().unwrap();
        state.nc_relay = false;
        state.motor_running = false;
        debug!("stop contact pulsed for {duration:?}; motor line down");
        Ok(())
    }

    fn line_states(&self) -> Result<LineStates, PinError> {
        let state = self.state.lock().unwrap();
        Ok(LineStates {
            motor_running: state.motor_running,
            valve0_closed: state.valves.valve0_closed,
            valve1_closed: state.valves.valve1_closed,
            nc_relay: state.nc_relay,
            no_relay: state.no_relay,
        })
    }
}
