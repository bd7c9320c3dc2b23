//! MotorController: turns commands and timer expiries into actuation.
//!
//! The motor has no direct on/off line. Starting it means pulsing the
//! starter contact for a moment (the electrical equivalent of pressing the
//! physical start button) and trusting the motor-state input line to report
//! what actually happened; stopping pulses the stop contact the same way.
//! Because of that, every decision here branches on the *measured* motor
//! line, not on what we last commanded.
//!
//! The controller is owned by the agent's dispatch loop. Commands, cutoff
//! expiry, and telemetry generation are all serviced by that one loop, so a
//! transition (valves + pulse + timer) is never observed half-applied.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use pump_core::domain::{StatusBits, ValvePair};
use pump_core::protocol::messages::MotorCommand;
use pump_core::timer::{TimerHandle, TimerService};

use crate::application::AgentTimer;

/// Error type for hardware line access.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PinError {
    #[error("gpio error: {0}")]
    Gpio(String),
}

/// Snapshot of every line that feeds the telemetry status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineStates {
    pub motor_running: bool,
    pub valve0_closed: bool,
    pub valve1_closed: bool,
    pub nc_relay: bool,
    pub no_relay: bool,
}

impl LineStates {
    pub fn status_bits(&self) -> StatusBits {
        StatusBits::from_lines(
            self.motor_running,
            self.valve0_closed,
            self.valve1_closed,
            self.nc_relay,
            self.no_relay,
        )
    }
}

/// Hardware line access.
///
/// The production implementation drives the controller board's GPIO lines;
/// the in-repo implementations are a simulator and a recording mock.
#[async_trait]
pub trait PinDriver: Send + Sync {
    /// Reads the motor-state input line.
    fn motor_running(&self) -> Result<bool, PinError>;

    /// Drives both valve output lines to the given (legal) position.
    fn drive_valves(&self, valves: ValvePair) -> Result<(), PinError>;

    /// Momentarily closes the starter contact.
    async fn pulse_start(&self, duration: Duration) -> Result<(), PinError>;

    /// Momentarily closes the stop contact.
    async fn pulse_stop(&self, duration: Duration) -> Result<(), PinError>;

    /// Reads every line that feeds the telemetry status byte.
    fn line_states(&self) -> Result<LineStates, PinError>;
}

/// Errors from applying a command or a timer expiry.
#[derive(Debug, Error)]
pub enum ActuationError {
    #[error(transparent)]
    Pin(#[from] PinError),
}

/// The actuation state machine.
pub struct MotorController {
    pins: Arc<dyn PinDriver>,
    timers: TimerService<AgentTimer>,
    /// Contact-closure duration for start/stop pulses.
    pulse: Duration,
    /// Present exactly while a cutoff is scheduled.
    cutoff: Option<TimerHandle<AgentTimer>>,
}

impl MotorController {
    pub fn new(
        pins: Arc<dyn PinDriver>,
        timers: TimerService<AgentTimer>,
        pulse: Duration,
    ) -> Self {
        Self {
            pins,
            timers,
            pulse,
            cutoff: None,
        }
    }

    /// Drives the valves to their power-on position. Called once at startup
    /// before any command is accepted.
    pub fn initialize(&self) -> Result<(), ActuationError> {
        self.pins.drive_valves(ValvePair::DEFAULT)?;
        Ok(())
    }

    /// Applies one accepted command.
    ///
    /// The valves are driven on every command; the motor branch depends on
    /// the measured motor line:
    ///
    /// - on + line off + minutes > 0: one start pulse, then a fresh cutoff.
    /// - on + line on + minutes > 0: move the cutoff deadline, no pulse.
    /// - off + line on: one stop pulse, cutoff cancelled.
    /// - off + line off: nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ActuationError`] when a hardware line refuses to drive; the
    /// caller logs it and keeps serving the loop.
    pub async fn apply_command(&mut self, command: &MotorCommand) -> Result<(), ActuationError> {
        let motor_running = self.pins.motor_running()?;

        self.pins
            .drive_valves(ValvePair::resolve(command.valve0_closed, command.valve1_closed))?;

        if command.motor_on {
            if command.remaining_minutes == 0 {
                // A run of zero minutes is not a start request.
                debug!("motor-on command with zero minutes; motor branch skipped");
                return Ok(());
            }
            let run_for = Duration::from_secs(u64::from(command.remaining_minutes) * 60);
            if !motor_running {
                self.pins.pulse_start(self.pulse).await?;
                self.cutoff =
                    Some(self.timers.start(run_for, None, AgentTimer::CutoffExpired));
                info!(
                    "motor started for {} min (cutoff armed)",
                    command.remaining_minutes
                );
            } else {
                // Already running: re-arm the deadline, never re-pulse.
                match self.cutoff.as_mut() {
                    Some(handle) => self.timers.adjust(handle, run_for, None),
                    None => {
                        self.cutoff =
                            Some(self.timers.start(run_for, None, AgentTimer::CutoffExpired))
                    }
                }
                info!("cutoff moved to {} min from now", command.remaining_minutes);
            }
        } else if motor_running {
            self.pins.pulse_stop(self.pulse).await?;
            if let Some(mut handle) = self.cutoff.take() {
                handle.stop();
            }
            info!("motor stopped by command");
        }
        // motor off and line already off: nothing to do.

        Ok(())
    }

    /// The cutoff deadline elapsed: stop the motor and drop the spent handle.
    ///
    /// # Errors
    ///
    /// Returns [`ActuationError`] when the stop line refuses to drive.
    pub async fn on_cutoff_expired(&mut self) -> Result<(), ActuationError> {
        info!("cutoff elapsed; stopping motor");
        self.pins.pulse_stop(self.pulse).await?;
        self.cutoff = None;
        Ok(())
    }

    /// Whole minutes until the cutoff fires, 0 when none is armed.
    pub fn remaining_minutes(&self) -> u16 {
        self.cutoff
            .as_ref()
            .map(TimerHandle::remaining_minutes)
            .unwrap_or(0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
