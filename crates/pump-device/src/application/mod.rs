//! Application layer of the device agent.
//!
//! - **`control`** – the actuation state machine: how a decoded motor
//!   command becomes start/stop pulses, valve line changes, and a cutoff
//!   timer, and what happens when that timer fires.
//! - **`telemetry`** – assembling the periodic telemetry report from the
//!   hardware ports, plus the engineering-units readout published on the
//!   JSON side-channel.
//!
//! Both use cases depend only on traits; the GPIO, ADC, and publisher
//! implementations are injected from the infrastructure layer.

pub mod control;
pub mod telemetry;

/// Timer events delivered into the agent's dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentTimer {
    /// The periodic telemetry deadline elapsed.
    TelemetryTick,
    /// The motor's commanded run time elapsed.
    CutoffExpired,
}
