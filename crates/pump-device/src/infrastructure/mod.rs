//! Infrastructure layer of the device agent.
//!
//! - **`gpio`** – pin-driver implementations (simulator and recording mock).
//! - **`adc`** – analog sampling implementations.
//! - **`publish`** – telemetry publisher implementations.
//! - **`uplink`** – the TCP connection to the relay, with redial logic.
//! - **`config`** – TOML configuration schema and loading.

pub mod adc;
pub mod config;
pub mod gpio;
pub mod publish;
pub mod uplink;
