//! Domain types shared by the relay server and the device agent.
//!
//! Everything in this module is pure data and rules — no I/O, no clocks, no
//! sockets — so both binaries and their tests can depend on it freely.

mod device;
mod status;

pub use device::DeviceId;
pub use status::{StatusBits, ValvePair};
