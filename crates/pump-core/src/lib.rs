//! # pump-core
//!
//! Shared library for PumpLink containing the wire protocol codec, the
//! AES-CBC frame sealing layer, the timer service, and the domain types used
//! by both the relay server and the device agent.
//!
//! PumpLink connects a small fleet of remote motor/valve controllers
//! ("devices") to human operators through a central relay. Devices report
//! fixed-size binary telemetry frames over plain TCP; operators query the
//! relay and send motor commands that travel end-to-end encrypted from the
//! operator's client through the relay to the device.
//!
//! This crate defines:
//!
//! - **`protocol`** – the seven fixed-layout frame kinds, the codec that
//!   packs and unpacks them, and the single-block AES-256-CBC sealing used on
//!   the command path.
//!
//! - **`domain`** – device identity, the status-bit byte, and the valve-pair
//!   rule (exactly one valve is closed at any time).
//!
//! - **`timer`** – schedulable one-shot/periodic deadlines whose expiry is
//!   delivered as a typed event on a channel, so the owning task applies the
//!   effect itself instead of a callback racing it.
//!
//! - **`config`** – the shared-secret section (client passcode and AES-256
//!   key) that both binaries load from their TOML config files.

pub mod config;
pub mod domain;
pub mod protocol;
pub mod timer;

pub use config::{SecretsError, SharedSecrets};
pub use domain::{DeviceId, StatusBits, ValvePair};
pub use protocol::codec::{decode, encode, wire_len, DecodeContext, EncodeError, FrameRejected};
pub use protocol::messages::{LinkMessage, MessageTag, FRAME_LEN, RELAY_FRAME_LEN, SEALED_LEN};
pub use protocol::seal::{open, seal, SealError};
pub use timer::{TimerHandle, TimerService};
