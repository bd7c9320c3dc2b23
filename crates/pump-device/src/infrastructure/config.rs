//! TOML configuration for the device agent.
//!
//! Example:
//!
//! ```toml
//! [device]
//! id = 1
//!
//! [relay]
//! address = "192.168.193.106:9482"
//! reconnect_interval_secs = 10
//!
//! [telemetry]
//! period_secs = 30
//! publish_topic = "voltage/"
//!
//! [actuation]
//! start_pulse_ms = 200
//!
//! [secrets]
//! passcode = 39403
//! aes_key_hex = "…64 hex chars…"
//! ```
//!
//! As on the relay side, every field except the secrets has a default.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pump_core::config::SharedSecrets;
use pump_core::domain::DeviceId;

use crate::infrastructure::uplink::UplinkConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The relay address is not a valid socket address.
    #[error("invalid relay address {addr}: {source}")]
    BadRelayAddress {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

/// Top-level device configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
    #[serde(default)]
    pub actuation: ActuationSection,
    pub secrets: SharedSecrets,
}

/// Identity of this controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSection {
    /// This controller's id; commands addressed elsewhere are dropped.
    #[serde(default = "default_device_id")]
    pub id: DeviceId,
}

/// How to reach the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelaySection {
    /// `host:port` of the relay's listening socket.
    #[serde(default = "default_relay_address")]
    pub address: String,
    /// Backoff between redial attempts.
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,
}

/// Telemetry cadence and side-channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySection {
    /// Seconds between telemetry frames.
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
    /// Topic the JSON readout is published under.
    #[serde(default = "default_publish_topic")]
    pub publish_topic: String,
}

/// Physical actuation tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActuationSection {
    /// Contact-closure duration for start/stop pulses, in milliseconds.
    #[serde(default = "default_start_pulse_ms")]
    pub start_pulse_ms: u64,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            id: default_device_id(),
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            address: default_relay_address(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
        }
    }
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
            publish_topic: default_publish_topic(),
        }
    }
}

impl Default for ActuationSection {
    fn default() -> Self {
        Self {
            start_pulse_ms: default_start_pulse_ms(),
        }
    }
}

impl DeviceConfig {
    /// Loads and parses the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// The uplink settings, with the relay address parsed and validated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BadRelayAddress`] when the address does not
    /// parse.
    pub fn uplink(&self) -> Result<UplinkConfig, ConfigError> {
        let relay_addr: SocketAddr =
            self.relay
                .address
                .parse()
                .map_err(|source| ConfigError::BadRelayAddress {
                    addr: self.relay.address.clone(),
                    source,
                })?;
        Ok(UplinkConfig {
            relay_addr,
            reconnect_interval: Duration::from_secs(self.relay.reconnect_interval_secs),
        })
    }

    pub fn telemetry_period(&self) -> Duration {
        Duration::from_secs(self.telemetry.period_secs)
    }

    pub fn start_pulse(&self) -> Duration {
        Duration::from_millis(self.actuation.start_pulse_ms)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_device_id() -> DeviceId {
    DeviceId(1)
}
fn default_relay_address() -> String {
    "127.0.0.1:9482".to_string()
}
fn default_reconnect_interval_secs() -> u64 {
    10
}
fn default_period_secs() -> u64 {
    30
}
fn default_publish_topic() -> String {
    "voltage/".to_string()
}
fn default_start_pulse_ms() -> u64 {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRETS: &str = r#"
        [secrets]
        passcode = 39403
        aes_key_hex = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg: DeviceConfig = toml::from_str(SECRETS).unwrap();
        assert_eq!(cfg.device.id, DeviceId(1));
        assert_eq!(cfg.telemetry.period_secs, 30);
        assert_eq!(cfg.telemetry.publish_topic, "voltage/");
        assert_eq!(cfg.start_pulse(), Duration::from_millis(200));
        assert_eq!(cfg.uplink().unwrap().relay_addr.port(), 9482);
    }

    #[test]
    fn test_explicit_fields_override_defaults() {
        let text = format!(
            r#"
            [device]
            id = 2

            [relay]
            address = "10.1.2.3:7000"
            reconnect_interval_secs = 3

            [actuation]
            start_pulse_ms = 150
            {SECRETS}
            "#
        );
        let cfg: DeviceConfig = toml::from_str(&text).unwrap();
        assert_eq!(cfg.device.id, DeviceId(2));
        assert_eq!(cfg.uplink().unwrap().relay_addr.to_string(), "10.1.2.3:7000");
        assert_eq!(
            cfg.uplink().unwrap().reconnect_interval,
            Duration::from_secs(3)
        );
        assert_eq!(cfg.start_pulse(), Duration::from_millis(150));
    }

    #[test]
    fn test_unparseable_relay_address_is_an_error() {
        let text = format!(
            r#"
            [relay]
            address = "not-an-address"
            {SECRETS}
            "#
        );
        let cfg: DeviceConfig = toml::from_str(&text).unwrap();
        assert!(matches!(
            cfg.uplink(),
            Err(ConfigError::BadRelayAddress { .. })
        ));
    }
}
