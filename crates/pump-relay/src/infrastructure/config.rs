//! TOML configuration for the relay server.
//!
//! Example:
//!
//! ```toml
//! [network]
//! bind_address = "0.0.0.0"
//! port = 9482
//! max_connections = 8
//!
//! [devices]
//! known_ids = [1, 2]
//! inactivity_timeout_secs = 60
//!
//! [secrets]
//! passcode = 39403
//! aes_key_hex = "…64 hex chars…"
//! ```
//!
//! Every field except the secrets has a default, so a minimal file only
//! carries the `[secrets]` section. The secrets are deliberately defaultless:
//! key and passcode are deployment material, not code.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pump_core::config::SharedSecrets;
use pump_core::domain::DeviceId;

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
}

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    pub secrets: SharedSecrets,
}

/// Listener and connection-table settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// IP address to bind the listener to. `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port devices and clients connect to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Capacity of the connection table (devices and clients together). An
    /// accept with no free slot drops the socket without a reply.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// The fixed device set and its liveness window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DevicesConfig {
    /// Device ids the registry pre-creates slots for. Frames from any other
    /// id are ignored.
    #[serde(default = "default_known_ids")]
    pub known_ids: Vec<DeviceId>,
    /// Seconds of telemetry silence before a device's slot is unbound.
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            known_ids: default_known_ids(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
        }
    }
}

impl RelayConfig {
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
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    9482
}
fn default_max_connections() -> usize {
    8
}
fn default_known_ids() -> Vec<DeviceId> {
    vec![DeviceId(1), DeviceId(2)]
}
fn default_inactivity_timeout_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg: RelayConfig = toml::from_str(
            r#"
            [secrets]
            passcode = 39403
            aes_key_hex = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.network.port, 9482);
        assert_eq!(cfg.network.max_connections, 8);
        assert_eq!(cfg.devices.known_ids, vec![DeviceId(1), DeviceId(2)]);
        assert_eq!(cfg.devices.inactivity_timeout_secs, 60);
    }

    #[test]
    fn test_explicit_fields_override_defaults() {
        let cfg: RelayConfig = toml::from_str(
            r#"
            [network]
            port = 10000
            max_connections = 2

            [devices]
            known_ids = [5, 6, 7]
            inactivity_timeout_secs = 15

            [secrets]
            passcode = 1
            aes_key_hex = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.network.port, 10000);
        assert_eq!(cfg.network.max_connections, 2);
        assert_eq!(
            cfg.devices.known_ids,
            vec![DeviceId(5), DeviceId(6), DeviceId(7)]
        );
        assert_eq!(cfg.devices.inactivity_timeout_secs, 15);
    }

    #[test]
    fn test_missing_secrets_section_is_an_error() {
        let result: Result<RelayConfig, _> = toml::from_str("[network]\nport = 1\n");
        assert!(result.is_err(), "secrets must be explicit in the config");
    }
}
