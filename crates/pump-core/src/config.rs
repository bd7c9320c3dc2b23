//! Shared-secret configuration.
//!
//! The relay and every device share two secrets: the 16-bit client passcode
//! stamped into telemetry/command frames, and the AES-256 key that seals the
//! command path. Both are operational material that rotates with the
//! deployment, so they live in the TOML config files of both binaries and
//! are never compiled into the code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::seal::KEY_LEN;

/// Errors from parsing the secrets section.
#[derive(Debug, Error)]
pub enum SecretsError {
    /// The key is not valid hex.
    #[error("aes key is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// The decoded key is not exactly 32 bytes.
    #[error("aes key must be {KEY_LEN} bytes ({} hex chars), got {got} bytes", KEY_LEN * 2)]
    BadKeyLength { got: usize },
}

/// The `[secrets]` section shared by both binaries' config files.
///
/// ```toml
/// [secrets]
/// passcode = 39403
/// aes_key_hex = "000102…1f"   # 64 hex chars
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SharedSecrets {
    /// The 16-bit passcode embedded in telemetry and command frames and
    /// required of list queries.
    pub passcode: u16,
    /// The AES-256 key as 64 hex characters.
    pub aes_key_hex: String,
}

impl SharedSecrets {
    /// Decodes and validates the configured AES-256 key.
    ///
    /// # Errors
    ///
    /// Returns [`SecretsError`] when the hex is malformed or the decoded key
    /// is not exactly 32 bytes.
    pub fn key(&self) -> Result<[u8; KEY_LEN], SecretsError> {
        let bytes = hex::decode(&self.aes_key_hex)?;
        bytes
            .try_into()
            .map_err(|v: Vec<u8>| SecretsError::BadKeyLength { got: v.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets(key_hex: &str) -> SharedSecrets {
        SharedSecrets {
            passcode: 39403,
            aes_key_hex: key_hex.to_string(),
        }
    }

    #[test]
    fn test_valid_key_parses_to_32_bytes() {
        let hex64: String = "0123456789abcdef".repeat(4);
        let key = secrets(&hex64).key().unwrap();
        assert_eq!(key.len(), KEY_LEN);
        assert_eq!(key[0], 0x01);
    }

    #[test]
    fn test_short_key_is_rejected() {
        let result = secrets("0011223344").key();
        assert!(matches!(result, Err(SecretsError::BadKeyLength { got: 5 })));
    }

    #[test]
    fn test_non_hex_key_is_rejected() {
        let result = secrets(&"zz".repeat(32)).key();
        assert!(matches!(result, Err(SecretsError::InvalidHex(_))));
    }

    #[test]
    fn test_secrets_deserialize_from_toml() {
        let parsed: SharedSecrets = toml::from_str(
            r#"
            passcode = 39403
            aes_key_hex = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.passcode, 39403);
        assert!(parsed.key().is_ok());
    }
}
