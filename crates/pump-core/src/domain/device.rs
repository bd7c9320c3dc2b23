//! Device identity.

use serde::{Deserialize, Serialize};

/// Stable identifier of a field controller.
///
/// Device ids are small integers assigned at installation time and listed in
/// the relay's configuration; they are not allocated dynamically. A frame
/// naming an id outside the configured set is ignored by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u8);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device-{}", self.0)
    }
}

impl From<u8> for DeviceId {
    fn from(raw: u8) -> Self {
        DeviceId(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_numeric_id() {
        assert_eq!(DeviceId(3).to_string(), "device-3");
    }

    #[test]
    fn test_ids_compare_by_value() {
        assert_eq!(DeviceId(1), DeviceId(1));
        assert_ne!(DeviceId(1), DeviceId(2));
        assert!(DeviceId(1) < DeviceId(2));
    }
}
