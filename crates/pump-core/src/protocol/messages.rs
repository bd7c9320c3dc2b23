//! All PumpLink protocol message types.
//!
//! Seven frame kinds exist: one device→server report, one command, three
//! client→server queries, and two server→client responses. Field layouts are
//! documented on each struct; the packing itself lives in
//! [`crate::protocol::codec`].

use crate::domain::{DeviceId, StatusBits};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of every plaintext frame on the wire. Messages whose meaningful
/// fields are shorter are zero-padded to this length.
pub const FRAME_LEN: usize = 16;

/// Size of a sealed block: 16-byte IV followed by exactly one AES ciphertext
/// block.
pub const SEALED_LEN: usize = 32;

/// Size of a [`CommandRelay`] frame: the tag byte followed by a sealed block.
pub const RELAY_FRAME_LEN: usize = 1 + SEALED_LEN;

/// Number of ADC channels sampled per telemetry report.
pub const ADC_CHANNELS: usize = 4;

/// Largest value a 10-bit ADC sample can carry.
pub const ADC_MAX: u16 = 0x3FF;

// ── Message tags ──────────────────────────────────────────────────────────────

/// Frame tag byte, the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageTag {
    /// Periodic device→server status report ("A").
    Telemetry = 0x00,
    /// Motor/valve instruction for a device ("B").
    Command = 0x01,
    /// Client asks which devices are online ("C0").
    ListQuery = 0x02,
    /// Client asks for a device's last telemetry ("C1").
    TelemetryQuery = 0x03,
    /// Client relays a sealed command to a device ("C2").
    CommandRelay = 0x04,
    /// Server's answer to a list query ("D0").
    ListResponse = 0x05,
    /// Server's answer to a telemetry query ("D1").
    TelemetryResponse = 0x06,
}

impl TryFrom<u8> for MessageTag {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x00 => Ok(MessageTag::Telemetry),
            0x01 => Ok(MessageTag::Command),
            0x02 => Ok(MessageTag::ListQuery),
            0x03 => Ok(MessageTag::TelemetryQuery),
            0x04 => Ok(MessageTag::CommandRelay),
            0x05 => Ok(MessageTag::ListResponse),
            0x06 => Ok(MessageTag::TelemetryResponse),
            _ => Err(()),
        }
    }
}

// ── Per-message structs ───────────────────────────────────────────────────────

/// Telemetry (0x00): periodic device→server status report.
///
/// Layout: 0 tag, 1–2 passcode (LE), 3 device id, 4 signal strength (dBm,
/// signed), 5–12 four 10-bit ADC samples packed as (low byte, 2 high bits),
/// 13–14 remaining cutoff minutes (LE), 15 status byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryReport {
    pub device_id: DeviceId,
    /// Modem signal strength in dBm.
    pub rssi: i8,
    /// Raw 10-bit samples; values above [`ADC_MAX`] are masked on encode.
    pub adc: [u16; ADC_CHANNELS],
    /// Whole minutes until the motor cutoff fires, 0 when no cutoff is armed.
    pub remaining_minutes: u16,
    pub status: StatusBits,
}

/// Command (0x01): motor/valve instruction addressed to one device.
///
/// Layout: 0 tag, 1–2 passcode (LE), 3 device id, 4–5 remaining minutes
/// (LE), 6 bits {0 motor on, 1 valve 0 closed, 2 valve 1 closed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorCommand {
    pub device_id: DeviceId,
    /// Run duration in minutes before the automatic cutoff stops the motor.
    pub remaining_minutes: u16,
    pub motor_on: bool,
    pub valve0_closed: bool,
    pub valve1_closed: bool,
}

/// ListQuery (0x02): client asks for the ids of currently-online devices.
///
/// The embedded passcode is carried up to the dispatch layer — the server
/// decides there whether to answer, so an authentication failure can drop
/// the response without rejecting the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    pub passcode: u16,
}

/// TelemetryQuery (0x03): client asks for a device's last stored telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryQuery {
    pub device_id: DeviceId,
}

/// CommandRelay (0x04): a sealed [`MotorCommand`] travelling client→server.
///
/// The sealed block is opaque to the client-facing framing: IV followed by
/// one ciphertext block whose plaintext is a complete Command frame. The
/// server opens it, records the command, and forwards it re-sealed (same IV)
/// to the addressed device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRelay {
    pub sealed: [u8; SEALED_LEN],
}

/// ListResponse (0x05): tag, count, then one id byte per online device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListResponse {
    pub device_ids: Vec<DeviceId>,
}

/// TelemetryResponse (0x06): a verbatim copy of the stored telemetry frame
/// with the tag byte rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryResponse {
    pub frame: [u8; FRAME_LEN],
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All valid PumpLink messages, discriminated by tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMessage {
    Telemetry(TelemetryReport),
    Command(MotorCommand),
    ListQuery(ListQuery),
    TelemetryQuery(TelemetryQuery),
    CommandRelay(CommandRelay),
    ListResponse(ListResponse),
    TelemetryResponse(TelemetryResponse),
}

impl LinkMessage {
    /// Returns the [`MessageTag`] discriminant for this message.
    pub fn tag(&self) -> MessageTag {
        match self {
            LinkMessage::Telemetry(_) => MessageTag::Telemetry,
            LinkMessage::Command(_) => MessageTag::Command,
            LinkMessage::ListQuery(_) => MessageTag::ListQuery,
            LinkMessage::TelemetryQuery(_) => MessageTag::TelemetryQuery,
            LinkMessage::CommandRelay(_) => MessageTag::CommandRelay,
            LinkMessage::ListResponse(_) => MessageTag::ListResponse,
            LinkMessage::TelemetryResponse(_) => MessageTag::TelemetryResponse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_values_are_stable() {
        // The tag values are the wire contract; renumbering breaks deployed
        // devices.
        assert_eq!(MessageTag::Telemetry as u8, 0x00);
        assert_eq!(MessageTag::Command as u8, 0x01);
        assert_eq!(MessageTag::ListQuery as u8, 0x02);
        assert_eq!(MessageTag::TelemetryQuery as u8, 0x03);
        assert_eq!(MessageTag::CommandRelay as u8, 0x04);
        assert_eq!(MessageTag::ListResponse as u8, 0x05);
        assert_eq!(MessageTag::TelemetryResponse as u8, 0x06);
    }

    #[test]
    fn test_try_from_rejects_unknown_tag() {
        assert!(MessageTag::try_from(0x07).is_err());
        assert!(MessageTag::try_from(0xFF).is_err());
    }

    #[test]
    fn test_try_from_round_trips_all_tags() {
        for tag in [
            MessageTag::Telemetry,
            MessageTag::Command,
            MessageTag::ListQuery,
            MessageTag::TelemetryQuery,
            MessageTag::CommandRelay,
            MessageTag::ListResponse,
            MessageTag::TelemetryResponse,
        ] {
            assert_eq!(MessageTag::try_from(tag as u8), Ok(tag));
        }
    }
}
