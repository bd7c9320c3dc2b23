//! Binary codec for encoding and decoding PumpLink frames.
//!
//! All frames are fixed-layout byte arrays (see the structs in
//! [`crate::protocol::messages`] for per-field offsets). Multi-byte integers
//! are little-endian, matching the microcontroller firmware on the devices.
//!
//! Decoding returns a typed [`FrameRejected`] on any malformed, foreign, or
//! unauthenticated frame. Callers at the wire boundary drop rejected frames
//! without replying or closing the connection — silence toward the peer is
//! part of the protocol contract; the typed reason exists so tests and logs
//! can see why a frame died.

use thiserror::Error;

use crate::domain::{DeviceId, StatusBits};
use crate::protocol::messages::{
    CommandRelay, LinkMessage, ListQuery, ListResponse, MessageTag, MotorCommand,
    TelemetryQuery, TelemetryReport, TelemetryResponse, ADC_CHANNELS, ADC_MAX, FRAME_LEN,
    RELAY_FRAME_LEN, SEALED_LEN,
};

/// Why a frame was dropped at the decode boundary.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameRejected {
    /// The tag byte is not a recognized value.
    #[error("unknown tag: 0x{0:02X}")]
    UnknownTag(u8),

    /// The frame is shorter than its kind requires.
    #[error("short frame: need {needed} bytes, got {got}")]
    BadLength { needed: usize, got: usize },

    /// The embedded passcode does not match the shared constant.
    #[error("passcode mismatch")]
    PasscodeMismatch,

    /// A device-addressed frame names a different device than expected.
    #[error("frame addressed to {got}, expected {expected}")]
    WrongDevice { expected: DeviceId, got: DeviceId },

    /// A list response declares more ids than the frame can carry.
    #[error("list count {count} exceeds frame capacity")]
    BadCount { count: usize },
}

/// Errors that can occur while encoding a message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// More device ids than fit the fixed list-response layout.
    #[error("{count} device ids do not fit a list response frame")]
    ListOverflow { count: usize },
}

/// What the decoder validates embedded credentials against.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext {
    /// The shared client passcode; telemetry and command frames must carry it.
    pub passcode: u16,
    /// When set, command frames must be addressed to exactly this device.
    pub expected_device: Option<DeviceId>,
}

impl DecodeContext {
    /// Context used by the relay server: passcode-gated, any device id.
    pub fn server(passcode: u16) -> Self {
        Self {
            passcode,
            expected_device: None,
        }
    }

    /// Context used by a device agent: passcode-gated and addressed to `id`.
    pub fn device(passcode: u16, id: DeviceId) -> Self {
        Self {
            passcode,
            expected_device: Some(id),
        }
    }
}

/// Returns the total wire size of the frame starting with `tag_byte`,
/// or `None` when the tag is unrecognized.
///
/// A reader learns how many bytes to pull for the rest of the frame from its
/// first byte; every kind except the command relay occupies [`FRAME_LEN`].
pub fn wire_len(tag_byte: u8) -> Option<usize> {
    match MessageTag::try_from(tag_byte).ok()? {
        MessageTag::CommandRelay => Some(RELAY_FRAME_LEN),
        _ => Some(FRAME_LEN),
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes a [`LinkMessage`] into its wire frame.
///
/// `passcode` is stamped into the frames that carry one (telemetry and
/// command); the list query carries its own. Fields beyond a message's
/// meaningful layout are zero.
///
/// # Errors
///
/// Returns [`EncodeError::ListOverflow`] when a list response holds more ids
/// than the fixed frame can carry.
pub fn encode(msg: &LinkMessage, passcode: u16) -> Result<Vec<u8>, EncodeError> {
    match msg {
        LinkMessage::Telemetry(m) => Ok(encode_telemetry(m, passcode).to_vec()),
        LinkMessage::Command(m) => Ok(encode_command(m, passcode).to_vec()),
        LinkMessage::ListQuery(m) => {
            let mut buf = [0u8; FRAME_LEN];
            buf[0] = MessageTag::ListQuery as u8;
            buf[1..3].copy_from_slice(&m.passcode.to_le_bytes());
            Ok(buf.to_vec())
        }
        LinkMessage::TelemetryQuery(m) => {
            let mut buf = [0u8; FRAME_LEN];
            buf[0] = MessageTag::TelemetryQuery as u8;
            buf[1] = m.device_id.0;
            Ok(buf.to_vec())
        }
        LinkMessage::CommandRelay(m) => {
            let mut buf = vec![0u8; RELAY_FRAME_LEN];
            buf[0] = MessageTag::CommandRelay as u8;
            buf[1..].copy_from_slice(&m.sealed);
            Ok(buf)
        }
        LinkMessage::ListResponse(m) => {
            let count = m.device_ids.len();
            if count > FRAME_LEN - 2 {
                return Err(EncodeError::ListOverflow { count });
            }
            let mut buf = [0u8; FRAME_LEN];
            buf[0] = MessageTag::ListResponse as u8;
            buf[1] = count as u8;
            for (i, id) in m.device_ids.iter().enumerate() {
                buf[2 + i] = id.0;
            }
            Ok(buf.to_vec())
        }
        LinkMessage::TelemetryResponse(m) => {
            let mut buf = m.frame;
            buf[0] = MessageTag::TelemetryResponse as u8;
            Ok(buf.to_vec())
        }
    }
}

/// Packs a telemetry report into its 16-byte frame.
pub fn encode_telemetry(m: &TelemetryReport, passcode: u16) -> [u8; FRAME_LEN] {
    let mut buf = [0u8; FRAME_LEN];
    buf[0] = MessageTag::Telemetry as u8;
    buf[1..3].copy_from_slice(&passcode.to_le_bytes());
    buf[3] = m.device_id.0;
    buf[4] = m.rssi as u8;
    for (ch, &sample) in m.adc.iter().enumerate() {
        let sample = sample & ADC_MAX;
        buf[5 + 2 * ch] = (sample & 0xFF) as u8;
        buf[6 + 2 * ch] = ((sample >> 8) & 0x3) as u8;
    }
    buf[13..15].copy_from_slice(&m.remaining_minutes.to_le_bytes());
    buf[15] = m.status.0;
    buf
}

/// Packs a motor command into its 16-byte frame.
pub fn encode_command(m: &MotorCommand, passcode: u16) -> [u8; FRAME_LEN] {
    let mut buf = [0u8; FRAME_LEN];
    buf[0] = MessageTag::Command as u8;
    buf[1..3].copy_from_slice(&passcode.to_le_bytes());
    buf[3] = m.device_id.0;
    buf[4..6].copy_from_slice(&m.remaining_minutes.to_le_bytes());
    let mut bits = 0u8;
    if m.motor_on {
        bits |= 1 << 0;
    }
    if m.valve0_closed {
        bits |= 1 << 1;
    }
    if m.valve1_closed {
        bits |= 1 << 2;
    }
    buf[6] = bits;
    buf
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decodes one whole frame against `ctx`.
///
/// # Errors
///
/// Returns [`FrameRejected`] for an unknown tag, a short frame, a passcode
/// mismatch, or (when `ctx.expected_device` is set) a command addressed to a
/// different device. Callers at the wire drop the frame and move on.
pub fn decode(frame: &[u8], ctx: &DecodeContext) -> Result<LinkMessage, FrameRejected> {
    let &tag_byte = frame.first().ok_or(FrameRejected::BadLength {
        needed: 1,
        got: 0,
    })?;
    let tag = MessageTag::try_from(tag_byte).map_err(|_| FrameRejected::UnknownTag(tag_byte))?;

    let needed = match tag {
        MessageTag::CommandRelay => RELAY_FRAME_LEN,
        _ => FRAME_LEN,
    };
    if frame.len() < needed {
        return Err(FrameRejected::BadLength {
            needed,
            got: frame.len(),
        });
    }

    match tag {
        MessageTag::Telemetry => decode_telemetry(frame, ctx).map(LinkMessage::Telemetry),
        MessageTag::Command => decode_command(frame, ctx).map(LinkMessage::Command),
        MessageTag::ListQuery => {
            let passcode = u16::from_le_bytes([frame[1], frame[2]]);
            Ok(LinkMessage::ListQuery(ListQuery { passcode }))
        }
        MessageTag::TelemetryQuery => Ok(LinkMessage::TelemetryQuery(TelemetryQuery {
            device_id: DeviceId(frame[1]),
        })),
        MessageTag::CommandRelay => {
            let mut sealed = [0u8; SEALED_LEN];
            sealed.copy_from_slice(&frame[1..RELAY_FRAME_LEN]);
            Ok(LinkMessage::CommandRelay(CommandRelay { sealed }))
        }
        MessageTag::ListResponse => {
            let count = frame[1] as usize;
            if count > FRAME_LEN - 2 {
                return Err(FrameRejected::BadCount { count });
            }
            let device_ids = frame[2..2 + count].iter().map(|&b| DeviceId(b)).collect();
            Ok(LinkMessage::ListResponse(ListResponse { device_ids }))
        }
        MessageTag::TelemetryResponse => {
            let mut copy = [0u8; FRAME_LEN];
            copy.copy_from_slice(&frame[..FRAME_LEN]);
            Ok(LinkMessage::TelemetryResponse(TelemetryResponse { frame: copy }))
        }
    }
}

fn decode_telemetry(
    frame: &[u8],
    ctx: &DecodeContext,
) -> Result<TelemetryReport, FrameRejected> {
    check_passcode(frame, ctx)?;
    let mut adc = [0u16; ADC_CHANNELS];
    for (ch, sample) in adc.iter_mut().enumerate() {
        let lo = frame[5 + 2 * ch] as u16;
        let hi = (frame[6 + 2 * ch] & 0x3) as u16;
        *sample = (hi << 8) | lo;
    }
    Ok(TelemetryReport {
        device_id: DeviceId(frame[3]),
        rssi: frame[4] as i8,
        adc,
        remaining_minutes: u16::from_le_bytes([frame[13], frame[14]]),
        status: StatusBits(frame[15]),
    })
}

fn decode_command(frame: &[u8], ctx: &DecodeContext) -> Result<MotorCommand, FrameRejected> {
    check_passcode(frame, ctx)?;
    let device_id = DeviceId(frame[3]);
    if let Some(expected) = ctx.expected_device {
        if device_id != expected {
            return Err(FrameRejected::WrongDevice {
                expected,
                got: device_id,
            });
        }
    }
    let bits = frame[6];
    Ok(MotorCommand {
        device_id,
        remaining_minutes: u16::from_le_bytes([frame[4], frame[5]]),
        motor_on: bits & (1 << 0) != 0,
        valve0_closed: bits & (1 << 1) != 0,
        valve1_closed: bits & (1 << 2) != 0,
    })
}

fn check_passcode(frame: &[u8], ctx: &DecodeContext) -> Result<(), FrameRejected> {
    let embedded = u16::from_le_bytes([frame[1], frame[2]]);
    if embedded != ctx.passcode {
        return Err(FrameRejected::PasscodeMismatch);
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
