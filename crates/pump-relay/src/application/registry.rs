//! DeviceRegistry: the relay's in-memory table of device records.
//!
//! Every device id the deployment knows about gets one slot, created at
//! startup and never added to or removed. A slot is *bound* while a live
//! connection is associated with it (its device has reported telemetry
//! recently) and *unbound* otherwise. Binding starts a per-slot inactivity
//! timer; further telemetry reschedules that same timer, and its expiry — or
//! a read error on the connection — unbinds the slot again.
//!
//! The registry is owned exclusively by the broker task; the inactivity
//! timers deliver their device ids back into the broker's channel rather
//! than touching a slot themselves, so a slot is never mutated from two
//! places.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use pump_core::domain::{DeviceId, StatusBits};
use pump_core::protocol::messages::{ListResponse, TelemetryReport, ADC_CHANNELS, FRAME_LEN};
use pump_core::timer::{TimerHandle, TimerService};

/// Index of a connection in the server's bounded connection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnId(pub usize);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which stored frame a lookup wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// The last telemetry frame the device reported.
    Telemetry,
    /// The last command frame relayed to the device.
    CommandAck,
}

/// Errors from registry lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The id is not in the configured device set.
    #[error("{0} is not a configured device")]
    UnknownDevice(DeviceId),

    /// The device has no bound connection right now.
    #[error("{0} is offline")]
    DeviceOffline(DeviceId),

    /// The requested buffer has never been filled for this device.
    #[error("{id} has no stored {kind:?} frame")]
    NoBuffer { id: DeviceId, kind: BufferKind },
}

/// Read-only view of a slot for logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub online: bool,
    pub passcode: u16,
    pub last_rssi: i8,
    pub adc: [u16; ADC_CHANNELS],
    pub remaining_minutes: u16,
    pub status: StatusBits,
}

/// Outcome of storing a telemetry frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The slot was updated; `newly_bound` says whether this frame bound it.
    Stored { newly_bound: bool },
    /// The id is outside the configured set; nothing changed.
    UnknownDevice,
}

/// One pre-created record per configured device id.
#[derive(Debug)]
struct DeviceSlot {
    id: DeviceId,
    /// Last passcode the device reported (informational; frames are already
    /// authenticated at decode).
    passcode: u16,
    conn: Option<ConnId>,
    last_rssi: i8,
    adc: [u16; ADC_CHANNELS],
    remaining_minutes: u16,
    status: StatusBits,
    telemetry_frame: Option<[u8; FRAME_LEN]>,
    command_ack_frame: Option<[u8; FRAME_LEN]>,
    /// Present exactly while `conn` is present.
    inactivity: Option<TimerHandle<DeviceId>>,
}

impl DeviceSlot {
    fn unbound(id: DeviceId) -> Self {
        Self {
            id,
            passcode: 0,
            conn: None,
            last_rssi: 0,
            adc: [0; ADC_CHANNELS],
            remaining_minutes: 0,
            status: StatusBits::default(),
            telemetry_frame: None,
            command_ack_frame: None,
            inactivity: None,
        }
    }
}

/// The bounded device table.
pub struct DeviceRegistry {
    slots: Vec<DeviceSlot>,
    timers: TimerService<DeviceId>,
    inactivity_window: Duration,
    passcode: u16,
}

impl DeviceRegistry {
    /// Pre-creates one unbound slot per id in `known_ids`.
    ///
    /// `timers` must deliver into the channel the owning broker selects on;
    /// the event payload is the device id whose window elapsed.
    pub fn new(
        known_ids: &[DeviceId],
        timers: TimerService<DeviceId>,
        inactivity_window: Duration,
        passcode: u16,
    ) -> Self {
        Self {
            slots: known_ids.iter().copied().map(DeviceSlot::unbound).collect(),
            timers,
            inactivity_window,
            passcode,
        }
    }

    fn slot(&self, id: DeviceId) -> Option<&DeviceSlot> {
        self.slots.iter().find(|s| s.id == id)
    }

    fn slot_mut(&mut self, id: DeviceId) -> Option<&mut DeviceSlot> {
        self.slots.iter_mut().find(|s| s.id == id)
    }

    /// Stores a telemetry frame, binding the slot to `conn` if it was
    /// unbound and (re)arming the inactivity timer either way.
    ///
    /// An id outside the configured set leaves the registry unchanged.
    pub fn store_telemetry(
        &mut self,
        conn: ConnId,
        report: &TelemetryReport,
        raw_frame: [u8; FRAME_LEN],
    ) -> StoreOutcome {
        let window = self.inactivity_window;
        let timers = self.timers.clone();
        let passcode = self.passcode;
        let Some(slot) = self.slot_mut(report.device_id) else {
            debug!("telemetry from unconfigured {}; ignoring", report.device_id);
            return StoreOutcome::UnknownDevice;
        };

        let newly_bound = slot.conn.is_none();
        slot.passcode = passcode;
        slot.conn = Some(conn);
        slot.last_rssi = report.rssi;
        slot.adc = report.adc;
        slot.remaining_minutes = report.remaining_minutes;
        slot.status = report.status;
        slot.telemetry_frame = Some(raw_frame);

        // One timer per bound slot: arm it on first contact, reschedule the
        // same handle afterwards.
        match slot.inactivity.as_mut() {
            Some(handle) => timers.adjust(handle, window, None),
            None => slot.inactivity = Some(timers.start(window, None, slot.id)),
        }

        StoreOutcome::Stored { newly_bound }
    }

    /// Ids of all currently-bound slots, in slot order.
    pub fn build_list_response(&self) -> ListResponse {
        ListResponse {
            device_ids: self
                .slots
                .iter()
                .filter(|s| s.conn.is_some())
                .map(|s| s.id)
                .collect(),
        }
    }

    /// Returns a stored frame and the device's bound connection.
    ///
    /// # Errors
    ///
    /// [`RegistryError::UnknownDevice`] for an unconfigured id,
    /// [`RegistryError::DeviceOffline`] when no connection is bound, and
    /// [`RegistryError::NoBuffer`] when the requested frame was never stored.
    pub fn lookup_buffer(
        &self,
        id: DeviceId,
        kind: BufferKind,
    ) -> Result<([u8; FRAME_LEN], ConnId), RegistryError> {
        let slot = self.slot(id).ok_or(RegistryError::UnknownDevice(id))?;
        let conn = slot.conn.ok_or(RegistryError::DeviceOffline(id))?;
        let frame = match kind {
            BufferKind::Telemetry => slot.telemetry_frame,
            BufferKind::CommandAck => slot.command_ack_frame,
        };
        frame
            .map(|f| (f, conn))
            .ok_or(RegistryError::NoBuffer { id, kind })
    }

    /// Overwrites the slot's stored command-ack frame.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownDevice`] for an unconfigured id.
    pub fn store_command_ack(
        &mut self,
        id: DeviceId,
        frame: [u8; FRAME_LEN],
    ) -> Result<(), RegistryError> {
        let slot = self.slot_mut(id).ok_or(RegistryError::UnknownDevice(id))?;
        slot.command_ack_frame = Some(frame);
        Ok(())
    }

    /// The connection a device is currently bound to, if any.
    pub fn bound_conn(&self, id: DeviceId) -> Option<ConnId> {
        self.slot(id).and_then(|s| s.conn)
    }

    /// A read-only view of a slot's stored fields.
    pub fn snapshot(&self, id: DeviceId) -> Option<DeviceSnapshot> {
        self.slot(id).map(|s| DeviceSnapshot {
            id: s.id,
            online: s.conn.is_some(),
            passcode: s.passcode,
            last_rssi: s.last_rssi,
            adc: s.adc,
            remaining_minutes: s.remaining_minutes,
            status: s.status,
        })
    }

    /// Maps a connection back to the device bound to it, if any.
    pub fn device_for_conn(&self, conn: ConnId) -> Option<DeviceId> {
        self.slots
            .iter()
            .find(|s| s.conn == Some(conn))
            .map(|s| s.id)
    }

    /// Unbinds a slot: stops and drops the inactivity timer, clears the
    /// connection, and returns it so the caller can close the socket and
    /// free the connection slot.
    pub fn disconnect(&mut self, id: DeviceId) -> Option<ConnId> {
        let slot = self.slot_mut(id)?;
        if let Some(mut handle) = slot.inactivity.take() {
            handle.stop();
        }
        slot.conn.take()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
