//! Replicated mission-control panel state.
//!
//! [`MissionControlState`] carries the discrete panel fields (control state,
//! selected list entry, debrief slot, pause flag, scrub slider) packed into
//! two 32-bit words, plus the list of recorded missions available for
//! debriefing. The list is tracked separately and only retransmitted when it
//! changes.
//!
//! # Packing
//!
//! ```text
//! low  = (slider * 65535) & 0xFFFF | selected_entry << 16 | debrief_slot << 24
//! high = control_state & 0xF | pause << 4 | has_log_list << 30
//! ```
//!
//! The log list is `u8 count` followed by five bytes per entry
//! (`year - 2000, month, day, hour, minute`).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::codec::{ByteReader, ByteWriter};
use crate::observer::{ObserverId, Observers};
use crate::replicated::{Replicated, Role};
use crate::CodecError;

const PAUSE_SHIFT: u32 = 4;
const LOG_LIST_FLAG: u32 = 1 << 30;
const SLIDER_SCALE: f32 = u16::MAX as f32;

/// Largest number of log slots the list encoding can carry.
pub const MAX_LOG_SLOTS: usize = 255;

// ---------------------------------------------------------------------------
// ControlState
// ---------------------------------------------------------------------------

/// What the mission-control panel currently allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ControlState {
    /// A mission is running; selection is locked.
    Playing = 0,
    /// Free play; missions and debriefs can be selected.
    PlayingFree = 1,
    /// A recorded mission is being replayed.
    Replay = 2,
}

impl TryFrom<u32> for ControlState {
    type Error = CodecError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ControlState::Playing),
            1 => Ok(ControlState::PlayingFree),
            2 => Ok(ControlState::Replay),
            other => Err(CodecError::InvalidValue {
                field: "control_state",
                value: u64::from(other),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// LogSlotInfo
// ---------------------------------------------------------------------------

/// One recorded mission available for debriefing.
///
/// The path is only meaningful on the host and is never transmitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSlotInfo {
    /// Location of the log file (host only).
    pub path: Option<PathBuf>,
    /// Calendar year minus 2000.
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl LogSlotInfo {
    /// Human-readable label, e.g. `"07.03.2024  14:05"`.
    pub fn descriptive(&self) -> String {
        format!(
            "{:02}.{:02}.{}  {:02}:{:02}",
            self.day,
            self.month,
            2000 + u32::from(self.year),
            self.hour,
            self.minute
        )
    }

    /// Same date and time, ignoring the host-only path.
    pub fn same_timestamp(&self, other: &LogSlotInfo) -> bool {
        (self.year, self.month, self.day, self.hour, self.minute)
            == (other.year, other.month, other.day, other.hour, other.minute)
    }
}

// ---------------------------------------------------------------------------
// MissionControlState
// ---------------------------------------------------------------------------

/// Event delivered to observers after any change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChanged {
    pub control_state: ControlState,
    pub paused: bool,
}

/// The panel state shared between host and clients.
#[derive(Debug)]
pub struct MissionControlState {
    role: Role,
    control_state: ControlState,
    selected_entry: u8,
    debrief_slot: u8,
    paused: bool,
    slider_position: f32,
    logs: Vec<LogSlotInfo>,
    dirty: bool,
    logs_dirty: bool,
    observers: Observers<StateChanged>,
}

impl MissionControlState {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            control_state: ControlState::PlayingFree,
            selected_entry: 0,
            debrief_slot: 0,
            paused: false,
            slider_position: 0.0,
            logs: Vec::new(),
            dirty: false,
            logs_dirty: false,
            observers: Observers::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Register a callback for every change (host setters and client decodes).
    pub fn subscribe(&mut self, callback: impl FnMut(&StateChanged) + 'static) -> ObserverId {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    fn notify(&mut self) {
        let event = StateChanged {
            control_state: self.control_state,
            paused: self.paused,
        };
        self.observers.notify(&event);
    }

    fn assert_host(&self, setter: &str) {
        assert!(
            self.role.is_host(),
            "MissionControlState::{setter} may only be called on the host"
        );
    }

    fn mark_changed(&mut self) {
        self.dirty = true;
        self.notify();
    }

    // -- accessors ----------------------------------------------------------

    pub fn control_state(&self) -> ControlState {
        self.control_state
    }

    pub fn selected_entry(&self) -> u8 {
        self.selected_entry
    }

    pub fn debrief_slot(&self) -> u8 {
        self.debrief_slot
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn slider_position(&self) -> f32 {
        self.slider_position
    }

    pub fn logs(&self) -> &[LogSlotInfo] {
        &self.logs
    }

    /// Panel buttons accept input unless a mission is running.
    pub fn is_steerable(&self) -> bool {
        self.control_state != ControlState::Playing
    }

    /// Pause can be toggled unless a replay is showing.
    pub fn is_pausable(&self) -> bool {
        self.control_state != ControlState::Replay
    }

    // -- host setters -------------------------------------------------------
    //
    // Each panics on a client, and writing the current value changes nothing.

    pub fn set_control_state(&mut self, state: ControlState) {
        self.assert_host("set_control_state");
        if self.control_state != state {
            self.control_state = state;
            self.mark_changed();
        }
    }

    pub fn set_selected_entry(&mut self, entry: u8) {
        self.assert_host("set_selected_entry");
        if self.selected_entry != entry {
            self.selected_entry = entry;
            self.mark_changed();
        }
    }

    pub fn set_debrief_slot(&mut self, slot: u8) {
        self.assert_host("set_debrief_slot");
        if self.debrief_slot != slot {
            self.debrief_slot = slot;
            self.mark_changed();
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.assert_host("set_paused");
        if self.paused != paused {
            self.paused = paused;
            self.mark_changed();
        }
    }

    /// # Panics
    ///
    /// Panics if `position` is outside `[0, 1)` or on a client.
    pub fn set_slider_position(&mut self, position: f32) {
        self.assert_host("set_slider_position");
        assert!(
            (0.0..1.0).contains(&position),
            "slider position {position} outside [0, 1)"
        );
        if self.slider_position != position {
            self.slider_position = position;
            self.mark_changed();
        }
    }

    /// Replace the log directory. A list whose entries carry the same
    /// timestamps as the current one only refreshes the host-side paths and
    /// is not retransmitted.
    ///
    /// # Panics
    ///
    /// Panics if more than [`MAX_LOG_SLOTS`] entries are given or on a client.
    pub fn set_logs(&mut self, logs: Vec<LogSlotInfo>) {
        self.assert_host("set_logs");
        assert!(
            logs.len() <= MAX_LOG_SLOTS,
            "too many log slots: {} (max {MAX_LOG_SLOTS})",
            logs.len()
        );
        let unchanged = self.logs.len() == logs.len()
            && self.logs.iter().zip(&logs).all(|(a, b)| a.same_timestamp(b));
        self.logs = logs;
        if !unchanged {
            self.logs_dirty = true;
            self.mark_changed();
        }
    }

    // -- packing ------------------------------------------------------------

    fn encode_status(&self) -> (u32, u32) {
        let slider = (self.slider_position * SLIDER_SCALE) as u32 & 0xFFFF;
        let low = slider
            | u32::from(self.selected_entry) << 16
            | u32::from(self.debrief_slot) << 24;
        let mut high = self.control_state as u32;
        if self.paused {
            high |= 1 << PAUSE_SHIFT;
        }
        (high, low)
    }

    fn decode_status(&mut self, high: u32, low: u32) -> Result<(), CodecError> {
        let control_state = ControlState::try_from(high & 0xF)?;
        self.slider_position = (low & 0xFFFF) as f32 / SLIDER_SCALE;
        self.selected_entry = ((low >> 16) & 0xFF) as u8;
        self.debrief_slot = ((low >> 24) & 0xFF) as u8;
        self.control_state = control_state;
        self.paused = (high >> PAUSE_SHIFT) & 1 != 0;
        Ok(())
    }

    fn write_logs(&self, writer: &mut ByteWriter) {
        writer.write_u8(self.logs.len() as u8);
        for log in &self.logs {
            writer.write_u8(log.year);
            writer.write_u8(log.month);
            writer.write_u8(log.day);
            writer.write_u8(log.hour);
            writer.write_u8(log.minute);
        }
    }

    fn read_logs(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        let count = reader.read_u8()? as usize;
        let mut logs = Vec::with_capacity(count);
        for _ in 0..count {
            let bytes = reader.read_bytes(5)?;
            logs.push(LogSlotInfo {
                path: None,
                year: bytes[0],
                month: bytes[1],
                day: bytes[2],
                hour: bytes[3],
                minute: bytes[4],
            });
        }
        self.logs = logs;
        Ok(())
    }
}

impl Replicated for MissionControlState {
    fn is_dirty(&self) -> bool {
        self.dirty || self.logs_dirty
    }

    fn write_full(&self, writer: &mut ByteWriter) {
        let (high, low) = self.encode_status();
        writer.write_u32(high);
        writer.write_u32(low);
        self.write_logs(writer);
    }

    fn write_delta(&self, writer: &mut ByteWriter) {
        assert!(
            self.is_dirty(),
            "MissionControlState delta requested with nothing dirty"
        );
        let (mut high, low) = self.encode_status();
        if self.logs_dirty {
            high |= LOG_LIST_FLAG;
        }
        writer.write_u32(high);
        writer.write_u32(low);
        if self.logs_dirty {
            self.write_logs(writer);
        }
    }

    fn read_full(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        let high = reader.read_u32()?;
        let low = reader.read_u32()?;
        self.decode_status(high, low)?;
        self.read_logs(reader)?;
        self.notify();
        Ok(())
    }

    fn read_delta(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        let high = reader.read_u32()?;
        let low = reader.read_u32()?;
        self.decode_status(high, low)?;
        if high & LOG_LIST_FLAG != 0 {
            self.read_logs(reader)?;
        }
        self.logs_dirty = false;
        self.notify();
        Ok(())
    }

    fn reset_dirty(&mut self) {
        self.dirty = false;
        self.logs_dirty = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
