//! In-mission time of day, driven by the host and mirrored on clients.

use crate::codec::{ByteReader, ByteWriter};
use crate::observer::{ObserverId, Observers};
use crate::replicated::{Loggable, Replicated, Role};
use crate::CodecError;

const SECONDS_PER_DAY: i32 = 24 * 3600;

/// Event delivered whenever the whole-second value changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeChanged {
    pub seconds: i32,
}

/// A clock counting seconds since midnight at an adjustable rate.
#[derive(Debug)]
pub struct SyncedClock {
    role: Role,
    seconds: i32,
    elapsed: f64,
    time_scale: f32,
    dirty: bool,
    observers: Observers<TimeChanged>,
}

impl SyncedClock {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            seconds: 0,
            elapsed: 0.0,
            time_scale: 1.0,
            dirty: false,
            observers: Observers::new(),
        }
    }

    pub fn seconds_of_day(hours: i32, minutes: i32, seconds: i32) -> i32 {
        3600 * hours + 60 * minutes + seconds
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&TimeChanged) + 'static) -> ObserverId {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.observers.unsubscribe(id)
    }

    fn changed(&mut self) {
        let event = TimeChanged {
            seconds: self.seconds,
        };
        self.observers.notify(&event);
    }

    /// Reset the clock to `hours:minutes:00`.
    ///
    /// # Panics
    ///
    /// Panics on a client.
    pub fn start(&mut self, hours: i32, minutes: i32) {
        assert!(self.role.is_host(), "SyncedClock::start is only valid on the host");
        self.seconds = Self::seconds_of_day(hours, minutes, 0);
        self.elapsed = f64::from(self.seconds);
        self.dirty = true;
        self.changed();
    }

    /// Advance by `dt` real seconds scaled by the time scale.
    ///
    /// # Panics
    ///
    /// Panics on a client.
    pub fn advance(&mut self, dt: f32) {
        assert!(self.role.is_host(), "SyncedClock::advance is only valid on the host");
        self.elapsed += f64::from(dt * self.time_scale);
        let whole = self.elapsed as i32;
        if whole == self.seconds {
            return;
        }
        self.seconds = whole;
        self.dirty = true;
        self.changed();
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale;
    }

    pub fn total_seconds(&self) -> i32 {
        self.seconds
    }

    pub fn hours(&self) -> i32 {
        self.seconds.rem_euclid(SECONDS_PER_DAY) / 3600
    }

    pub fn minutes(&self) -> i32 {
        (self.seconds % 3600) / 60
    }

    pub fn seconds(&self) -> i32 {
        self.seconds % 60
    }

    /// `HH:MM`
    pub fn hours_minutes_text(&self) -> String {
        format!("{:02}:{:02}", self.hours(), self.minutes())
    }

    /// `MM:SS`
    pub fn minutes_seconds_text(&self) -> String {
        format!("{:02}:{:02}", self.minutes(), self.seconds())
    }

    fn set_from_wire(&mut self, seconds: i32) {
        self.seconds = seconds;
        self.elapsed = f64::from(seconds);
        self.changed();
    }
}

impl Replicated for SyncedClock {
    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn write_full(&self, writer: &mut ByteWriter) {
        writer.write_i32(self.seconds);
    }

    fn write_delta(&self, writer: &mut ByteWriter) {
        assert!(self.dirty, "SyncedClock delta requested with nothing dirty");
        writer.write_i32(self.seconds);
    }

    fn read_full(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        let seconds = reader.read_i32()?;
        self.set_from_wire(seconds);
        Ok(())
    }

    fn read_delta(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        self.read_full(reader)
    }

    fn reset_dirty(&mut self) {
        self.dirty = false;
    }
}

impl Loggable for SyncedClock {
    fn write_state(&self, writer: &mut ByteWriter) {
        writer.write_i32(self.seconds);
    }

    fn read_state(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        let seconds = reader.read_i32()?;
        self.set_from_wire(seconds);
        self.dirty = true;
        Ok(())
    }
}
