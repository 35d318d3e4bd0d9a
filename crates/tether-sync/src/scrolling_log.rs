//! A bounded, replicated list of display lines.
//!
//! The host appends lines; only lines appended since the last send travel
//! in a delta. Clearing or restoring from a snapshot requests a full
//! rewrite, which the delta encoding signals with a leading zero count.

use std::collections::VecDeque;

use tracing::debug;

use crate::clock::SyncedClock;
use crate::codec::{ByteReader, ByteWriter};
use crate::replicated::{Loggable, Replicated};
use crate::CodecError;

/// Most lines a single delta can carry before falling back to a full state.
pub const MAX_DELTA_LINES: usize = u8::MAX as usize;

#[derive(Debug, Clone)]
pub struct ScrollingLog {
    capacity: usize,
    lines: VecDeque<String>,
    pending: Vec<String>,
    full_rewrite: bool,
    dirty: bool,
}

impl ScrollingLog {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ScrollingLog capacity must be positive");
        Self {
            capacity,
            lines: VecDeque::with_capacity(capacity),
            pending: Vec::new(),
            full_rewrite: false,
            dirty: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// All lines joined with trailing newlines, as shown on the panel.
    pub fn display_text(&self) -> String {
        self.lines.iter().fold(String::new(), |mut text, line| {
            text.push_str(line);
            text.push('\n');
            text
        })
    }

    fn push_line(&mut self, line: String) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn append(&mut self, line: impl Into<String>) {
        let line = line.into();
        self.push_line(line.clone());
        if !self.full_rewrite {
            self.pending.push(line);
            // Older pending lines would be evicted on the receiver anyway.
            if self.pending.len() > self.capacity.min(MAX_DELTA_LINES) {
                self.request_full_rewrite();
            }
        }
        self.dirty = true;
    }

    /// Append `text` prefixed with the clock's `HH:MM: `.
    pub fn append_stamped(&mut self, clock: &SyncedClock, text: &str) {
        self.append(format!("{}: {text}", clock.hours_minutes_text()));
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.request_full_rewrite();
    }

    fn request_full_rewrite(&mut self) {
        self.pending.clear();
        self.full_rewrite = true;
        self.dirty = true;
    }

    fn read_lines(&mut self, reader: &mut ByteReader<'_>, count: usize) -> Result<(), CodecError> {
        for _ in 0..count {
            let line = reader.read_string()?;
            self.push_line(line);
        }
        Ok(())
    }
}

impl Replicated for ScrollingLog {
    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn write_full(&self, writer: &mut ByteWriter) {
        writer.write_i32(self.lines.len() as i32);
        for line in &self.lines {
            writer.write_str(line);
        }
    }

    fn write_delta(&self, writer: &mut ByteWriter) {
        assert!(self.dirty, "ScrollingLog delta requested with nothing dirty");
        if self.full_rewrite || self.pending.is_empty() {
            writer.write_u8(0);
            self.write_full(writer);
        } else {
            writer.write_u8(self.pending.len() as u8);
            for line in &self.pending {
                writer.write_str(line);
            }
        }
    }

    fn read_full(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        let count = reader.read_i32()?;
        let count = usize::try_from(count).map_err(|_| CodecError::InvalidValue {
            field: "line_count",
            value: count as u64,
        })?;
        self.lines.clear();
        self.read_lines(reader, count)
    }

    fn read_delta(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        let count = reader.read_u8()?;
        self.dirty = false;
        if count == 0 {
            return self.read_full(reader);
        }
        debug!(count, "appending replicated log lines");
        self.read_lines(reader, usize::from(count))
    }

    fn reset_dirty(&mut self) {
        self.pending.clear();
        self.full_rewrite = false;
        self.dirty = false;
    }
}

impl Loggable for ScrollingLog {
    fn write_state(&self, writer: &mut ByteWriter) {
        self.write_full(writer);
    }

    fn read_state(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        self.read_full(reader)?;
        self.request_full_rewrite();
        Ok(())
    }
}
