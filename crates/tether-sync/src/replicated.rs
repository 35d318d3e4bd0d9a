//! Dirty tracking and the full/delta replication contract.
//!
//! A [`ReplicatedField`] holds the authoritative value of one piece of state
//! next to the baseline that was last transmitted. Its tolerance predicate
//! decides whether a change is large enough to be worth sending. Aggregates
//! built from these fields implement [`Replicated`], which fixes how they are
//! encoded for the transport: a *full* state, or a *delta* carrying only the
//! dirty fields.
//!
//! Entities whose state should appear in the snapshot log implement
//! [`Loggable`]. Loggable state is always written in full, in a fixed layout,
//! so that blobs captured from several entities can simply be concatenated.
//!
//! # Example
//!
//! ```
//! use glam::Vec3;
//! use tether_sync::replicated::{Distance, ReplicatedField};
//!
//! let mut position = ReplicatedField::new(Vec3::ZERO, Distance(0.005));
//! position.set(Vec3::new(0.001, 0.0, 0.0));
//! assert!(!position.is_dirty());
//!
//! position.set(Vec3::new(0.01, 0.0, 0.0));
//! assert!(position.is_dirty());
//!
//! position.mark_sent();
//! assert!(!position.is_dirty());
//! assert_eq!(*position.last_sent(), Vec3::new(0.01, 0.0, 0.0));
//! ```

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::codec::{ByteReader, ByteWriter};
use crate::transform::angle_between_degrees;
use crate::CodecError;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Which side of a replicated value this process owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The authority: owns the true value and transmits it.
    Host,
    /// A receiver: decodes transmitted values and displays them.
    Client,
}

impl Role {
    pub fn is_host(self) -> bool {
        matches!(self, Role::Host)
    }
}

// ---------------------------------------------------------------------------
// Tolerance predicates
// ---------------------------------------------------------------------------

/// Decides whether two values differ enough to count as a change.
pub trait Tolerance<T> {
    /// Returns `true` if `current` differs from `baseline` beyond tolerance.
    fn exceeds(&self, current: &T, baseline: &T) -> bool;
}

/// Any inequality is a change. Used for enums, counters and flags.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Exact;

impl<T: PartialEq> Tolerance<T> for Exact {
    fn exceeds(&self, current: &T, baseline: &T) -> bool {
        current != baseline
    }
}

/// Euclidean distance strictly greater than the limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance(pub f32);

impl Tolerance<Vec3> for Distance {
    fn exceeds(&self, current: &Vec3, baseline: &Vec3) -> bool {
        current.distance(*baseline) > self.0
    }
}

impl Tolerance<f32> for Distance {
    fn exceeds(&self, current: &f32, baseline: &f32) -> bool {
        (current - baseline).abs() > self.0
    }
}

/// Angular difference strictly greater than the limit, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Angle(pub f32);

impl Tolerance<Quat> for Angle {
    fn exceeds(&self, current: &Quat, baseline: &Quat) -> bool {
        angle_between_degrees(*current, *baseline) > self.0
    }
}

// ---------------------------------------------------------------------------
// ReplicatedField
// ---------------------------------------------------------------------------

/// One authoritative value with its last-transmitted baseline.
///
/// Invariant: after [`mark_sent`](Self::mark_sent), `dirty` is false and the
/// baseline equals the authoritative value.
#[derive(Debug, Clone)]
pub struct ReplicatedField<T, P> {
    authoritative: T,
    last_sent: T,
    dirty: bool,
    predicate: P,
}

impl<T: Clone, P: Tolerance<T>> ReplicatedField<T, P> {
    /// Create a clean field whose baseline equals `value`.
    pub fn new(value: T, predicate: P) -> Self {
        Self {
            last_sent: value.clone(),
            authoritative: value,
            dirty: false,
            predicate,
        }
    }

    /// Store a new authoritative value.
    ///
    /// The field becomes dirty when the value exceeds the tolerance against
    /// the baseline. A change that stays inside tolerance is still stored
    /// but does not, by itself, make the field dirty. Returns the resulting
    /// dirty state.
    pub fn set(&mut self, value: T) -> bool {
        if self.predicate.exceeds(&value, &self.last_sent) {
            self.dirty = true;
        }
        self.authoritative = value;
        self.dirty
    }

    /// Store a value and mark the field dirty regardless of tolerance.
    pub fn force(&mut self, value: T) {
        self.authoritative = value;
        self.dirty = true;
    }

    /// Mark dirty without changing the value.
    pub fn force_dirty(&mut self) {
        self.dirty = true;
    }

    /// Record a completed transmission.
    pub fn mark_sent(&mut self) {
        self.last_sent = self.authoritative.clone();
        self.dirty = false;
    }

    /// Overwrite value and baseline together, leaving the field clean.
    ///
    /// Receivers use this when a decoded value arrives.
    pub fn overwrite(&mut self, value: T) {
        self.last_sent = value.clone();
        self.authoritative = value;
        self.dirty = false;
    }

    pub fn value(&self) -> &T {
        &self.authoritative
    }

    pub fn last_sent(&self) -> &T {
        &self.last_sent
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn predicate(&self) -> &P {
        &self.predicate
    }
}

// ---------------------------------------------------------------------------
// Replicated
// ---------------------------------------------------------------------------

/// An aggregate that can be transmitted as a full state or as a delta.
///
/// Implementors provide the four codec hooks plus dirty bookkeeping; the
/// provided methods wrap them into byte buffers and enforce the send
/// contract (encode, then reset dirty).
pub trait Replicated {
    /// Whether anything needs to be sent.
    fn is_dirty(&self) -> bool;

    /// Write every field.
    fn write_full(&self, writer: &mut ByteWriter);

    /// Write only what changed since the last send.
    ///
    /// Callers must check [`is_dirty`](Self::is_dirty) first.
    fn write_delta(&self, writer: &mut ByteWriter);

    /// Replace local state with a full encoding.
    fn read_full(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError>;

    /// Apply a delta encoding on top of local state.
    fn read_delta(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError>;

    /// Clear dirty flags and advance the baseline after a send.
    fn reset_dirty(&mut self);

    /// Encode a full state without touching dirty bookkeeping.
    fn encode_full(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        self.write_full(&mut writer);
        writer.into_bytes()
    }

    /// Encode a delta without touching dirty bookkeeping.
    ///
    /// # Panics
    ///
    /// Panics if nothing is dirty.
    fn encode_delta(&self) -> Vec<u8> {
        assert!(
            self.is_dirty(),
            "encode_delta called with nothing dirty; check is_dirty() first"
        );
        let mut writer = ByteWriter::new();
        self.write_delta(&mut writer);
        writer.into_bytes()
    }

    /// Encode a full state and record it as sent.
    fn take_full(&mut self) -> Vec<u8> {
        let bytes = self.encode_full();
        self.reset_dirty();
        bytes
    }

    /// Encode a delta if anything is dirty and record it as sent.
    fn take_delta(&mut self) -> Option<Vec<u8>> {
        if !self.is_dirty() {
            return None;
        }
        let bytes = self.encode_delta();
        self.reset_dirty();
        Some(bytes)
    }

    /// Decode a full encoding, rejecting trailing bytes.
    fn decode_full(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let mut reader = ByteReader::new(bytes);
        self.read_full(&mut reader)?;
        expect_exhausted(&reader)
    }

    /// Decode a delta encoding, rejecting trailing bytes.
    fn decode_delta(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let mut reader = ByteReader::new(bytes);
        self.read_delta(&mut reader)?;
        expect_exhausted(&reader)
    }
}

fn expect_exhausted(reader: &ByteReader<'_>) -> Result<(), CodecError> {
    if reader.is_exhausted() {
        Ok(())
    } else {
        Err(CodecError::TrailingBytes {
            remaining: reader.remaining(),
        })
    }
}

// ---------------------------------------------------------------------------
// Loggable
// ---------------------------------------------------------------------------

/// State that is captured into, and restored from, the snapshot log.
pub trait Loggable {
    /// Append this entity's full state.
    fn write_state(&self, writer: &mut ByteWriter);

    /// Restore this entity's state from the reader, consuming exactly what
    /// [`write_state`](Self::write_state) produced.
    fn read_state(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError>;
}

/// A slice of loggables logs as the concatenation of its elements, in order.
impl<L: Loggable> Loggable for [L] {
    fn write_state(&self, writer: &mut ByteWriter) {
        for loggable in self {
            loggable.write_state(writer);
        }
    }

    fn read_state(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        for loggable in self.iter_mut() {
            loggable.read_state(reader)?;
        }
        Ok(())
    }
}

impl<L: Loggable> Loggable for Vec<L> {
    fn write_state(&self, writer: &mut ByteWriter) {
        self.as_slice().write_state(writer);
    }

    fn read_state(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        self.as_mut_slice().read_state(reader)
    }
}

impl<L: Loggable + ?Sized> Loggable for Box<L> {
    fn write_state(&self, writer: &mut ByteWriter) {
        (**self).write_state(writer);
    }

    fn read_state(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        (**self).read_state(reader)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_changes_accumulate_until_tolerance() {
        let mut f = ReplicatedField::new(0.0f32, Distance(0.1));
        for step in 1..=5 {
            f.set(step as f32 * 0.02);
        }
        // 0.10 is not strictly greater than the limit.
        assert!(!f.is_dirty());
        f.set(0.12);
        assert!(f.is_dirty());
        assert_eq!(*f.last_sent(), 0.0);
    }

    #[test]
    fn dirty_sticks_until_sent() {
        let mut f = ReplicatedField::new(Vec3::ZERO, Distance(0.005));
        f.set(Vec3::X);
        // Moving back inside tolerance does not clear the pending change.
        f.set(Vec3::ZERO);
        assert!(f.is_dirty());
        f.mark_sent();
        assert!(!f.is_dirty());
        assert_eq!(*f.last_sent(), Vec3::ZERO);
    }

    #[test]
    fn exact_detects_any_change() {
        let mut f = ReplicatedField::new(3u8, Exact);
        assert!(!f.set(3));
        assert!(f.set(4));
    }

    #[test]
    fn angle_tolerance_in_degrees() {
        let mut f = ReplicatedField::new(Quat::IDENTITY, Angle(1.5));
        f.set(Quat::from_rotation_y(1.0f32.to_radians()));
        assert!(!f.is_dirty());
        f.set(Quat::from_rotation_y(2.0f32.to_radians()));
        assert!(f.is_dirty());
    }

    #[test]
    fn overwrite_leaves_field_clean() {
        let mut f = ReplicatedField::new(1u32, Exact);
        f.set(2);
        f.overwrite(9);
        assert!(!f.is_dirty());
        assert_eq!(*f.value(), 9);
        assert_eq!(*f.last_sent(), 9);
    }

    // -- Loggable slices ------------------------------------------------------

    #[derive(Debug, PartialEq)]
    struct Counter(i32);

    impl Loggable for Counter {
        fn write_state(&self, writer: &mut ByteWriter) {
            writer.write_i32(self.0);
        }

        fn read_state(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
            self.0 = reader.read_i32()?;
            Ok(())
        }
    }

    #[test]
    fn slice_logs_in_order() {
        let counters = vec![Counter(1), Counter(2), Counter(3)];
        let mut w = ByteWriter::new();
        counters.write_state(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[4..8], &2i32.to_le_bytes());

        let mut restored = vec![Counter(0), Counter(0), Counter(0)];
        restored
            .read_state(&mut ByteReader::new(&bytes))
            .unwrap();
        assert_eq!(restored, counters);
    }
}
