//! The transport boundary and the replicator that feeds it.
//!
//! A [`Transport`] only has to deliver byte payloads reliably and in order.
//! Each payload travels in an [`Envelope`] tagged as a full state or a delta
//! and addressed to an [`EntityId`].
//!
//! # Frame layout
//!
//! ```text
//! u32 entity_id | u8 kind (0 = full, 1 = delta) | payload...
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tether_sync::codec::{ByteReader, ByteWriter};
use tether_sync::CodecError;
use tracing::{debug, trace};

use crate::registry::{EntityId, Registry};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EnvelopeKind {
    Full = 0,
    Delta = 1,
}

impl TryFrom<u8> for EnvelopeKind {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(EnvelopeKind::Full),
            1 => Ok(EnvelopeKind::Delta),
            other => Err(CodecError::InvalidValue {
                field: "envelope kind",
                value: u64::from(other),
            }),
        }
    }
}

/// One encoded state on its way to a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub kind: EnvelopeKind,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn full(payload: Vec<u8>) -> Self {
        Self {
            kind: EnvelopeKind::Full,
            payload,
        }
    }

    pub fn delta(payload: Vec<u8>) -> Self {
        Self {
            kind: EnvelopeKind::Delta,
            payload,
        }
    }

    /// Frame this envelope for `entity`.
    pub fn to_frame(&self, entity: EntityId) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(5 + self.payload.len());
        writer.write_u32(entity.0);
        writer.write_u8(self.kind as u8);
        writer.write_bytes(&self.payload);
        writer.into_bytes()
    }

    /// Split a frame back into its address and envelope.
    pub fn from_frame(frame: &[u8]) -> Result<(EntityId, Envelope), CodecError> {
        let mut reader = ByteReader::new(frame);
        let entity = EntityId(reader.read_u32()?);
        let kind = EnvelopeKind::try_from(reader.read_u8()?)?;
        let payload = reader.read_bytes(reader.remaining())?.to_vec();
        Ok((entity, Envelope { kind, payload }))
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Reliable, ordered delivery of envelopes between host and client.
pub trait Transport {
    fn send(&mut self, entity: EntityId, envelope: Envelope) -> Result<(), EngineError>;

    /// The next envelope that arrived, if any.
    fn receive(&mut self) -> Result<Option<(EntityId, Envelope)>, EngineError>;
}

type Queue = Rc<RefCell<VecDeque<Vec<u8>>>>;

/// One end of an in-memory transport pair.
///
/// Envelopes are framed on send and parsed on receive, so the wire layout is
/// exercised exactly as a network transport would.
#[derive(Debug)]
pub struct LoopbackTransport {
    outgoing: Queue,
    incoming: Queue,
}

impl LoopbackTransport {
    /// Two connected ends: what one sends, the other receives.
    pub fn pair() -> (Self, Self) {
        let a: Queue = Rc::default();
        let b: Queue = Rc::default();
        (
            Self {
                outgoing: Rc::clone(&a),
                incoming: Rc::clone(&b),
            },
            Self {
                outgoing: b,
                incoming: a,
            },
        )
    }

    /// Frames sent by the peer and not yet received.
    pub fn pending(&self) -> usize {
        self.incoming.borrow().len()
    }

    /// Drop every frame sent by the peer and not yet received.
    pub fn discard_pending(&mut self) -> usize {
        let mut incoming = self.incoming.borrow_mut();
        let dropped = incoming.len();
        incoming.clear();
        dropped
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, entity: EntityId, envelope: Envelope) -> Result<(), EngineError> {
        // The peer's end holds the other reference; without it nobody listens.
        if Rc::strong_count(&self.outgoing) < 2 {
            return Err(EngineError::TransportClosed);
        }
        self.outgoing.borrow_mut().push_back(envelope.to_frame(entity));
        Ok(())
    }

    fn receive(&mut self) -> Result<Option<(EntityId, Envelope)>, EngineError> {
        let frame = self.incoming.borrow_mut().pop_front();
        match frame {
            Some(frame) => Envelope::from_frame(&frame)
                .map(Some)
                .map_err(EngineError::Frame),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Replicator
// ---------------------------------------------------------------------------

/// Moves replicated entity state between a [`Registry`] and a [`Transport`].
#[derive(Debug, Clone, Default)]
pub struct Replicator {
    frames_sent: u64,
    bytes_sent: u64,
    frames_applied: u64,
}

impl Replicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn frames_applied(&self) -> u64 {
        self.frames_applied
    }

    fn send(
        &mut self,
        transport: &mut dyn Transport,
        entity: EntityId,
        envelope: Envelope,
    ) -> Result<(), EngineError> {
        trace!(%entity, kind = ?envelope.kind, bytes = envelope.payload.len(), "sending");
        self.frames_sent += 1;
        self.bytes_sent += envelope.payload.len() as u64;
        transport.send(entity, envelope)
    }

    /// Send the full state of every replicated entity, e.g. when a client
    /// connects. Every entity is clean afterwards.
    pub fn publish_full(&mut self, registry: &Registry, transport: &mut dyn Transport) -> Result<usize, EngineError> {
        let mut sent = 0;
        for (id, entity) in registry.replicated() {
            let payload = entity.borrow_mut().take_full();
            self.send(transport, id, Envelope::full(payload))?;
            sent += 1;
        }
        debug!(entities = sent, "published full state");
        Ok(sent)
    }

    /// Send a delta for every dirty replicated entity.
    pub fn publish_deltas(&mut self, registry: &Registry, transport: &mut dyn Transport) -> Result<usize, EngineError> {
        let mut sent = 0;
        for (id, entity) in registry.replicated() {
            let payload = entity.borrow_mut().take_delta();
            if let Some(payload) = payload {
                self.send(transport, id, Envelope::delta(payload))?;
                sent += 1;
            }
        }
        if sent > 0 {
            trace!(entities = sent, "published deltas");
        }
        Ok(sent)
    }

    /// Decode one envelope into the entity it is addressed to.
    pub fn apply(&mut self, registry: &Registry, entity: EntityId, envelope: &Envelope) -> Result<(), EngineError> {
        let handle = registry
            .replicated_entity(entity)
            .ok_or(EngineError::UnknownEntity(entity))?;
        let mut target = handle.borrow_mut();
        let decoded = match envelope.kind {
            EnvelopeKind::Full => target.decode_full(&envelope.payload),
            EnvelopeKind::Delta => target.decode_delta(&envelope.payload),
        };
        decoded.map_err(|source| EngineError::Decode { entity, source })?;
        self.frames_applied += 1;
        Ok(())
    }

    /// Apply everything the transport has delivered so far.
    pub fn drain(&mut self, registry: &Registry, transport: &mut dyn Transport) -> Result<usize, EngineError> {
        let mut applied = 0;
        while let Some((entity, envelope)) = transport.receive()? {
            self.apply(registry, entity, &envelope)?;
            applied += 1;
        }
        Ok(applied)
    }
}
