//! Tether Engine -- mission orchestration over replicated, recorded state.
//!
//! This crate ties [`tether_sync`] and [`tether_log`] together:
//!
//! - [`registry::Registry`] holds shared entity handles grouped by capability
//!   (loggable, steerable, pausable, finishable, replicated, synced), in registration
//!   order.
//! - [`transport::Replicator`] publishes full and delta states of replicated
//!   entities over a [`transport::Transport`] and applies what arrives.
//! - [`director::MissionDirector`] runs the selection / mission / debrief
//!   state machine that starts, stops, saves and scrubs the snapshot log.
//! - [`session::HostSession`] and [`session::ClientSession`] drive all of the
//!   above once per frame.
//!
//! # Quick Start
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use tether_engine::prelude::*;
//!
//! let mut registry = Registry::new();
//! let clock = Rc::new(RefCell::new(SyncedClock::new(Role::Host)));
//! let id = EntityId::from_path("/Transfer/Clock");
//! registry.register_replicated(id, clock.clone()).unwrap();
//! registry.register_loggable(id, clock.clone()).unwrap();
//!
//! clock.borrow_mut().start(8, 0);
//! let (mut host_end, mut client_end) = LoopbackTransport::pair();
//! let mut replicator = Replicator::new();
//! assert_eq!(replicator.publish_deltas(&registry, &mut host_end).unwrap(), 1);
//! assert!(client_end.receive().unwrap().is_some());
//! ```

#![deny(unsafe_code)]

pub mod capability;
pub mod config;
pub mod director;
pub mod entity;
pub mod registry;
pub mod session;
pub mod transport;

use tether_log::LogError;
use tether_sync::CodecError;

use crate::registry::EntityId;

/// Re-export the sync crate for convenience.
pub use tether_sync;

/// Re-export the log crate for convenience.
pub use tether_log;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while moving state between entities and the transport.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A payload arrived for an entity that is not registered as replicated.
    #[error("no replicated entity registered for id {0}")]
    UnknownEntity(EntityId),

    /// A payload could not be decoded into its entity.
    #[error("failed to decode payload for entity {entity}: {source}")]
    Decode {
        entity: EntityId,
        #[source]
        source: CodecError,
    },

    /// A transport frame was not a valid envelope.
    #[error("malformed transport frame: {0}")]
    Frame(#[source] CodecError),

    /// The other end of the transport is gone.
    #[error("transport closed")]
    TransportClosed,

    /// Snapshot log persistence or playback failed.
    #[error(transparent)]
    Log(#[from] LogError),
}

/// Errors produced when registering entities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The id is already registered for this capability.
    #[error("entity {id} is already registered as {capability}")]
    Duplicate {
        id: EntityId,
        capability: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    // Re-export everything from the sync and log preludes.
    pub use tether_log::prelude::*;
    pub use tether_sync::prelude::*;

    // Engine-specific exports.
    pub use crate::capability::{FinishStatus, Finishable, FrameSync, Pausable, Steerable};
    pub use crate::config::EngineConfig;
    pub use crate::director::{DirectorState, MissionDirector, PanelCommand};
    pub use crate::entity::TrackedItem;
    pub use crate::registry::{EntityId, LoggableView, Registry, Shared};
    pub use crate::session::{ClientSession, HostSession, SessionDiagnostics};
    pub use crate::transport::{Envelope, EnvelopeKind, LoopbackTransport, Replicator, Transport};
    pub use crate::{EngineError, RegistryError};
}
