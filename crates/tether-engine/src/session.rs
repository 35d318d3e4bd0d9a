//! Per-frame drivers for the host and for clients.
//!
//! A host frame samples poses, advances the [`MissionDirector`] and publishes
//! deltas. A client frame applies whatever arrived and then reconciles its
//! poses toward the received values.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::director::{MissionDirector, PanelCommand};
use crate::registry::Registry;
use crate::transport::{Replicator, Transport};
use crate::EngineError;

// ---------------------------------------------------------------------------
// SessionDiagnostics
// ---------------------------------------------------------------------------

/// Timing and traffic for the last host frame.
#[derive(Debug, Clone, Default)]
pub struct SessionDiagnostics {
    /// Frame number, starting at 1.
    pub tick: u64,
    /// Delta envelopes published this frame.
    pub frames: usize,
    /// Time spent in per-entity pose sampling.
    pub sync_time: Duration,
    /// Time spent in the mission director.
    pub director_time: Duration,
    /// Total time for the frame.
    pub total_time: Duration,
}

// ---------------------------------------------------------------------------
// HostSession
// ---------------------------------------------------------------------------

/// The authoritative side of a training session.
pub struct HostSession<T: Transport> {
    registry: Registry,
    director: MissionDirector,
    replicator: Replicator,
    transport: T,
    tick_count: u64,
    last_diagnostics: SessionDiagnostics,
}

impl<T: Transport> HostSession<T> {
    pub fn new(registry: Registry, director: MissionDirector, transport: T) -> Self {
        Self {
            registry,
            director,
            replicator: Replicator::new(),
            transport,
            tick_count: 0,
            last_diagnostics: SessionDiagnostics::default(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn director(&self) -> &MissionDirector {
        &self.director
    }

    pub fn replicator(&self) -> &Replicator {
        &self.replicator
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn last_diagnostics(&self) -> &SessionDiagnostics {
        &self.last_diagnostics
    }

    /// Enter free play and send the full state of every replicated entity.
    pub fn start(&mut self) -> Result<(), anyhow::Error> {
        self.director.start(&self.registry)?;
        self.connect()?;
        Ok(())
    }

    /// Send the full state of every replicated entity, e.g. to a client that
    /// just joined.
    pub fn connect(&mut self) -> Result<usize, EngineError> {
        let sent = self.replicator.publish_full(&self.registry, &mut self.transport)?;
        info!(entities = sent, "client connected");
        Ok(sent)
    }

    pub fn handle(&mut self, command: PanelCommand) -> Result<(), anyhow::Error> {
        self.director.handle(command, &self.registry)
    }

    /// Run one frame of `dt` seconds.
    pub fn tick(&mut self, dt: f32) -> Result<&SessionDiagnostics, anyhow::Error> {
        let frame_start = Instant::now();

        let sync_start = Instant::now();
        self.registry.sync_all();
        let sync_time = sync_start.elapsed();

        let director_start = Instant::now();
        self.director.tick(dt, &self.registry)?;
        let director_time = director_start.elapsed();

        let frames = self
            .replicator
            .publish_deltas(&self.registry, &mut self.transport)?;

        self.tick_count += 1;
        self.last_diagnostics = SessionDiagnostics {
            tick: self.tick_count,
            frames,
            sync_time,
            director_time,
            total_time: frame_start.elapsed(),
        };
        Ok(&self.last_diagnostics)
    }
}

// ---------------------------------------------------------------------------
// ClientSession
// ---------------------------------------------------------------------------

/// A replica that mirrors the host.
pub struct ClientSession<T: Transport> {
    registry: Registry,
    replicator: Replicator,
    transport: T,
}

impl<T: Transport> ClientSession<T> {
    pub fn new(registry: Registry, transport: T) -> Self {
        Self {
            registry,
            replicator: Replicator::new(),
            transport,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn replicator(&self) -> &Replicator {
        &self.replicator
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Apply every received envelope, then reconcile. Returns the number of
    /// envelopes applied.
    pub fn tick(&mut self) -> Result<usize, EngineError> {
        let applied = self.replicator.drain(&self.registry, &mut self.transport)?;
        self.registry.sync_all();
        if applied > 0 {
            debug!(applied, "client applied envelopes");
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tether_sync::clock::SyncedClock;
    use tether_sync::mission_state::MissionControlState;
    use tether_sync::replicated::Role;

    use crate::config::EngineConfig;
    use crate::registry::EntityId;
    use crate::transport::LoopbackTransport;

    fn scratch() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tether-session-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn host_frames_reach_the_client() {
        let root = scratch();
        let config = EngineConfig {
            save_directory: root.clone(),
            ..EngineConfig::default()
        };
        let clock_id = EntityId::from_path("/Clock");
        let panel_id = EntityId::from_path("/Panel");

        let host_clock = Rc::new(RefCell::new(SyncedClock::new(Role::Host)));
        let host_panel = Rc::new(RefCell::new(MissionControlState::new(Role::Host)));
        let mut host_registry = Registry::new();
        host_registry.register_replicated(clock_id, host_clock.clone()).unwrap();
        host_registry.register_replicated(panel_id, host_panel.clone()).unwrap();

        let client_clock = Rc::new(RefCell::new(SyncedClock::new(Role::Client)));
        let client_panel = Rc::new(RefCell::new(MissionControlState::new(Role::Client)));
        let mut client_registry = Registry::new();
        client_registry.register_replicated(clock_id, client_clock.clone()).unwrap();
        client_registry.register_replicated(panel_id, client_panel.clone()).unwrap();

        let (host_end, client_end) = LoopbackTransport::pair();
        let director = MissionDirector::new(&config, host_panel).unwrap();
        let mut host = HostSession::new(host_registry, director, host_end);
        let mut client = ClientSession::new(client_registry, client_end);

        host_clock.borrow_mut().start(9, 15);
        host.start().unwrap();
        assert_eq!(client.tick().unwrap(), 2);
        assert_eq!(client_clock.borrow().hours_minutes_text(), "09:15");

        host.handle(PanelCommand::GameStarted).unwrap();
        let diagnostics = host.tick(0.1).unwrap();
        assert_eq!(diagnostics.tick, 1);
        assert_eq!(diagnostics.frames, 1);
        client.tick().unwrap();
        assert!(!client_panel.borrow().is_steerable());

        let _ = std::fs::remove_dir_all(root);
    }
}
