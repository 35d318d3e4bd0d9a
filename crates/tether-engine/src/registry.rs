//! Entity identity and capability registration.
//!
//! Entities are addressed by an [`EntityId`] derived from their hierarchical
//! path, so host and clients agree on ids without exchanging them. Each
//! capability keeps its own list of shared handles; iteration always follows
//! registration order, which also fixes the byte layout of snapshot blobs.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tether_sync::codec::{ByteReader, ByteWriter};
use tether_sync::replicated::{Loggable, Replicated};
use tether_sync::CodecError;

use crate::capability::{FinishStatus, Finishable, FrameSync, Pausable, Steerable};
use crate::RegistryError;

/// A shared, single-threaded entity handle.
pub type Shared<T> = Rc<RefCell<T>>;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// Stable id of a networked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl EntityId {
    /// First four bytes (little-endian) of the BLAKE3 hash of `path`.
    ///
    /// ```
    /// use tether_engine::registry::EntityId;
    /// let a = EntityId::from_path("/Transfer/Anchor/Panel");
    /// assert_eq!(a, EntityId::from_path("/Transfer/Anchor/Panel"));
    /// assert_ne!(a, EntityId::from_path("/Transfer/Anchor/Clock"));
    /// ```
    pub fn from_path(path: &str) -> Self {
        let hash = blake3::hash(path.as_bytes());
        let bytes = hash.as_bytes();
        Self(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type Entries<T> = Vec<(EntityId, Shared<T>)>;

fn insert<T: ?Sized>(
    entries: &mut Entries<T>,
    capability: &'static str,
    id: EntityId,
    handle: Shared<T>,
) -> Result<(), RegistryError> {
    if entries.iter().any(|(existing, _)| *existing == id) {
        return Err(RegistryError::Duplicate { id, capability });
    }
    tracing::debug!(%id, capability, "registered entity");
    entries.push((id, handle));
    Ok(())
}

/// Shared entity handles grouped by capability.
#[derive(Default)]
pub struct Registry {
    loggables: Entries<dyn Loggable>,
    steerables: Entries<dyn Steerable>,
    pausables: Entries<dyn Pausable>,
    finishables: Entries<dyn Finishable>,
    replicated: Entries<dyn Replicated>,
    synced: Entries<dyn FrameSync>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("loggables", &self.loggables.len())
            .field("steerables", &self.steerables.len())
            .field("pausables", &self.pausables.len())
            .field("finishables", &self.finishables.len())
            .field("replicated", &self.replicated.len())
            .field("synced", &self.synced.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // -- registration -------------------------------------------------------

    pub fn register_loggable(&mut self, id: EntityId, handle: Shared<dyn Loggable>) -> Result<(), RegistryError> {
        insert(&mut self.loggables, "loggable", id, handle)
    }

    pub fn register_steerable(&mut self, id: EntityId, handle: Shared<dyn Steerable>) -> Result<(), RegistryError> {
        insert(&mut self.steerables, "steerable", id, handle)
    }

    pub fn register_pausable(&mut self, id: EntityId, handle: Shared<dyn Pausable>) -> Result<(), RegistryError> {
        insert(&mut self.pausables, "pausable", id, handle)
    }

    pub fn register_finishable(&mut self, id: EntityId, handle: Shared<dyn Finishable>) -> Result<(), RegistryError> {
        insert(&mut self.finishables, "finishable", id, handle)
    }

    pub fn register_replicated(&mut self, id: EntityId, handle: Shared<dyn Replicated>) -> Result<(), RegistryError> {
        insert(&mut self.replicated, "replicated", id, handle)
    }

    pub fn register_synced(&mut self, id: EntityId, handle: Shared<dyn FrameSync>) -> Result<(), RegistryError> {
        insert(&mut self.synced, "synced", id, handle)
    }

    // -- enumeration --------------------------------------------------------

    pub fn loggables(&self) -> LoggableView<'_> {
        LoggableView(&self.loggables)
    }

    pub fn replicated(&self) -> impl Iterator<Item = (EntityId, &Shared<dyn Replicated>)> {
        self.replicated.iter().map(|(id, handle)| (*id, handle))
    }

    pub fn replicated_entity(&self, id: EntityId) -> Option<&Shared<dyn Replicated>> {
        self.replicated
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, handle)| handle)
    }

    pub fn replicated_count(&self) -> usize {
        self.replicated.len()
    }

    // -- broadcast ----------------------------------------------------------

    /// Run per-frame pose work on every synced entity.
    pub fn sync_all(&self) {
        for (_, synced) in &self.synced {
            synced.borrow_mut().sync_frame();
        }
    }

    pub fn start_mission(&self, requires_reset: bool) {
        for (_, steerable) in &self.steerables {
            steerable.borrow_mut().start_mission(requires_reset);
        }
    }

    pub fn start_debrief(&self) {
        for (_, steerable) in &self.steerables {
            steerable.borrow_mut().start_debrief();
        }
    }

    pub fn set_paused(&self, paused: bool) {
        for (_, pausable) in &self.pausables {
            pausable.borrow_mut().set_paused(paused);
        }
    }

    /// The most urgent status any finishable reports.
    ///
    /// `StopImmediate` wins over `StopDelay`, which wins over `Continue`.
    pub fn finish_status(&self) -> FinishStatus {
        let mut status = FinishStatus::Continue;
        for (_, finishable) in &self.finishables {
            match finishable.borrow().finish_status() {
                FinishStatus::StopImmediate => return FinishStatus::StopImmediate,
                FinishStatus::StopDelay => status = FinishStatus::StopDelay,
                FinishStatus::Continue => {}
            }
        }
        status
    }
}

// ---------------------------------------------------------------------------
// LoggableView
// ---------------------------------------------------------------------------

/// Every registered loggable, logged back to back in registration order.
pub struct LoggableView<'a>(&'a [(EntityId, Shared<dyn Loggable>)]);

impl LoggableView<'_> {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Loggable for LoggableView<'_> {
    fn write_state(&self, writer: &mut ByteWriter) {
        for (_, loggable) in self.0 {
            loggable.borrow().write_state(writer);
        }
    }

    fn read_state(&mut self, reader: &mut ByteReader<'_>) -> Result<(), CodecError> {
        for (_, loggable) in self.0 {
            loggable.borrow_mut().read_state(reader)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tether_sync::clock::SyncedClock;
    use tether_sync::replicated::Role;

    struct Flag(FinishStatus);

    impl Finishable for Flag {
        fn finish_status(&self) -> FinishStatus {
            self.0
        }
    }

    struct PauseProbe(Rc<Cell<bool>>);

    impl Pausable for PauseProbe {
        fn set_paused(&mut self, paused: bool) {
            self.0.set(paused);
        }
    }

    #[test]
    fn path_ids_are_stable_and_displayed_as_hex() {
        let id = EntityId::from_path("/Transfer/Anchor/Panel");
        let hash = blake3::hash(b"/Transfer/Anchor/Panel");
        let expected = u32::from_le_bytes(hash.as_bytes()[..4].try_into().unwrap());
        assert_eq!(id.0, expected);
        assert_eq!(id.to_string().len(), 8);
    }

    #[test]
    fn duplicate_within_capability_is_rejected() {
        let mut registry = Registry::new();
        let id = EntityId::from_path("/Clock");
        let clock = Rc::new(RefCell::new(SyncedClock::new(Role::Host)));
        registry.register_loggable(id, clock.clone()).unwrap();
        // Same id in another capability is fine.
        registry.register_replicated(id, clock.clone()).unwrap();
        assert_eq!(
            registry.register_loggable(id, clock),
            Err(RegistryError::Duplicate {
                id,
                capability: "loggable"
            })
        );
    }

    #[test]
    fn immediate_stop_outranks_delay() {
        let mut registry = Registry::new();
        assert_eq!(registry.finish_status(), FinishStatus::Continue);
        let delay = Rc::new(RefCell::new(Flag(FinishStatus::StopDelay)));
        registry.register_finishable(EntityId(1), delay).unwrap();
        assert_eq!(registry.finish_status(), FinishStatus::StopDelay);
        let now = Rc::new(RefCell::new(Flag(FinishStatus::StopImmediate)));
        registry.register_finishable(EntityId(2), now).unwrap();
        assert_eq!(registry.finish_status(), FinishStatus::StopImmediate);
    }

    #[test]
    fn pause_reaches_every_pausable() {
        let mut registry = Registry::new();
        let seen = Rc::new(Cell::new(false));
        registry
            .register_pausable(EntityId(1), Rc::new(RefCell::new(PauseProbe(Rc::clone(&seen)))))
            .unwrap();
        registry.set_paused(true);
        assert!(seen.get());
    }

    #[test]
    fn loggable_view_concatenates_in_order() {
        let mut registry = Registry::new();
        let first = Rc::new(RefCell::new(SyncedClock::new(Role::Host)));
        let second = Rc::new(RefCell::new(SyncedClock::new(Role::Host)));
        first.borrow_mut().start(1, 0);
        second.borrow_mut().start(2, 0);
        registry.register_loggable(EntityId(1), first.clone()).unwrap();
        registry.register_loggable(EntityId(2), second.clone()).unwrap();

        let mut writer = ByteWriter::new();
        registry.loggables().write_state(&mut writer);
        let blob = writer.into_bytes();
        assert_eq!(&blob[..4], &3600i32.to_le_bytes());
        assert_eq!(&blob[4..], &7200i32.to_le_bytes());

        first.borrow_mut().start(5, 0);
        second.borrow_mut().start(6, 0);
        registry
            .loggables()
            .read_state(&mut ByteReader::new(&blob))
            .unwrap();
        assert_eq!(first.borrow().hours(), 1);
        assert_eq!(second.borrow().hours(), 2);
    }
}
