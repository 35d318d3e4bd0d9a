//! Host to client replication over the loopback transport.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use glam::{Quat, Vec3};
use proptest::prelude::*;
use tether_engine::prelude::*;

struct ScratchDir(PathBuf);

impl ScratchDir {
    fn new(name: &str) -> Self {
        Self(std::env::temp_dir().join(format!(
            "tether-replication-{name}-{}-{}",
            std::process::id(),
            ticks_since_epoch(std::time::SystemTime::now())
        )))
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn item_id() -> EntityId {
    EntityId::from_path("/Transfer/Anchor/Item")
}

fn panel_id() -> EntityId {
    EntityId::from_path("/Transfer/Anchor/Panel")
}

fn at(x: f32) -> WorldPose {
    WorldPose {
        position: Vec3::new(x, 0.0, 0.0),
        ..WorldPose::default()
    }
}

struct Pair {
    _scratch: ScratchDir,
    host: HostSession<LoopbackTransport>,
    client: ClientSession<LoopbackTransport>,
    host_item: Shared<TrackedItem>,
    client_item: Shared<TrackedItem>,
    client_panel: Shared<MissionControlState>,
}

/// A host and a client sharing one item and the panel. The client observes
/// the scene from an anchor placed elsewhere in its own world.
fn pair(name: &str, client_anchor: RigidTransform) -> Pair {
    let scratch = ScratchDir::new(name);
    let config = EngineConfig {
        save_directory: scratch.0.clone(),
        ..EngineConfig::default()
    };

    let host_panel = Rc::new(RefCell::new(MissionControlState::new(Role::Host)));
    let host_item = Rc::new(RefCell::new(TrackedItem::new(
        Role::Host,
        RigidTransform::IDENTITY,
        WorldPose::default(),
        &config.sync,
    )));
    let mut host_registry = Registry::new();
    host_registry.register_replicated(panel_id(), host_panel.clone()).unwrap();
    host_registry.register_replicated(item_id(), host_item.clone()).unwrap();
    host_registry.register_synced(item_id(), host_item.clone()).unwrap();
    host_registry.register_steerable(item_id(), host_item.clone()).unwrap();

    let client_panel = Rc::new(RefCell::new(MissionControlState::new(Role::Client)));
    let client_item = Rc::new(RefCell::new(TrackedItem::new(
        Role::Client,
        client_anchor,
        WorldPose {
            position: client_anchor.transform_point(Vec3::ZERO),
            rotation: client_anchor.rotation,
            scale: Vec3::ONE,
        },
        &config.sync,
    )));
    let mut client_registry = Registry::new();
    client_registry.register_replicated(panel_id(), client_panel.clone()).unwrap();
    client_registry.register_replicated(item_id(), client_item.clone()).unwrap();
    client_registry.register_synced(item_id(), client_item.clone()).unwrap();

    let (host_end, client_end) = LoopbackTransport::pair();
    let director = MissionDirector::new(&config, host_panel).unwrap();
    let mut host = HostSession::new(host_registry, director, host_end);
    let mut client = ClientSession::new(client_registry, client_end);
    host.start().unwrap();
    assert_eq!(client.tick().unwrap(), 2);

    Pair {
        _scratch: scratch,
        host,
        client,
        host_item,
        client_item,
        client_panel,
    }
}

impl Pair {
    fn frame(&mut self) -> usize {
        self.host.tick(0.1).unwrap();
        self.client.tick().unwrap()
    }
}

#[test]
fn connect_sends_every_entity_in_full() {
    let mut pair = pair("connect", RigidTransform::IDENTITY);
    assert_eq!(pair.host.replicator().frames_sent(), 2);
    assert_eq!(pair.client_panel.borrow().control_state(), ControlState::PlayingFree);
    // Nothing changed since the full state, so nothing is sent.
    assert_eq!(pair.frame(), 0);
}

#[test]
fn large_discrepancy_snaps_on_the_next_client_frame() {
    let mut pair = pair("snap", RigidTransform::IDENTITY);
    pair.host_item.borrow_mut().move_to(at(0.5));
    assert_eq!(pair.frame(), 1);
    assert_eq!(pair.client_item.borrow().pose().position, Vec3::new(0.5, 0.0, 0.0));
}

#[test]
fn small_discrepancy_closes_by_one_minus_damping_per_frame() {
    let mut pair = pair("damp", RigidTransform::IDENTITY);
    pair.host_item.borrow_mut().move_to(at(0.5));
    pair.frame();

    pair.host_item.borrow_mut().move_to(at(0.52));
    let before = pair.client_item.borrow().pose().position.x;
    assert_eq!(pair.frame(), 1);
    let after = pair.client_item.borrow().pose().position.x;
    let damping = ReconcileConfig::default().damping;
    assert!(((after - before) - (1.0 - damping) * 0.02).abs() < 1e-5);

    // Without new input the client keeps converging.
    let gap = 0.52 - after;
    assert_eq!(pair.frame(), 0);
    let next = pair.client_item.borrow().pose().position.x;
    assert!(((0.52 - next) - damping * gap).abs() < 1e-5);
}

#[test]
fn moves_within_tolerance_are_not_sent() {
    let mut pair = pair("tolerance", RigidTransform::IDENTITY);
    let tolerance = SendTolerances::default().position;
    pair.host_item.borrow_mut().move_to(at(tolerance * 0.5));
    assert_eq!(pair.frame(), 0);
    pair.host_item.borrow_mut().move_to(at(tolerance * 2.0));
    assert_eq!(pair.frame(), 1);
}

#[test]
fn client_sees_the_pose_relative_to_its_own_anchor() {
    let anchor = RigidTransform::new(
        Vec3::new(10.0, 0.0, -3.0),
        Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
    );
    let mut pair = pair("anchor", anchor);
    pair.host_item.borrow_mut().move_to(at(1.0));
    pair.frame();
    let expected = anchor.transform_point(Vec3::new(1.0, 0.0, 0.0));
    assert!(pair.client_item.borrow().pose().position.distance(expected) < 1e-4);
}

#[test]
fn panel_changes_follow_the_mission() {
    let mut pair = pair("panel", RigidTransform::IDENTITY);
    pair.host.handle(PanelCommand::GameStarted).unwrap();
    pair.frame();
    assert_eq!(pair.client_panel.borrow().control_state(), ControlState::Playing);
    pair.host.handle(PanelCommand::StopPressed).unwrap();
    pair.frame();
    let panel = pair.client_panel.borrow();
    assert_eq!(panel.control_state(), ControlState::PlayingFree);
    assert_eq!(panel.logs().len(), 1);
    assert_eq!(panel.logs()[0].path, None);
}

#[test]
fn envelope_for_an_unregistered_entity_is_rejected() {
    let (mut host_end, client_end) = LoopbackTransport::pair();
    host_end
        .send(EntityId::from_path("/Nowhere"), Envelope::full(vec![0; 4]))
        .unwrap();
    let mut client = ClientSession::new(Registry::new(), client_end);
    let err = client.tick().unwrap_err();
    assert!(matches!(err, EngineError::UnknownEntity(id) if id == EntityId::from_path("/Nowhere")));
    assert_eq!(client.transport_mut().pending(), 0);
}

#[test]
fn garbled_payload_names_the_entity() {
    let mut pair = pair("garbled", RigidTransform::IDENTITY);
    pair.host
        .transport_mut()
        .send(item_id(), Envelope::delta(vec![0xFF, 0xFF]))
        .unwrap();
    let err = pair.client.tick().unwrap_err();
    assert!(matches!(err, EngineError::Decode { entity, .. } if entity == item_id()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Once the host stops moving, the client settles within one send
    /// tolerance of the host's pose.
    #[test]
    fn client_converges_on_the_host(xs in proptest::collection::vec(-2.0f32..2.0, 1..6)) {
        let mut pair = pair("converge", RigidTransform::IDENTITY);
        for x in &xs {
            pair.host_item.borrow_mut().move_to(at(*x));
            pair.frame();
        }
        for _ in 0..80 {
            pair.frame();
        }
        let host = pair.host_item.borrow().sync().local_position();
        let client = pair.client_item.borrow().pose().position;
        let tolerance = SendTolerances::default().position;
        prop_assert!(host.distance(client) <= tolerance + 1e-4);
    }
}
