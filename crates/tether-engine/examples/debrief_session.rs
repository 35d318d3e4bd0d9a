//! Headless training session -- record a short mission, then replay it.
//!
//! Run with:
//!   cargo run --example debrief_session -p tether-engine
//!
//! Set `RUST_LOG=debug` to watch captures, sends and scrubs.

use std::cell::RefCell;
use std::rc::Rc;

use glam::{Quat, Vec3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use tether_engine::prelude::*;

const DT: f32 = 1.0 / 30.0;
const MISSION_SECONDS: f32 = 6.0;

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

/// Ends the mission (with a grace period) once enough time has passed.
struct Timer {
    elapsed: f32,
    limit: f32,
    running: bool,
}

impl Steerable for Timer {
    fn start_mission(&mut self, requires_reset: bool) {
        self.running = requires_reset;
        self.elapsed = 0.0;
    }

    fn start_debrief(&mut self) {
        self.running = false;
    }
}

impl Finishable for Timer {
    fn finish_status(&self) -> FinishStatus {
        if self.running && self.elapsed >= self.limit {
            FinishStatus::StopDelay
        } else {
            FinishStatus::Continue
        }
    }
}

struct Side {
    registry: Registry,
    panel: Shared<MissionControlState>,
    clock: Shared<SyncedClock>,
    item: Shared<TrackedItem>,
    journal: Shared<ScrollingLog>,
}

fn side(role: Role, anchor: RigidTransform, config: &EngineConfig) -> Result<Side, anyhow::Error> {
    let panel = Rc::new(RefCell::new(MissionControlState::new(role)));
    let clock = Rc::new(RefCell::new(SyncedClock::new(role)));
    let start = WorldPose {
        position: anchor.transform_point(Vec3::new(0.0, 1.0, 0.0)),
        rotation: anchor.rotation,
        scale: Vec3::ONE,
    };
    let item = Rc::new(RefCell::new(TrackedItem::new(role, anchor, start, &config.sync)));
    let journal = Rc::new(RefCell::new(ScrollingLog::new(config.scroll_log_lines)));

    let panel_id = EntityId::from_path("/Transfer/Anchor/Panel");
    let clock_id = EntityId::from_path("/Transfer/Anchor/Clock");
    let item_id = EntityId::from_path("/Transfer/Anchor/Drone");
    let journal_id = EntityId::from_path("/Transfer/Anchor/Journal");

    let mut registry = Registry::new();
    registry.register_replicated(panel_id, panel.clone())?;
    registry.register_replicated(clock_id, clock.clone())?;
    registry.register_replicated(item_id, item.clone())?;
    registry.register_replicated(journal_id, journal.clone())?;
    registry.register_synced(item_id, item.clone())?;
    if role.is_host() {
        registry.register_loggable(clock_id, clock.clone())?;
        registry.register_loggable(item_id, item.clone())?;
        registry.register_loggable(journal_id, journal.clone())?;
        registry.register_steerable(item_id, item.clone())?;
        registry.register_steerable(journal_id, journal.clone())?;
        registry.register_pausable(item_id, item.clone())?;
    }
    Ok(Side {
        registry,
        panel,
        clock,
        item,
        journal,
    })
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = EngineConfig {
        save_directory: std::env::temp_dir().join("tether-debrief-demo"),
        ..EngineConfig::default()
    };

    let host_side = side(Role::Host, RigidTransform::IDENTITY, &config)?;
    // The client calibrated its anchor two metres to the side and turned.
    let client_anchor = RigidTransform::new(Vec3::new(2.0, 0.0, 0.0), Quat::from_rotation_y(0.5));
    let client_side = side(Role::Client, client_anchor, &config)?;

    let timer = Rc::new(RefCell::new(Timer {
        elapsed: 0.0,
        limit: MISSION_SECONDS,
        running: false,
    }));
    let mut host_registry = host_side.registry;
    let timer_id = EntityId::from_path("/Transfer/Rules");
    host_registry.register_steerable(timer_id, timer.clone())?;
    host_registry.register_finishable(timer_id, timer.clone())?;

    let director = MissionDirector::new(&config, host_side.panel.clone())?;
    let (host_end, client_end) = LoopbackTransport::pair();
    let mut host = HostSession::new(host_registry, director, host_end);
    let mut client = ClientSession::new(client_side.registry, client_end);

    host_side.clock.borrow_mut().start(14, 0);
    host.start()?;
    client.tick()?;

    // -- mission ------------------------------------------------------------

    let mut rng = Pcg32::seed_from_u64(0x7e7e);
    host.handle(PanelCommand::GameStarted)?;
    let mut t = 0.0f32;
    while host.director().state() != DirectorState::InSelection {
        t += DT;
        timer.borrow_mut().elapsed = t;
        host_side.clock.borrow_mut().advance(DT * 60.0);

        let jitter = Vec3::new(rng.gen_range(-0.01..0.01), 0.0, rng.gen_range(-0.01..0.01));
        let pose = WorldPose {
            position: Vec3::new(t.sin(), 1.0, t.cos() - 1.0) + jitter,
            rotation: Quat::from_rotation_y(t),
            scale: Vec3::ONE,
        };
        host_side.item.borrow_mut().move_to(pose);

        if rng.gen_bool(0.02) {
            let clock = host_side.clock.borrow();
            host_side
                .journal
                .borrow_mut()
                .append_stamped(&clock, "waypoint reached");
        }

        host.tick(DT)?;
        client.tick()?;
    }

    let diagnostics = host.last_diagnostics();
    println!(
        "mission over after {} frames; last frame took {:?}",
        diagnostics.tick, diagnostics.total_time
    );
    println!(
        "host sent {} envelopes ({} bytes), client applied {}",
        host.replicator().frames_sent(),
        host.replicator().bytes_sent(),
        client.replicator().frames_applied()
    );
    {
        let panel = client_side.panel.borrow();
        for (slot, info) in panel.logs().iter().enumerate() {
            println!("  slot {slot}: {}", info.descriptive());
        }
    }

    // -- debrief ------------------------------------------------------------

    let newest = host_side.panel.borrow().logs().len().saturating_sub(1);
    let slot = u8::try_from(newest)?;
    host.handle(PanelCommand::EntrySelected(slot))?;
    host.handle(PanelCommand::DebriefStarted(slot))?;
    for step in 0..5u8 {
        host.handle(PanelCommand::SliderMoved(f32::from(step) * 0.2))?;
        for _ in 0..30 {
            host.tick(DT)?;
            client.tick()?;
        }
        let position = client_side.item.borrow().pose().position;
        println!(
            "slider {:.1}: clock {} drone at ({:.2}, {:.2}, {:.2}), journal: {:?}",
            f32::from(step) * 0.2,
            client_side.clock.borrow().hours_minutes_text(),
            position.x,
            position.y,
            position.z,
            client_side.journal.borrow().display_text(),
        );
    }

    println!("logs are kept in {}", host.director().save_directory().display());
    Ok(())
}
