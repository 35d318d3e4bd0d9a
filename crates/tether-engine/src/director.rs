//! The mission / debrief state machine.
//!
//! ```text
//!              GameStarted                  StopDelay
//! InSelection -----------> Mission ---------------------> WaitingForFinish
//!     ^  |                    |                                  |
//!     |  |                    | StopImmediate / StopPressed      | 2 x interval
//!     |  |                    v                                  v
//!     |  |               save log, rescan  <----------------------
//!     |  | DebriefStarted(slot)
//!     |  v
//!   Debriefing  (slider changes scrub the loaded log)
//! ```
//!
//! The director owns the snapshot log and drives every registered
//! capability: steerables on mission and debrief start, pausables on pause,
//! loggables for capture and scrub, finishables to end a mission. Panel
//! input arrives as [`PanelCommand`] values and is ignored whenever the
//! replicated panel state would not accept it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tether_log::directory::{slot_path, LogDirectory};
use tether_log::snapshot_log::SnapshotLog;
use tether_sync::mission_state::{ControlState, LogSlotInfo, MissionControlState};
use tracing::{debug, info, warn};

use crate::capability::FinishStatus;
use crate::config::EngineConfig;
use crate::registry::{Registry, Shared};

/// Largest slider value below one.
const SLIDER_MAX: f32 = 0.999_999_94;

/// Phase of the training session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectorState {
    InSelection,
    Mission,
    WaitingForFinish,
    Debriefing,
}

/// Input from the mission-control panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanelCommand {
    /// Start a recorded mission.
    GameStarted,
    /// Replay the log in the given slot.
    DebriefStarted(u8),
    PauseToggled,
    /// Debrief scrub position in `[0, 1)`; larger values are clamped.
    SliderMoved(f32),
    /// Highlight an entry of the log list.
    EntrySelected(u8),
    /// End the running mission immediately.
    StopPressed,
}

pub struct MissionDirector {
    state: DirectorState,
    log: SnapshotLog,
    directory: LogDirectory,
    panel: Shared<MissionControlState>,
    slots: Vec<LogSlotInfo>,
    log_file_open: bool,
    paused: bool,
    stop_requested: bool,
    waiting_for: f32,
    last_slider: f32,
    last_saved: Option<PathBuf>,
    last_shown: Option<usize>,
}

impl std::fmt::Debug for MissionDirector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MissionDirector")
            .field("state", &self.state)
            .field("points", &self.log.len())
            .field("slots", &self.slots.len())
            .field("paused", &self.paused)
            .finish()
    }
}

impl MissionDirector {
    /// Create a director saving logs under `config.save_directory`.
    pub fn new(config: &EngineConfig, panel: Shared<MissionControlState>) -> Result<Self, anyhow::Error> {
        config.validate()?;
        let directory = LogDirectory::open(&config.save_directory).with_context(|| {
            format!("failed to open log directory {}", config.save_directory.display())
        })?;
        Ok(Self {
            state: DirectorState::InSelection,
            log: SnapshotLog::new(config.logging_interval, config.lead_in),
            directory,
            panel,
            slots: Vec::new(),
            log_file_open: false,
            paused: false,
            stop_requested: false,
            waiting_for: 0.0,
            last_slider: -1.0,
            last_saved: None,
            last_shown: None,
        })
    }

    // -- accessors ----------------------------------------------------------

    pub fn state(&self) -> DirectorState {
        self.state
    }

    pub fn log(&self) -> &SnapshotLog {
        &self.log
    }

    pub fn slots(&self) -> &[LogSlotInfo] {
        &self.slots
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn save_directory(&self) -> &Path {
        self.directory.root()
    }

    /// File written by the most recent finished mission.
    pub fn last_saved(&self) -> Option<&Path> {
        self.last_saved.as_deref()
    }

    /// Log point shown by the most recent scrub.
    pub fn last_shown(&self) -> Option<usize> {
        self.last_shown
    }

    // -- lifecycle ----------------------------------------------------------

    /// Enter free play: list saved logs and let steerables start without a
    /// reset.
    pub fn start(&mut self, registry: &Registry) -> Result<(), anyhow::Error> {
        self.panel
            .borrow_mut()
            .set_control_state(ControlState::PlayingFree);
        self.rescan()?;
        registry.start_mission(false);
        info!(slots = self.slots.len(), "mission director started");
        Ok(())
    }

    /// React to panel input.
    ///
    /// # Panics
    ///
    /// `DebriefStarted` panics if a mission log is still open.
    pub fn handle(&mut self, command: PanelCommand, registry: &Registry) -> Result<(), anyhow::Error> {
        let (steerable, pausable) = {
            let panel = self.panel.borrow();
            (panel.is_steerable(), panel.is_pausable())
        };
        match command {
            PanelCommand::GameStarted if steerable => self.begin_mission(registry),
            PanelCommand::DebriefStarted(slot) if steerable => self.begin_debrief(slot, registry)?,
            PanelCommand::PauseToggled if pausable => self.set_all_paused(!self.paused, registry),
            PanelCommand::StopPressed if !steerable => self.stop_requested = true,
            PanelCommand::SliderMoved(position) if position.is_finite() => {
                let position = position.clamp(0.0, SLIDER_MAX);
                self.panel.borrow_mut().set_slider_position(position);
            }
            PanelCommand::EntrySelected(entry) => {
                let last = self.slots.len().saturating_sub(1);
                let entry = usize::from(entry).min(last) as u8;
                self.panel.borrow_mut().set_selected_entry(entry);
            }
            other => debug!(command = ?other, state = ?self.state, "panel command ignored"),
        }
        Ok(())
    }

    /// Advance by one frame of `dt` seconds.
    pub fn tick(&mut self, dt: f32, registry: &Registry) -> Result<(), anyhow::Error> {
        match self.state {
            DirectorState::InSelection => {}
            DirectorState::Mission => {
                if !self.paused {
                    self.log.update(dt, &registry.loggables());
                }
                let status = if self.stop_requested {
                    FinishStatus::StopImmediate
                } else {
                    registry.finish_status()
                };
                match status {
                    FinishStatus::StopImmediate => self.finish_mission(registry)?,
                    FinishStatus::StopDelay => {
                        info!(grace = 2.0 * self.log.interval(), "mission finishing after grace period");
                        self.waiting_for = 0.0;
                        self.state = DirectorState::WaitingForFinish;
                    }
                    FinishStatus::Continue => {}
                }
            }
            DirectorState::WaitingForFinish => {
                self.waiting_for += dt;
                if !self.paused {
                    self.log.update(dt, &registry.loggables());
                }
                let grace_over = self.waiting_for > 2.0 * self.log.interval();
                if self.stop_requested || (grace_over && self.log_file_open) {
                    self.finish_mission(registry)?;
                }
            }
            DirectorState::Debriefing => {
                let slider = self.panel.borrow().slider_position();
                if (slider - self.last_slider).abs() > f32::EPSILON {
                    let mut entities = registry.loggables();
                    let index = self
                        .log
                        .show_logging_state(slider, &mut entities)
                        .context("failed to scrub debrief log")?;
                    debug!(slider, index, "debrief scrubbed");
                    self.last_slider = slider;
                    self.last_shown = Some(index);
                }
            }
        }
        Ok(())
    }

    // -- transitions --------------------------------------------------------

    fn begin_mission(&mut self, registry: &Registry) {
        registry.start_mission(true);
        self.set_all_paused(false, registry);
        self.log.start_logging();
        self.log_file_open = true;
        self.stop_requested = false;
        self.last_shown = None;
        self.state = DirectorState::Mission;
        self.panel.borrow_mut().set_control_state(ControlState::Playing);
        info!("mission started");
    }

    fn begin_debrief(&mut self, slot: u8, registry: &Registry) -> Result<(), anyhow::Error> {
        assert!(!self.log_file_open, "cannot start a debrief while a mission log is open");
        let path = slot_path(&self.slots, slot)
            .with_context(|| format!("cannot debrief slot {slot}"))?
            .to_path_buf();
        self.log
            .load(&path)
            .with_context(|| format!("failed to load debrief log {}", path.display()))?;

        registry.start_debrief();
        self.set_all_paused(false, registry);
        self.state = DirectorState::Debriefing;
        {
            let mut panel = self.panel.borrow_mut();
            panel.set_control_state(ControlState::Replay);
            panel.set_debrief_slot(slot);
        }
        self.last_slider = -1.0;
        self.last_shown = None;
        info!(slot, path = %path.display(), points = self.log.len(), "debrief started");
        Ok(())
    }

    fn finish_mission(&mut self, registry: &Registry) -> Result<(), anyhow::Error> {
        self.stop_requested = false;
        if self.paused {
            self.set_all_paused(false, registry);
        }
        if self.log_file_open {
            self.log_file_open = false;
            self.log.stop_logging(&registry.loggables());
            let path = self
                .directory
                .save(&self.log)
                .context("failed to save mission log")?;
            info!(path = %path.display(), points = self.log.len(), digest = %self.log.digest(), "mission log saved");
            self.last_saved = Some(path);
            self.rescan()?;
        }
        self.panel
            .borrow_mut()
            .set_control_state(ControlState::PlayingFree);
        self.state = DirectorState::InSelection;
        Ok(())
    }

    fn set_all_paused(&mut self, paused: bool, registry: &Registry) {
        registry.set_paused(paused);
        self.panel.borrow_mut().set_paused(paused);
        self.paused = paused;
        debug!(paused, "pause mode changed");
    }

    fn rescan(&mut self) -> Result<(), anyhow::Error> {
        let slots = self.directory.scan().context("failed to scan log directory")?;
        if slots.is_empty() {
            warn!(root = %self.directory.root().display(), "no saved logs available for debriefing");
        }
        let mut panel = self.panel.borrow_mut();
        let last = slots.len().saturating_sub(1);
        if usize::from(panel.selected_entry()) > last {
            panel.set_selected_entry(last as u8);
        }
        panel.set_logs(slots.clone());
        self.slots = slots;
        Ok(())
    }
}
