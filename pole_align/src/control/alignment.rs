// THEORY:
// The `AlignmentController` closes the loop between the vision side and the
// drivetrain. It owns everything that has memory during one alignment attempt:
// the `PoleAnalyzer` (hysteresis counters) and the `OffsetHistory`.
//
// Each tick is a pure step over that state (`tick`), which makes the control law
// testable without a runtime. `run` wraps it in a cooperative loop: bounded work,
// a fixed sleep, and a keep-running check, until the attempt settles or the
// caller cancels. A final stop is always sent on the way out.
//
// Frames and ticks are decoupled. The analyzer only sees a frame once, the first
// tick after its sequence number advances, so the counters count frames. Ticks
// between frames re-issue the command computed from the newest reading.
//
// State machine:
//
//   Seeking --pole seen--> Converging --both counters > threshold--> Settled
//      \                     |    ^
//       \--no pole--> Lost <-/    |
//                       \--pole seen again--/
//
// Control law (per axis): zero inside the analyzer's dead-band, otherwise
// `offset * slope + sign(offset) * kick`. The kick overcomes static friction.
// Oversized powers are never clamped per axis; the pair is scaled down together
// so the drive-to-turn ratio survives. If both powers end up below `stop_epsilon` the tick emits a
// stop instead of a drive command.

use crate::config::{AnalyzerConfig, ControlConfig};
use crate::control::collaborators::{DriveSink, KeepRunning, TargetSource, TurretState};
use crate::control::mecanum::{self, ChassisCommand, WheelPowers};
use crate::control::offset_history::OffsetHistory;
use crate::core_modules::pole_analyzer::{AnalyzedTarget, PoleAnalyzer, PoleReading};
use crate::diagnostics::{AlignmentSnapshot, DiagnosticsBus};
use crate::frame_feed::FrameDetection;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentState {
    /// No pole has been seen yet in this attempt.
    Seeking,
    Converging,
    /// The newest frame had no pole.
    Lost,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DriveCommand {
    Stop,
    Drive {
        chassis: ChassisCommand,
        wheels: WheelPowers,
    },
}

impl DriveCommand {
    /// Wheel powers this command puts on the motors.
    pub fn wheels(&self) -> WheelPowers {
        match self {
            DriveCommand::Stop => WheelPowers::ZERO,
            DriveCommand::Drive { wheels, .. } => *wheels,
        }
    }

    pub fn send_to<D: DriveSink + ?Sized>(&self, sink: &mut D) {
        match self {
            DriveCommand::Stop => sink.stop(),
            DriveCommand::Drive { wheels, .. } => sink.drive(*wheels),
        }
    }
}

/// Result of one controller tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    pub tick: u64,
    pub state: AlignmentState,
    /// Newest analyzed frame, if any frame arrived during this attempt.
    pub target: Option<AnalyzedTarget>,
    pub command: DriveCommand,
    /// True when this tick consumed a new frame.
    pub fresh_frame: bool,
}

pub struct AlignmentController {
    config: ControlConfig,
    analyzer: PoleAnalyzer,
    history: OffsetHistory,
    state: AlignmentState,
    latest: Option<AnalyzedTarget>,
    last_frame_seq: Option<u64>,
    last_command: DriveCommand,
    lost_ticks: u32,
    ticks: u64,
}

impl AlignmentController {
    pub fn new(config: ControlConfig, analyzer_config: AnalyzerConfig) -> Self {
        Self::with_analyzer(config, PoleAnalyzer::new(analyzer_config))
    }

    pub fn with_analyzer(config: ControlConfig, analyzer: PoleAnalyzer) -> Self {
        let history = OffsetHistory::new(config.history_len);
        Self {
            config,
            analyzer,
            history,
            state: AlignmentState::Seeking,
            latest: None,
            last_frame_seq: None,
            last_command: DriveCommand::Stop,
            lost_ticks: 0,
            ticks: 0,
        }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn state(&self) -> AlignmentState {
        self.state
    }

    pub fn history(&self) -> &OffsetHistory {
        &self.history
    }

    pub fn latest_target(&self) -> Option<&AnalyzedTarget> {
        self.latest.as_ref()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Clears counters, history and state for a fresh attempt.
    ///
    /// The last consumed frame sequence is kept, so a frame that was already
    /// counted in an earlier attempt is not counted again.
    pub fn start_attempt(&mut self) {
        self.analyzer.reset();
        self.history.clear();
        self.state = AlignmentState::Seeking;
        self.latest = None;
        self.last_command = DriveCommand::Stop;
        self.lost_ticks = 0;
        self.ticks = 0;
    }

    /// One control step.
    pub fn tick(&mut self, detection: Option<FrameDetection>, turret_angle_deg: f64, facing_front: bool) -> TickOutcome {
        self.ticks += 1;

        let fresh_frame = match detection {
            Some(detection) if self.last_frame_seq != Some(detection.frame_seq) => {
                self.last_frame_seq = Some(detection.frame_seq);
                self.latest = Some(self.analyzer.analyze(detection.classification.pole()));
                true
            }
            _ => false,
        };

        let command = match self.latest {
            None => {
                self.state = AlignmentState::Seeking;
                DriveCommand::Stop
            }
            Some(AnalyzedTarget::NoDetection { .. }) => self.lost_command(),
            Some(target @ AnalyzedTarget::Detected(reading)) => {
                self.lost_ticks = 0;
                if self.is_settled(&target) {
                    if self.state != AlignmentState::Settled {
                        info!(
                            "settled after {} ticks (offset {:.1} px, distance {:.1} px)",
                            self.ticks, reading.central_offset_px, reading.high_distance_offset_px
                        );
                    }
                    self.state = AlignmentState::Settled;
                    DriveCommand::Stop
                } else {
                    self.state = AlignmentState::Converging;
                    if fresh_frame {
                        self.history
                            .push(reading.central_offset_px, reading.high_distance_offset_px);
                    }
                    self.command_for(&reading, turret_angle_deg, facing_front)
                }
            }
        };

        // A held command is not a new command.
        if self.lost_ticks == 0 {
            self.last_command = command;
        }

        trace!("tick {}: {:?} -> {:?}", self.ticks, self.state, command);
        if fresh_frame {
            trace!("offset history {:?}", self.history.to_pairs());
        }

        TickOutcome {
            tick: self.ticks,
            state: self.state,
            target: self.latest,
            command,
            fresh_frame,
        }
    }

    /// Runs one alignment attempt until it settles or `keep_running` turns false.
    ///
    /// Returns the state the attempt ended in. The drive sink always receives a
    /// final stop.
    pub async fn run<S, T, D, K>(
        &mut self,
        source: &mut S,
        turret: &T,
        drive: &mut D,
        keep_running: &K,
        diagnostics: Option<&DiagnosticsBus>,
    ) -> AlignmentState
    where
        S: TargetSource + ?Sized,
        T: TurretState + ?Sized,
        D: DriveSink + ?Sized,
        K: KeepRunning + ?Sized,
    {
        self.start_attempt();
        let interval = Duration::from_millis(self.config.tick_interval_ms);
        info!("alignment attempt started (tick {:?})", interval);

        while keep_running.keep_running() {
            let outcome = self.tick(source.latest(), turret.turret_angle_deg(), turret.facing_front());
            outcome.command.send_to(drive);

            if let Some(bus) = diagnostics {
                bus.publish(AlignmentSnapshot::capture(&outcome, &self.history));
            }

            if outcome.state == AlignmentState::Settled {
                break;
            }
            tokio::time::sleep(interval).await;
        }

        if self.state != AlignmentState::Settled {
            info!("alignment attempt cancelled in state {:?} after {} ticks", self.state, self.ticks);
        }
        drive.stop();
        self.state
    }

    fn is_settled(&self, target: &AnalyzedTarget) -> bool {
        let threshold = self.config.settle_threshold;
        target.aligned_count() > threshold && target.proper_distance_count() > threshold
    }

    fn lost_command(&mut self) -> DriveCommand {
        self.state = AlignmentState::Lost;
        self.lost_ticks = self.lost_ticks.saturating_add(1);
        if self.lost_ticks <= self.config.lost_tick_limit {
            debug!("pole lost, holding last command ({}/{})", self.lost_ticks, self.config.lost_tick_limit);
            self.last_command
        } else {
            if self.lost_ticks == self.config.lost_tick_limit.saturating_add(1) {
                warn!("pole lost for {} ticks, stopping", self.lost_ticks);
            }
            DriveCommand::Stop
        }
    }

    fn command_for(&self, reading: &PoleReading, turret_angle_deg: f64, facing_front: bool) -> DriveCommand {
        let turn = turn_power(reading, &self.config);
        let forward = drive_power(reading, &self.config);
        if turn.abs() < self.config.stop_epsilon && forward.abs() < self.config.stop_epsilon {
            return DriveCommand::Stop;
        }
        let chassis = ChassisCommand::new(forward, turn, turret_angle_deg);
        DriveCommand::Drive {
            chassis,
            wheels: mecanum::mix(&chassis, facing_front),
        }
    }
}

/// Turn power for a reading; zero once aligned.
pub fn turn_power(reading: &PoleReading, config: &ControlConfig) -> f64 {
    if reading.aligned {
        return 0.0;
    }
    proportional_with_kick(reading.central_offset_px, config.turn_slope, config.turn_offset)
}

/// Forward power for a reading; zero at proper distance.
pub fn drive_power(reading: &PoleReading, config: &ControlConfig) -> f64 {
    if reading.proper_distance {
        return 0.0;
    }
    proportional_with_kick(reading.high_distance_offset_px, config.drive_slope, config.drive_offset)
}

fn proportional_with_kick(offset: f64, slope: f64, kick: f64) -> f64 {
    if offset > 0.0 {
        offset * slope + kick
    } else if offset < 0.0 {
        offset * slope - kick
    } else {
        0.0
    }
}
