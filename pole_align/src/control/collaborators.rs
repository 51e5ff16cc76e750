// The alignment loop talks to the rest of the robot only through these traits.
// Hardware drivers implement them on the robot; tests and the tester binary
// implement them with plain structs.

use crate::control::mecanum::WheelPowers;
use crate::frame_feed::FrameDetection;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Where the camera is pointing.
pub trait TurretState {
    /// Turret heading relative to chassis forward, degrees. Left is negative.
    fn turret_angle_deg(&self) -> f64;
    /// True when the front camera is the active one.
    fn facing_front(&self) -> bool;
}

/// Receives one command per tick.
pub trait DriveSink {
    fn drive(&mut self, wheels: WheelPowers);
    fn stop(&mut self);
}

/// Cooperative cancellation, checked once per tick.
pub trait KeepRunning {
    fn keep_running(&self) -> bool;
}

/// Newest detection from the vision side, if any frame has been processed yet.
pub trait TargetSource {
    fn latest(&mut self) -> Option<FrameDetection>;
}

impl KeepRunning for AtomicBool {
    fn keep_running(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

impl KeepRunning for Arc<AtomicBool> {
    fn keep_running(&self) -> bool {
        self.as_ref().keep_running()
    }
}

impl TargetSource for watch::Receiver<Option<FrameDetection>> {
    fn latest(&mut self) -> Option<FrameDetection> {
        *self.borrow_and_update()
    }
}

/// A turret that never moves. Handy for fixed-camera setups and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedTurret {
    pub angle_deg: f64,
    pub facing_front: bool,
}

impl Default for FixedTurret {
    fn default() -> Self {
        Self {
            angle_deg: 0.0,
            facing_front: true,
        }
    }
}

impl TurretState for FixedTurret {
    fn turret_angle_deg(&self) -> f64 {
        self.angle_deg
    }

    fn facing_front(&self) -> bool {
        self.facing_front
    }
}
