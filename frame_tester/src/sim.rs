// A toy robot for closed-loop runs without hardware.
//
// The world is reduced to what the camera can see: how far the pole sits from
// the image center and how wide it looks. Wheel powers are un-mixed back into a
// turret-frame forward power and a turn power, which then move those two
// numbers. Frames are rendered from the world and fed through the real vision
// pipeline, so the whole loop runs exactly as it would on the robot.

use image::{Rgb, RgbImage};
use pole_align::control::collaborators::{DriveSink, KeepRunning};
use pole_align::control::mecanum::{wrap_degrees, WheelPowers};
use pole_align::frame_feed::FramePublisher;
use pole_align::pipeline::{Orientation, PipelineConfig};
use std::cell::Cell;

pub const POLE_COLOR: Rgb<u8> = Rgb([255, 140, 0]);
pub const BACKGROUND: Rgb<u8> = Rgb([30, 40, 120]);

/// Pixels the pole slides across the image per tick at full turn power.
const TURN_PX_PER_TICK: f64 = 6.0;
/// Meters covered per tick at full drive power.
const DRIVE_M_PER_TICK: f64 = 0.02;
/// Apparent width times distance: a 30 px pole is 1 m away.
const WIDTH_AT_ONE_METER: f64 = 30.0;
const POLE_HEIGHT_PX: u32 = 80;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct World {
    /// Pole center minus image center, as seen by an upright camera.
    pub offset_px: f64,
    pub distance_m: f64,
    pub turret_angle_deg: f64,
    pub facing_front: bool,
}

impl World {
    pub fn new(offset_px: f64, width_px: f64, turret_angle_deg: f64, facing_front: bool) -> Self {
        Self {
            offset_px,
            distance_m: WIDTH_AT_ONE_METER / width_px.max(1.0),
            turret_angle_deg,
            facing_front,
        }
    }

    pub fn apparent_width_px(&self) -> f64 {
        WIDTH_AT_ONE_METER / self.distance_m.max(0.05)
    }

    /// Applies one tick's wheel powers.
    pub fn step(&mut self, wheels: WheelPowers) {
        let (forward, turn) = unmix(wheels, self.turret_angle_deg, self.facing_front);
        self.offset_px -= turn * TURN_PX_PER_TICK;
        self.distance_m = (self.distance_m - forward * DRIVE_M_PER_TICK).max(0.05);
    }

    /// Draws the pole as the configured camera would deliver it.
    pub fn render(&self, config: &PipelineConfig) -> RgbImage {
        let (w, h) = (config.image_width, config.image_height);
        let half_width = self.apparent_width_px() / 2.0;
        let center = w as f64 / 2.0 + self.offset_px;
        let x0 = (center - half_width).round().max(0.0) as u32;
        let x1 = (center + half_width).round().max(0.0) as u32;
        let y0 = h.saturating_sub(POLE_HEIGHT_PX) / 2;
        let y1 = y0 + POLE_HEIGHT_PX.min(h);

        let upright = RgbImage::from_fn(w, h, |x, y| {
            if x >= x0 && x < x1 && y >= y0 && y < y1 { POLE_COLOR } else { BACKGROUND }
        });
        match config.orientation {
            Orientation::Upright => upright,
            Orientation::UpsideDown => image::imageops::rotate180(&upright),
        }
    }
}

/// Recovers (turret-frame forward, turn) from mixed wheel powers.
pub fn unmix(wheels: WheelPowers, turret_angle_deg: f64, facing_front: bool) -> (f64, f64) {
    let WheelPowers {
        front_left,
        front_right,
        rear_left,
        rear_right,
    } = wheels;
    let turn = (front_right + rear_right - front_left - rear_left) / 4.0;
    let y = (front_right + front_left + rear_right + rear_left) / 4.0;
    let x = (front_left + rear_right - front_right - rear_left) / 4.0;

    let mut angle = turret_angle_deg;
    if !facing_front {
        angle = wrap_degrees(angle + 180.0);
    }
    let a = angle.to_radians();
    (y * a.cos() + x * a.sin(), turn)
}

/// Drive sink that moves the world and publishes the next camera frame.
pub struct SimDrive {
    pub world: World,
    camera: PipelineConfig,
    frames: FramePublisher,
    pub drive_ticks: u64,
}

impl SimDrive {
    pub fn new(world: World, camera: PipelineConfig, frames: FramePublisher) -> Self {
        Self {
            world,
            camera,
            frames,
            drive_ticks: 0,
        }
    }

    pub fn publish_frame(&mut self) -> u64 {
        self.frames.publish(self.world.render(&self.camera))
    }
}

impl DriveSink for SimDrive {
    fn drive(&mut self, wheels: WheelPowers) {
        self.drive_ticks += 1;
        self.world.step(wheels);
        self.publish_frame();
    }

    fn stop(&mut self) {
        self.publish_frame();
    }
}

/// Keeps the loop running for a fixed number of ticks.
pub struct TickBudget {
    remaining: Cell<u64>,
}

impl TickBudget {
    pub fn new(ticks: u64) -> Self {
        Self {
            remaining: Cell::new(ticks),
        }
    }
}

impl KeepRunning for TickBudget {
    fn keep_running(&self) -> bool {
        let left = self.remaining.get();
        if left == 0 {
            return false;
        }
        self.remaining.set(left - 1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use pole_align::control::mecanum::{mix, ChassisCommand};
    use pole_align::pipeline::TargetPipeline;

    #[test]
    fn unmix_inverts_the_mecanum_mix() {
        for facing_front in [true, false] {
            for angle in [-90.0, -30.0, 0.0, 45.0, 120.0] {
                let command = ChassisCommand::new(0.4, -0.2, angle);
                let (forward, turn) = unmix(mix(&command, facing_front), angle, facing_front);
                assert_abs_diff_eq!(forward, 0.4, epsilon = 1e-9);
                assert_abs_diff_eq!(turn, -0.2, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn rendered_pole_is_found_where_the_world_says() {
        let config = PipelineConfig::default();
        let world = World::new(24.0, 20.0, 0.0, true);
        let mut pipeline = TargetPipeline::new(config.clone());
        let pole = pipeline.process(&world.render(&config)).expect("frame");
        let region = pole.pole().copied().expect("pole");
        assert_abs_diff_eq!(region.center.x, 184.0, epsilon = 0.5);
        assert_abs_diff_eq!(region.width, 20.0, epsilon = 1.0);
    }

    #[test]
    fn upside_down_camera_sees_the_same_offset() {
        let config = PipelineConfig {
            orientation: Orientation::UpsideDown,
            ..PipelineConfig::default()
        };
        let world = World::new(-30.0, 24.0, 0.0, false);
        let mut pipeline = TargetPipeline::new(config.clone());
        let pole = pipeline.process(&world.render(&config)).expect("frame");
        assert_abs_diff_eq!(pole.pole().expect("pole").center.x, 130.0, epsilon = 0.5);
    }

    #[test]
    fn positive_powers_close_the_gap() {
        let mut world = World::new(40.0, 15.0, 0.0, true);
        let before = (world.offset_px, world.apparent_width_px());
        world.step(mix(&ChassisCommand::new(0.5, 0.5, 0.0), true));
        assert!(world.offset_px < before.0);
        assert!(world.apparent_width_px() > before.1);
    }

    #[test]
    fn tick_budget_runs_out() {
        let budget = TickBudget::new(2);
        assert!(budget.keep_running());
        assert!(budget.keep_running());
        assert!(!budget.keep_running());
    }
}
