// THEORY:
// This file is the main entry point for the `pole_align` library crate.
//
// The crate is the perception and control core of a mecanum-drive robot that
// lines itself up with a colored pole (or counts stacked rings) using a camera
// on a turret. It splits cleanly in two:
//
// - Vision (`pipeline`, `core_modules`): frame -> mask -> regions ->
//   classification. Pure per frame.
// - Control (`control`): classification -> offsets with hysteresis -> power
//   laws -> mecanum wheel powers, run as a cooperative fixed-rate loop.
//
// `frame_feed` connects the two with latest-value channels, and `diagnostics`
// lets an observer watch the loop without slowing it down. The robot's hardware
// is reached only through the traits in `control::collaborators`.

pub mod config;
pub mod control;
pub mod core_modules;
pub mod diagnostics;
pub mod error;
pub mod frame_feed;
pub mod pipeline;

pub use config::RobotConfig;
pub use control::alignment::{AlignmentController, AlignmentState, DriveCommand};
pub use control::mecanum::{ChassisCommand, WheelPowers};
pub use error::{ConfigError, FrameError};
pub use pipeline::{Classification, PipelineConfig, RingCount, TargetPipeline};
