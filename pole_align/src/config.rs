// THEORY:
// Every tunable in the system is a load-time constant. The structs below are
// plain data with public fields so they can be built inline in code, and they
// derive serde so the whole set for one camera can be read from a JSON file at
// start-up. The `Default` impls carry the field-tuned values for a 320x240
// stream; anything not present in a JSON file falls back to them.

use crate::error::ConfigError;
use crate::pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Inclusive per-channel bounds in 8-bit HSV (H in [0,180), S and V in [0,255]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvBounds {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl Default for HsvBounds {
    fn default() -> Self {
        // Orange-yellow game pieces.
        Self {
            lower: [10, 100, 20],
            upper: [25, 255, 255],
        }
    }
}

impl HsvBounds {
    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| self.lower[c] <= hsv[c] && hsv[c] <= self.upper[c])
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for c in 0..3 {
            if self.lower[c] > self.upper[c] {
                return Err(ConfigError::Invalid(format!(
                    "hsv channel {c}: lower bound {} is above upper bound {}",
                    self.lower[c], self.upper[c]
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub bounds: HsvBounds,
    /// Number of 3x3 closing passes applied to the raw mask. Zero disables cleanup.
    pub close_iterations: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            bounds: HsvBounds::default(),
            close_iterations: 1,
        }
    }
}

/// Which size-accepted region the object counter buckets when several qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// First accepted region in extraction order (raster order of its top-left pixel).
    #[default]
    FirstFound,
    /// Accepted region with the largest rectangle area.
    Largest,
    /// Accepted region whose center is nearest the frame center.
    MostCentral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectCountConfig {
    pub width_min: f64,
    pub width_max: f64,
    pub height_min: f64,
    pub height_max: f64,
    /// Lowest width/height ratio of a stack of four.
    pub four_min: f64,
    /// Boundary between a stack of four and a single ring.
    pub one_min: f64,
    pub one_max: f64,
    /// Minimum rectangle area of a stack of four.
    pub four_area: f64,
    pub tie_break: TieBreak,
}

impl Default for ObjectCountConfig {
    fn default() -> Self {
        Self {
            width_min: 15.0,
            width_max: 60.0,
            height_min: 10.0,
            height_max: 60.0,
            four_min: 0.5,
            one_min: 2.3,
            one_max: 2.8,
            four_area: 1000.0,
            tie_break: TieBreak::FirstFound,
        }
    }
}

impl ObjectCountConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width_min > self.width_max || self.height_min > self.height_max {
            return Err(ConfigError::Invalid(
                "object size band has min above max".into(),
            ));
        }
        if !(self.four_min <= self.one_min && self.one_min <= self.one_max) {
            return Err(ConfigError::Invalid(
                "ratio bands must satisfy four_min <= one_min <= one_max".into(),
            ));
        }
        Ok(())
    }
}

/// Gates for what counts as a pole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoleConfig {
    pub min_width_px: f64,
    pub max_width_px: f64,
    pub min_height_px: f64,
    /// Minimum height/width ratio.
    pub min_aspect: f64,
}

impl Default for PoleConfig {
    fn default() -> Self {
        Self {
            min_width_px: 3.0,
            max_width_px: 120.0,
            min_height_px: 20.0,
            min_aspect: 1.5,
        }
    }
}

impl PoleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_width_px > self.max_width_px {
            return Err(ConfigError::Invalid("pole width band has min above max".into()));
        }
        if self.min_aspect <= 0.0 {
            return Err(ConfigError::Invalid("pole min_aspect must be positive".into()));
        }
        Ok(())
    }
}

/// What a hysteresis counter does on a frame where its condition is not met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterReset {
    /// Drop straight back to zero.
    #[default]
    Zero,
    /// Step down by one, saturating at zero.
    Decrement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Horizontal pixel coordinate treated as "straight ahead".
    pub frame_center_x: f64,
    /// Apparent pole width at the scoring distance.
    pub reference_width_px: f64,
    pub align_deadband_px: f64,
    pub distance_deadband_px: f64,
    pub reset_policy: CounterReset,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            frame_center_x: 160.0,
            reference_width_px: 30.0,
            align_deadband_px: 4.0,
            distance_deadband_px: 2.0,
            reset_policy: CounterReset::Zero,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.align_deadband_px < 0.0 || self.distance_deadband_px < 0.0 {
            return Err(ConfigError::Invalid("dead-bands must be non-negative".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Turn power per pixel of horizontal offset. 160 px maps to full power.
    pub turn_slope: f64,
    /// Static-friction kick added to any non-zero turn.
    pub turn_offset: f64,
    /// Drive power per pixel of width error. 30 px maps to full power.
    pub drive_slope: f64,
    pub drive_offset: f64,
    /// Both powers below this magnitude become a stop command.
    pub stop_epsilon: f64,
    /// Both counters must exceed this for the attempt to settle.
    pub settle_threshold: u32,
    pub history_len: usize,
    pub tick_interval_ms: u64,
    /// Consecutive lost ticks during which the last command is held before stopping.
    pub lost_tick_limit: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            turn_slope: 0.005787,
            turn_offset: 0.07422,
            drive_slope: 0.03173,
            drive_offset: 0.04828,
            stop_epsilon: 0.01,
            settle_threshold: 3,
            history_len: 10,
            tick_interval_ms: 20,
            lost_tick_limit: 1,
        }
    }
}

impl ControlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_len == 0 {
            return Err(ConfigError::Invalid("history_len must be at least 1".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be at least 1".into()));
        }
        let gains = [
            self.turn_slope,
            self.turn_offset,
            self.drive_slope,
            self.drive_offset,
            self.stop_epsilon,
        ];
        if gains.iter().any(|g| !g.is_finite()) {
            return Err(ConfigError::Invalid("control gains must be finite".into()));
        }
        Ok(())
    }
}

/// Everything needed to run one camera's pipeline and the alignment loop behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RobotConfig {
    pub pipeline: PipelineConfig,
    pub analyzer: AnalyzerConfig,
    pub control: ControlConfig,
}

impl RobotConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: RobotConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        self.analyzer.validate()?;
        self.control.validate()
    }
}
