// THEORY:
// The `PoleAnalyzer` is where memory enters the system. A single frame gives the
// pole's geometry; the analyzer turns it into two signed offsets the controller
// can act on, plus two yes/no flags ("pointed at it", "at scoring distance").
//
// Raw flags flicker whenever detection is noisy, so each flag is backed by a
// `HysteresisCounter` that counts consecutive hits. The controller only trusts a
// flag once its counter has climbed past a threshold. What a miss does to a
// counter is a policy (`CounterReset`): drop to zero, or step down by one.
//
// A frame with no pole produces `AnalyzedTarget::NoDetection`, which is a
// different value from "detected, zero offset". Counters treat it as a miss.
//
// The analyzer is owned by whoever runs the alignment attempt and is reset at the
// start of every attempt; nothing here is global.

use crate::config::{AnalyzerConfig, CounterReset};
use crate::core_modules::region::Region;
use serde::{Deserialize, Serialize};

/// Consecutive-hit counter. Never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HysteresisCounter {
    count: u32,
    policy: CounterReset,
}

impl HysteresisCounter {
    pub fn new(policy: CounterReset) -> Self {
        Self { count: 0, policy }
    }

    pub fn record(&mut self, hit: bool) -> u32 {
        self.count = if hit {
            self.count.saturating_add(1)
        } else {
            match self.policy {
                CounterReset::Zero => 0,
                CounterReset::Decrement => self.count.saturating_sub(1),
            }
        };
        self.count
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }
}

/// Maps a pole region to a signed distance error in pixels.
///
/// Positive means the pole looks too small (too far, drive toward it); negative
/// means it looks too big (too close).
pub trait DistanceModel: Send {
    fn distance_offset(&self, region: &Region) -> f64;
}

/// Compares apparent width with the width seen at the scoring distance.
#[derive(Debug, Clone, Copy)]
pub struct WidthTemplate {
    pub reference_width_px: f64,
}

impl DistanceModel for WidthTemplate {
    fn distance_offset(&self, region: &Region) -> f64 {
        self.reference_width_px - region.width
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoleReading {
    /// Pole center x minus frame center x; positive means right of center.
    pub central_offset_px: f64,
    pub high_distance_offset_px: f64,
    pub aligned: bool,
    pub proper_distance: bool,
    pub aligned_count: u32,
    pub proper_distance_count: u32,
    pub region: Region,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AnalyzedTarget {
    NoDetection {
        aligned_count: u32,
        proper_distance_count: u32,
    },
    Detected(PoleReading),
}

impl AnalyzedTarget {
    pub fn reading(&self) -> Option<&PoleReading> {
        match self {
            AnalyzedTarget::Detected(reading) => Some(reading),
            AnalyzedTarget::NoDetection { .. } => None,
        }
    }

    pub fn aligned_count(&self) -> u32 {
        match self {
            AnalyzedTarget::Detected(r) => r.aligned_count,
            AnalyzedTarget::NoDetection { aligned_count, .. } => *aligned_count,
        }
    }

    pub fn proper_distance_count(&self) -> u32 {
        match self {
            AnalyzedTarget::Detected(r) => r.proper_distance_count,
            AnalyzedTarget::NoDetection { proper_distance_count, .. } => *proper_distance_count,
        }
    }
}

pub struct PoleAnalyzer {
    config: AnalyzerConfig,
    distance_model: Box<dyn DistanceModel>,
    aligned: HysteresisCounter,
    proper_distance: HysteresisCounter,
}

impl PoleAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let model = WidthTemplate {
            reference_width_px: config.reference_width_px,
        };
        Self::with_distance_model(config, Box::new(model))
    }

    pub fn with_distance_model(config: AnalyzerConfig, distance_model: Box<dyn DistanceModel>) -> Self {
        let policy = config.reset_policy;
        Self {
            config,
            distance_model,
            aligned: HysteresisCounter::new(policy),
            proper_distance: HysteresisCounter::new(policy),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Folds one frame's pole (or its absence) into the counters.
    pub fn analyze(&mut self, pole: Option<&Region>) -> AnalyzedTarget {
        let Some(region) = pole else {
            return AnalyzedTarget::NoDetection {
                aligned_count: self.aligned.record(false),
                proper_distance_count: self.proper_distance.record(false),
            };
        };

        let central_offset_px = region.center.x - self.config.frame_center_x;
        let high_distance_offset_px = self.distance_model.distance_offset(region);
        let aligned = central_offset_px.abs() < self.config.align_deadband_px;
        let proper_distance = high_distance_offset_px.abs() < self.config.distance_deadband_px;

        AnalyzedTarget::Detected(PoleReading {
            central_offset_px,
            high_distance_offset_px,
            aligned,
            proper_distance,
            aligned_count: self.aligned.record(aligned),
            proper_distance_count: self.proper_distance.record(proper_distance),
            region: *region,
        })
    }

    /// Clears both counters for a new alignment attempt.
    pub fn reset(&mut self) {
        self.aligned.reset();
        self.proper_distance.reset();
    }
}
