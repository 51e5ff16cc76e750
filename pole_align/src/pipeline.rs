// THEORY:
// The `pipeline` module is the top-level API of the vision side. It wires the
// stateless stages together for one camera and hands back a single
// `Classification` per frame:
//
//   frame -> FrameSegmenter -> RegionExtractor -> classifier -> Classification
//
// The classifier flavour is a closed choice made at construction time
// (`PipelineKind`): object counting or pole finding. Both share the same
// segmentation and extraction stages by composition.
//
// A pipeline invocation is a pure function of its frame. Buffers are reused
// across calls purely for speed, and a malformed frame is rejected before any
// stage runs, so nothing observable changes when it is skipped.

use crate::config::{ObjectCountConfig, PoleConfig, SegmenterConfig};
use crate::core_modules::frame_segmenter::{ColorMask, FrameSegmenter};
use crate::core_modules::region::{PointF, Region};
use crate::core_modules::region_extractor::RegionExtractor;
use crate::core_modules::target_classifier::{classify_count, classify_pole, NearestPole, PoleSelector};
use crate::error::{ConfigError, FrameError};
use image::RgbImage;
use log::debug;
use serde::{Deserialize, Serialize};

// Re-export key data structures for the public API.
pub use crate::core_modules::target_classifier::{Classification, RingCount};

/// How the camera is mounted relative to the image it delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Upright,
    /// Frames arrive rotated by 180 degrees.
    UpsideDown,
}

/// Which classifier sits at the end of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    ObjectCount(ObjectCountConfig),
    Pole(PoleConfig),
}

impl Default for PipelineKind {
    fn default() -> Self {
        PipelineKind::Pole(PoleConfig::default())
    }
}

/// Configuration for one camera's `TargetPipeline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub image_width: u32,
    pub image_height: u32,
    pub orientation: Orientation,
    pub segmenter: SegmenterConfig,
    pub kind: PipelineKind,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_width: 320,
            image_height: 240,
            orientation: Orientation::Upright,
            segmenter: SegmenterConfig::default(),
            kind: PipelineKind::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err(ConfigError::Invalid("frame dimensions must be non-zero".into()));
        }
        self.segmenter.bounds.validate()?;
        match &self.kind {
            PipelineKind::ObjectCount(count) => count.validate(),
            PipelineKind::Pole(pole) => pole.validate(),
        }
    }
}

/// The main, top-level struct for one camera's vision pipeline.
pub struct TargetPipeline {
    config: PipelineConfig,
    segmenter: FrameSegmenter,
    extractor: RegionExtractor,
    pole_selector: Box<dyn PoleSelector>,
    regions: Vec<Region>,
    frames_processed: u64,
}

impl TargetPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_pole_selector(config, Box::new(NearestPole))
    }

    pub fn with_pole_selector(config: PipelineConfig, pole_selector: Box<dyn PoleSelector>) -> Self {
        let segmenter = FrameSegmenter::new(config.segmenter.clone(), config.orientation);
        Self {
            config,
            segmenter,
            extractor: RegionExtractor::new(),
            pole_selector,
            regions: Vec::new(),
            frames_processed: 0,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage on an RGB frame.
    pub fn process(&mut self, frame: &RgbImage) -> Result<Classification, FrameError> {
        self.check_dimensions(frame.dimensions())?;
        let mask = self.segmenter.segment(frame);
        self.extractor.extract(mask, &mut self.regions);
        Ok(self.classify())
    }

    /// Runs every stage on a packed RGBA buffer of the session's dimensions.
    pub fn process_rgba(&mut self, frame_buffer: &[u8]) -> Result<Classification, FrameError> {
        let (width, height) = (self.config.image_width, self.config.image_height);
        let expected = width as usize * height as usize * 4;
        if frame_buffer.is_empty() {
            return Err(FrameError::Empty);
        }
        if frame_buffer.len() != expected {
            return Err(FrameError::BufferLength {
                expected,
                actual: frame_buffer.len(),
            });
        }
        let mask = self.segmenter.segment_rgba(frame_buffer, width, height);
        self.extractor.extract(mask, &mut self.regions);
        Ok(self.classify())
    }

    /// Regions extracted from the last successfully processed frame.
    pub fn last_regions(&self) -> &[Region] {
        &self.regions
    }

    /// Mask from the last frame that reached the segmenter.
    pub fn last_mask(&self) -> Option<&ColorMask> {
        (self.frames_processed > 0).then(|| self.segmenter.mask())
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    fn check_dimensions(&self, actual: (u32, u32)) -> Result<(), FrameError> {
        if actual.0 == 0 || actual.1 == 0 {
            return Err(FrameError::Empty);
        }
        let expected = (self.config.image_width, self.config.image_height);
        if actual != expected {
            return Err(FrameError::DimensionMismatch { expected, actual });
        }
        Ok(())
    }

    fn classify(&mut self) -> Classification {
        self.frames_processed += 1;
        let classification = match &self.config.kind {
            PipelineKind::ObjectCount(count) => {
                let center = PointF::new(
                    self.config.image_width as f64 / 2.0,
                    self.config.image_height as f64 / 2.0,
                );
                classify_count(&self.regions, count, center)
            }
            PipelineKind::Pole(pole) => classify_pole(&self.regions, pole, self.pole_selector.as_ref()),
        };
        debug!(
            "frame {}: {} regions -> {:?}",
            self.frames_processed,
            self.regions.len(),
            classification
        );
        classification
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const ORANGE: Rgb<u8> = Rgb([255, 140, 0]);
    const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

    fn frame_with_block(x0: u32, y0: u32, w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(320, 240, |x, y| {
            if (x0..x0 + w).contains(&x) && (y0..y0 + h).contains(&y) { ORANGE } else { BLUE }
        })
    }

    #[test]
    fn pole_pipeline_finds_the_bar() {
        let mut pipeline = TargetPipeline::new(PipelineConfig::default());
        let result = pipeline.process(&frame_with_block(165, 100, 10, 40)).expect("valid frame");
        let pole = result.pole().expect("pole");
        assert_eq!(pole.center.x, 170.0);
        assert_eq!(pipeline.last_regions().len(), 1);
        assert_eq!(pipeline.frames_processed(), 1);
    }

    #[test]
    fn empty_frame_is_zero_rings_for_the_counter() {
        let config = PipelineConfig {
            kind: PipelineKind::ObjectCount(ObjectCountConfig::default()),
            ..PipelineConfig::default()
        };
        let mut pipeline = TargetPipeline::new(config);
        let frame = RgbImage::from_pixel(320, 240, BLUE);
        let result = pipeline.process(&frame).expect("valid frame");
        assert_eq!(result, Classification::ObjectCount { count: RingCount::Zero, region: None });
        assert!(pipeline.last_mask().expect("mask").count_set() == 0);
    }

    #[test]
    fn wrong_size_frame_is_rejected_without_touching_state() {
        let mut pipeline = TargetPipeline::new(PipelineConfig::default());
        pipeline.process(&frame_with_block(165, 100, 10, 40)).expect("valid frame");
        let before = pipeline.last_regions().to_vec();

        let err = pipeline.process(&RgbImage::from_pixel(640, 480, ORANGE)).unwrap_err();
        assert_eq!(
            err,
            FrameError::DimensionMismatch {
                expected: (320, 240),
                actual: (640, 480)
            }
        );
        assert_eq!(pipeline.last_regions(), before.as_slice());
        assert_eq!(pipeline.frames_processed(), 1);
    }

    #[test]
    fn short_rgba_buffer_is_rejected() {
        let mut pipeline = TargetPipeline::new(PipelineConfig::default());
        let err = pipeline.process_rgba(&[0u8; 100]).unwrap_err();
        assert!(matches!(err, FrameError::BufferLength { actual: 100, .. }));
        assert_eq!(pipeline.process_rgba(&[]).unwrap_err(), FrameError::Empty);
    }

    #[test]
    fn upside_down_camera_mirrors_the_offset() {
        let config = PipelineConfig {
            orientation: Orientation::UpsideDown,
            ..PipelineConfig::default()
        };
        let mut pipeline = TargetPipeline::new(config);
        // Pole appears left of center in the raw frame: x 140..150 -> center 145.
        let result = pipeline.process(&frame_with_block(140, 100, 10, 40)).expect("valid frame");
        // After the 180 degree turn it sits at 320 - 145 = 175.
        assert_eq!(result.pole().expect("pole").center.x, 175.0);
    }
}
