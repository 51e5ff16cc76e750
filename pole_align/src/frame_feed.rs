// THEORY:
// The camera is an independent producer and the pipeline must always work on
// the newest frame, never a backlog. A `tokio::sync::watch` slot gives exactly
// that: publishing overwrites the slot, and a slow reader simply skips the
// frames it missed.
//
//   camera --FramePublisher--> [latest frame] --FrameSubscriber--> run_vision
//   run_vision --watch--> [latest FrameDetection] --TargetSource--> controller
//
// Frames travel as `Arc<RgbImage>` snapshots, so the pipeline reads a frame the
// producer can no longer mutate. Each frame carries a sequence number that
// follows it into its detection; the controller uses it to analyze every frame
// exactly once.

use crate::core_modules::target_classifier::Classification;
use crate::error::FrameError;
use crate::pipeline::{PipelineConfig, TargetPipeline};
use image::RgbImage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct FramePacket {
    pub frame_seq: u64,
    pub image: Arc<RgbImage>,
}

/// The classification of one frame, tagged with that frame's sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameDetection {
    pub frame_seq: u64,
    pub classification: Classification,
}

pub struct FramePublisher {
    tx: watch::Sender<Option<FramePacket>>,
    next_seq: u64,
}

impl FramePublisher {
    /// Installs a new frame, replacing any frame nobody has read yet.
    pub fn publish(&mut self, image: RgbImage) -> u64 {
        self.publish_shared(Arc::new(image))
    }

    pub fn publish_shared(&mut self, image: Arc<RgbImage>) -> u64 {
        self.next_seq += 1;
        let frame_seq = self.next_seq;
        self.tx.send_replace(Some(FramePacket { frame_seq, image }));
        frame_seq
    }

    pub fn subscribe(&self) -> FrameSubscriber {
        FrameSubscriber { rx: self.tx.subscribe() }
    }
}

#[derive(Clone)]
pub struct FrameSubscriber {
    rx: watch::Receiver<Option<FramePacket>>,
}

impl FrameSubscriber {
    /// Waits for a frame newer than the last one returned.
    ///
    /// Returns `None` once the publisher is gone and every frame has been seen.
    pub async fn next(&mut self) -> Option<FramePacket> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(packet) = self.rx.borrow_and_update().clone() {
                return Some(packet);
            }
        }
    }

    /// The newest frame without waiting.
    pub fn current(&self) -> Option<FramePacket> {
        self.rx.borrow().clone()
    }
}

/// Creates the single-slot frame handoff between a camera and its pipeline.
pub fn frame_slot() -> (FramePublisher, FrameSubscriber) {
    let (tx, rx) = watch::channel(None);
    (FramePublisher { tx, next_seq: 0 }, FrameSubscriber { rx })
}

pub fn detection_channel() -> (
    watch::Sender<Option<FrameDetection>>,
    watch::Receiver<Option<FrameDetection>>,
) {
    watch::channel(None)
}

/// Drives one camera's pipeline until its publisher goes away.
///
/// Malformed frames are logged and skipped; nothing is published for them. The
/// pipeline is handed back when the feed ends.
pub async fn run_vision(
    mut pipeline: TargetPipeline,
    mut frames: FrameSubscriber,
    detections: watch::Sender<Option<FrameDetection>>,
) -> TargetPipeline {
    info!("vision task started");
    while let Some(packet) = frames.next().await {
        match pipeline.process(&packet.image) {
            Ok(classification) => {
                debug!("frame {} -> {:?}", packet.frame_seq, classification);
                detections.send_replace(Some(FrameDetection {
                    frame_seq: packet.frame_seq,
                    classification,
                }));
            }
            Err(err) => warn!("skipping frame {}: {}", packet.frame_seq, err),
        }
    }
    info!("vision task finished after {} frames", pipeline.frames_processed());
    pipeline
}

/// A front and a back pole camera; the turret's facing flag picks which one
/// is looking at the pole.
pub struct CameraRig {
    front: TargetPipeline,
    back: TargetPipeline,
}

impl CameraRig {
    pub fn new(front: PipelineConfig, back: PipelineConfig) -> Self {
        Self {
            front: TargetPipeline::new(front),
            back: TargetPipeline::new(back),
        }
    }

    pub fn active(&mut self, facing_front: bool) -> &mut TargetPipeline {
        if facing_front { &mut self.front } else { &mut self.back }
    }

    /// Runs `frame` through whichever camera is active.
    pub fn process(&mut self, facing_front: bool, frame: &RgbImage) -> Result<Classification, FrameError> {
        self.active(facing_front).process(frame)
    }

    pub fn front(&self) -> &TargetPipeline {
        &self.front
    }

    pub fn back(&self) -> &TargetPipeline {
        &self.back
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Orientation;
    use image::Rgb;

    const ORANGE: Rgb<u8> = Rgb([255, 140, 0]);
    const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

    fn frame_with_bar(x0: u32) -> RgbImage {
        RgbImage::from_fn(320, 240, |x, y| {
            if (x0..x0 + 10).contains(&x) && (100..140).contains(&y) { ORANGE } else { BLUE }
        })
    }

    #[tokio::test]
    async fn subscriber_only_sees_the_newest_frame() {
        let (mut publisher, mut subscriber) = frame_slot();
        publisher.publish(frame_with_bar(10));
        publisher.publish(frame_with_bar(20));
        let seq = publisher.publish(frame_with_bar(30));

        let packet = subscriber.next().await.expect("frame");
        assert_eq!(packet.frame_seq, seq);
        assert_eq!(seq, 3);

        drop(publisher);
        assert!(subscriber.next().await.is_none());
    }

    #[tokio::test]
    async fn vision_task_publishes_detections_and_skips_bad_frames() {
        let (mut publisher, subscriber) = frame_slot();
        let (detections_tx, mut detections) = detection_channel();
        let task = tokio::spawn(run_vision(
            TargetPipeline::new(PipelineConfig::default()),
            subscriber,
            detections_tx,
        ));

        publisher.publish(frame_with_bar(165));
        detections.changed().await.expect("detection");
        let first = (*detections.borrow_and_update()).expect("detection");
        assert_eq!(first.frame_seq, 1);
        assert_eq!(first.classification.pole().map(|p| p.center.x), Some(170.0));

        publisher.publish(RgbImage::from_pixel(64, 48, ORANGE));
        publisher.publish(frame_with_bar(100));
        drop(publisher);

        let pipeline = task.await.expect("vision task");
        assert_eq!(pipeline.frames_processed(), 2);
        let last = (*detections.borrow()).expect("detection");
        assert_eq!(last.frame_seq, 3);
        assert_eq!(last.classification.pole().map(|p| p.center.x), Some(105.0));
    }

    #[tokio::test]
    async fn malformed_frame_publishes_nothing() {
        let (mut publisher, subscriber) = frame_slot();
        let (detections_tx, mut detections) = detection_channel();
        let task = tokio::spawn(run_vision(
            TargetPipeline::new(PipelineConfig::default()),
            subscriber,
            detections_tx,
        ));

        publisher.publish(RgbImage::from_pixel(10, 10, ORANGE));
        drop(publisher);
        let pipeline = task.await.expect("vision task");

        assert_eq!(pipeline.frames_processed(), 0);
        assert!(!detections.has_changed().unwrap_or(false));
        assert!(detections.borrow_and_update().is_none());
    }

    #[test]
    fn rig_routes_by_facing() {
        let back = PipelineConfig {
            orientation: Orientation::UpsideDown,
            ..PipelineConfig::default()
        };
        let mut rig = CameraRig::new(PipelineConfig::default(), back);
        let frame = frame_with_bar(140);

        let front = rig.process(true, &frame).expect("front frame");
        let rear = rig.process(false, &frame).expect("back frame");

        assert_eq!(front.pole().map(|p| p.center.x), Some(145.0));
        assert_eq!(rear.pole().map(|p| p.center.x), Some(175.0));
        assert_eq!(rig.front().frames_processed(), 1);
        assert_eq!(rig.back().frames_processed(), 1);
    }
}
