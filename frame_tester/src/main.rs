mod sim;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use pole_align::config::{ObjectCountConfig, RobotConfig};
use pole_align::control::alignment::AlignmentController;
use pole_align::control::collaborators::FixedTurret;
use pole_align::core_modules::annotate::{draw_regions, OUTLINE_GREEN};
use pole_align::core_modules::pole_analyzer::PoleAnalyzer;
use pole_align::diagnostics::DiagnosticsBus;
use pole_align::frame_feed::{detection_channel, frame_slot, run_vision};
use pole_align::pipeline::{PipelineKind, TargetPipeline};
use serde_json::json;
use sim::{SimDrive, TickBudget, World};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "frame_tester")]
#[command(about = "Runs the pole_align pipeline on images, or closes the loop on a simulated robot", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file; defaults are used when omitted
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a single image
    Detect {
        image: PathBuf,

        /// Count rings instead of looking for the pole
        #[arg(long)]
        count: bool,

        /// Write the frame with region outlines drawn on it
        #[arg(long)]
        annotate: Option<PathBuf>,

        /// Write the cleaned binary mask
        #[arg(long)]
        mask: Option<PathBuf>,
    },

    /// Align against a synthetic pole
    Simulate {
        /// Use the rear camera
        #[arg(long)]
        rear: bool,

        /// Give up after this many ticks
        #[arg(long, default_value = "500")]
        max_ticks: u64,

        /// Starting horizontal offset of the pole, pixels
        #[arg(long, default_value = "60.0", allow_negative_numbers = true)]
        offset: f64,

        /// Starting apparent pole width, pixels
        #[arg(long, default_value = "18.0")]
        width: f64,

        /// Turret angle from chassis forward, degrees
        #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
        turret: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level)).init();

    let config = match &cli.config {
        Some(path) => RobotConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RobotConfig::default(),
    };

    match cli.command {
        Commands::Detect {
            image,
            count,
            annotate,
            mask,
        } => detect(config, image, count, annotate, mask),
        Commands::Simulate {
            rear,
            max_ticks,
            offset,
            width,
            turret,
        } => simulate(config, rear, max_ticks, offset, width, turret).await,
    }
}

fn detect(
    mut config: RobotConfig,
    image_path: PathBuf,
    count: bool,
    annotate: Option<PathBuf>,
    mask: Option<PathBuf>,
) -> Result<()> {
    let frame = image::open(&image_path)
        .with_context(|| format!("opening {}", image_path.display()))?
        .to_rgb8();

    let (width, height) = frame.dimensions();
    if (width, height) != (config.pipeline.image_width, config.pipeline.image_height) {
        warn!(
            "image is {}x{}, config expects {}x{}; using the image size",
            width, height, config.pipeline.image_width, config.pipeline.image_height
        );
        config.pipeline.image_width = width;
        config.pipeline.image_height = height;
    }
    if count {
        config.pipeline.kind = PipelineKind::ObjectCount(ObjectCountConfig::default());
    }

    let mut pipeline = TargetPipeline::new(config.pipeline.clone());
    let classification = pipeline.process(&frame)?;
    info!("{} regions", pipeline.last_regions().len());

    let reading = classification.pole().map(|pole| {
        let mut analyzer = PoleAnalyzer::new(config.analyzer.clone());
        analyzer.analyze(Some(pole))
    });

    let report = json!({
        "image": image_path.display().to_string(),
        "classification": classification,
        "pole": reading,
        "regions": pipeline.last_regions(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(path) = mask {
        if let Some(mask) = pipeline.last_mask() {
            mask.to_gray_image()
                .save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            info!("mask written to {}", path.display());
        }
    }

    if let Some(path) = annotate {
        let mut canvas = frame.clone();
        draw_regions(&mut canvas, pipeline.last_regions(), OUTLINE_GREEN, 2);
        canvas
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("annotated frame written to {}", path.display());
    }

    Ok(())
}

async fn simulate(
    config: RobotConfig,
    rear: bool,
    max_ticks: u64,
    offset: f64,
    width: f64,
    turret_angle_deg: f64,
) -> Result<()> {
    let facing_front = !rear;
    let world = World::new(offset, width, turret_angle_deg, facing_front);
    info!(
        "simulating: offset {:.1} px, width {:.1} px, turret {:.1} deg, {} camera",
        offset,
        width,
        turret_angle_deg,
        if facing_front { "front" } else { "rear" }
    );

    let (publisher, frames) = frame_slot();
    let (detections_tx, mut detections) = detection_channel();
    let vision = tokio::spawn(run_vision(
        TargetPipeline::new(config.pipeline.clone()),
        frames,
        detections_tx,
    ));

    let mut drive = SimDrive::new(world, config.pipeline.clone(), publisher);
    drive.publish_frame();

    let bus = DiagnosticsBus::new(64);
    let mut snapshots = bus.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match snapshots.recv().await {
                Ok(snapshot) => debug!("{}", serde_json::to_string(&snapshot).unwrap_or_default()),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let turret = FixedTurret {
        angle_deg: turret_angle_deg,
        facing_front,
    };
    let budget = TickBudget::new(max_ticks);
    let mut controller = AlignmentController::new(config.control.clone(), config.analyzer.clone());
    let state = controller
        .run(&mut detections, &turret, &mut drive, &budget, Some(&bus))
        .await;

    let summary = json!({
        "state": state,
        "ticks": controller.ticks(),
        "drive_ticks": drive.drive_ticks,
        "final_offset_px": drive.world.offset_px,
        "final_width_px": drive.world.apparent_width_px(),
        "history": controller.history().to_pairs(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    // Dropping the frame publisher ends the vision task.
    drop(drive);
    drop(bus);
    vision.await.context("vision task")?;
    let _ = logger.await;
    Ok(())
}
