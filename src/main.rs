// Module declarations
mod cli;
mod config_file;
mod ingest;
mod util;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use spritevault_core::{
    AddFrameOutcome, BoundingBox, DiskUsage, FaceEmbedder, FfmpegExtractor, FlushReport, Frame,
    Fs2DiskUsage, HttpFaceEmbedder, ImageCompositor, SpriteError, SpriteVaultConfig, search,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, ConfigCommand};
use crate::config_file::{load_file_config, save_file_config};
use crate::ingest::VideoIngest;
use crate::util::{FRAME_EXTS, file_name, list_files, load_bboxes, load_frames_file};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_file_config(&cli.config);
    if let Some(root) = cli.archive.clone() {
        config.archive.root = root;
    }
    config.validate()?;

    match cli.command {
        Command::Query { image, k, seed } => cmd_query(&config, &image, k, seed),
        Command::Build {
            dir,
            frames,
            bboxes,
            exts,
        } => {
            let frames = match (frames, dir) {
                (Some(path), _) => load_frames_file(&path)?,
                (None, Some(dir)) => read_frame_dir(&dir, bboxes.as_deref(), &exts)?,
                (None, None) => Vec::new(),
            };
            cmd_build(&config, frames)
        }
        Command::IngestVideo { path, fps, log } => {
            let builder = config.builder(embedder(&config)?)?;
            let capacity = config.capacity_guard(Arc::new(Fs2DiskUsage));
            let extractor = FfmpegExtractor::new(config.video.clone());
            let ingest = VideoIngest {
                extractor: &extractor,
                builder: &builder,
                capacity: &capacity,
                fps: fps.unwrap_or(config.video.fps),
                log: &log,
            };
            let summary = ingest.run(&path)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Evict { force } => {
            let archive = config.open_archive()?;
            let guard = config.capacity_guard(Arc::new(Fs2DiskUsage));
            let removed = if force {
                guard.evict_now(&archive)?
            } else {
                guard.evict(&archive)?
            };
            println!("Evicted {removed} entries");
            Ok(())
        }
        Command::Doctor => {
            let archive = config.open_archive()?;
            let removed = archive.purge_incomplete()?;
            println!("Removed {removed} incomplete entries");
            Ok(())
        }
        Command::Status { json } => cmd_status(&config, json),
        Command::Config { command } => match command {
            ConfigCommand::Init { force } => {
                if cli.config.exists() && !force {
                    eprintln!(
                        "Refusing to overwrite existing config: {} (use --force)",
                        cli.config.display()
                    );
                    std::process::exit(2);
                }
                save_file_config(&cli.config, &config)?;
                println!("Wrote {}", cli.config.display());
                Ok(())
            }
            ConfigCommand::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(())
            }
        },
    }
}

fn embedder(config: &SpriteVaultConfig) -> Result<Arc<dyn FaceEmbedder>, SpriteError> {
    Ok(Arc::new(HttpFaceEmbedder::new(config.embedder.clone())?))
}

fn cmd_query(
    config: &SpriteVaultConfig,
    image: &Path,
    k: usize,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let compositor = ImageCompositor::default();
    let decoded = compositor.decode(&std::fs::read(image)?)?;
    let Some(live) = embedder(config)?.embed_face(&decoded)? else {
        eprintln!("No face found in {}", image.display());
        std::process::exit(2);
    };

    let archive = config.open_archive()?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let result = search::query(&archive, &live, k, &mut rng)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Frames from a capture folder, boxed from `bboxes` or else the whole image.
fn read_frame_dir(
    dir: &Path,
    bboxes: Option<&Path>,
    exts: &[String],
) -> Result<Vec<Frame>, Box<dyn std::error::Error>> {
    let boxes: HashMap<String, BoundingBox> = match bboxes {
        Some(path) => load_bboxes(path)?,
        None => HashMap::new(),
    };
    let mut frames = Vec::new();
    for path in list_files(dir, exts, FRAME_EXTS) {
        let bytes = std::fs::read(&path)?;
        let name = file_name(&path);
        let bbox = boxes.get(&name).copied();
        frames.push(Frame::new(bytes, bbox));
    }
    Ok(frames)
}

fn cmd_build(config: &SpriteVaultConfig, frames: Vec<Frame>) -> Result<(), Box<dyn std::error::Error>> {
    if frames.is_empty() {
        eprintln!("No frames found");
        std::process::exit(2);
    }

    let pipeline = config.pipeline(embedder(config)?, Arc::new(Fs2DiskUsage))?;
    let compositor = ImageCompositor::default();
    let mut tickets = Vec::new();

    for (index, mut frame) in frames.into_iter().enumerate() {
        if frame.bbox.is_none() {
            match compositor.decode(&frame.image) {
                Ok(img) => {
                    frame.bbox = Some(BoundingBox::new(
                        0.0,
                        0.0,
                        f64::from(img.width()),
                        f64::from(img.height()),
                    )?)
                }
                Err(err) => {
                    warn!(frame = index, %err, "skipping undecodable frame");
                    continue;
                }
            }
        }
        match pipeline.add_frame(frame)? {
            AddFrameOutcome::Dispatched(ticket) => tickets.push(ticket),
            AddFrameOutcome::Skipped(reason) => warn!(%reason, "build not started"),
            AddFrameOutcome::Buffered { .. } | AddFrameOutcome::Ignored => {}
        }
    }

    match pipeline.flush_on_signal() {
        Ok(FlushReport::Dispatched(ticket)) => tickets.push(ticket),
        Ok(FlushReport::Skipped(reason)) => warn!(%reason, "build not started"),
        Ok(FlushReport::AlreadyDispatched) => {}
        Err(SpriteError::InsufficientFrames { count, min }) => {
            eprintln!("Not enough frames: have {count}, need more than {min}");
            std::process::exit(2);
        }
        Err(err) => return Err(err.into()),
    }

    for ticket in tickets {
        let entry = ticket.wait()?;
        info!(entry = %entry.path, frames = entry.frame_count, "spritesheet committed");
        println!("{}", serde_json::to_string_pretty(&entry)?);
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    archive: String,
    entries: usize,
    incomplete: usize,
    disk_used_percent: Option<f64>,
    eviction_threshold_percent: f64,
    eviction_enabled: bool,
}

fn cmd_status(config: &SpriteVaultConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let archive = config.open_archive()?;
    let stats = archive.stats()?;
    let used = match Fs2DiskUsage.usage_percent(archive.root()) {
        Ok(used) => Some(used),
        Err(err) => {
            warn!(%err, "disk usage unavailable");
            None
        }
    };
    let report = StatusReport {
        archive: archive.root().display().to_string(),
        entries: stats.folders - stats.incomplete,
        incomplete: stats.incomplete,
        disk_used_percent: used,
        eviction_threshold_percent: config.capacity.threshold_percent,
        eviction_enabled: config.capacity.enabled,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("archive:    {}", report.archive);
        println!("entries:    {}", report.entries);
        println!("incomplete: {}", report.incomplete);
        match report.disk_used_percent {
            Some(used) => println!("disk used:  {used:.1}%"),
            None => println!("disk used:  unknown"),
        }
        println!(
            "eviction:   {} at {:.0}%",
            if report.eviction_enabled { "on" } else { "off" },
            report.eviction_threshold_percent
        );
    }
    Ok(())
}
