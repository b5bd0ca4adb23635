use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "spritevault")]
#[command(about = "Face-capture spritesheets with a nearest/farthest face archive", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// Config file (JSON). Missing or unreadable files fall back to defaults.
    #[arg(long, global = true, default_value = "spritevault.json")]
    pub(crate) config: PathBuf,

    /// Archive root override (otherwise config, then SPRITEVAULT_ARCHIVE).
    #[arg(long, global = true)]
    pub(crate) archive: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub(crate) verbose: u8,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Rank archive entries by similarity to the face in an image.
    Query {
        image: PathBuf,
        /// Total results, split between nearest and farthest.
        #[arg(short, default_value_t = 6)]
        k: usize,
        /// Seed for the padding jitter (reproducible output).
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Build one spritesheet from a folder of captured frames.
    Build {
        #[arg(required_unless_present = "frames")]
        dir: Option<PathBuf>,
        /// JSON array of captured frames: [{"image": "data:image/jpeg;base64,...", "bbox": [x, y, w, h]}]
        #[arg(long, conflicts_with_all = ["dir", "bboxes", "exts"])]
        frames: Option<PathBuf>,
        /// JSON object mapping file names to [x, y, w, h] face boxes.
        #[arg(long)]
        bboxes: Option<PathBuf>,
        /// Frame extensions to include (repeatable). Default: jpg, jpeg, png
        #[arg(long = "ext")]
        exts: Vec<String>,
    },

    /// Build spritesheets from a video file or a folder of videos.
    IngestVideo {
        path: PathBuf,
        /// Sampling rate override.
        #[arg(long)]
        fps: Option<u32>,
        /// Processed-video log (videos listed here are skipped).
        #[arg(long, default_value = "processed_videos.log")]
        log: PathBuf,
    },

    /// Evict the oldest entries when the disk is over the usage threshold.
    Evict {
        /// Evict one batch regardless of disk usage.
        #[arg(long)]
        force: bool,
    },

    /// Remove entry folders left behind by interrupted commits.
    Doctor,

    /// Archive and disk summary.
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Configuration helpers.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigCommand {
    /// Write the effective configuration to the config path.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
}
