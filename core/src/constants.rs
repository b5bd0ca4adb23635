/// Edge length (pixels) of one spritesheet cell.
pub const DEFAULT_CELL_SIZE: u32 = 200;
/// Cells per spritesheet row.
pub const DEFAULT_COLUMNS: u32 = 19;
/// Frames that fill one capture cycle (100 rows of 19 cells).
pub const DEFAULT_MAX_FRAMES: usize = 100 * 19;
/// A flush must hold strictly more frames than this to produce a build.
pub const DEFAULT_MIN_FRAMES: usize = 16;
/// Frames dropped from each end of a flushed capture burst.
pub const EDGE_TRIM: usize = 4;
/// Edge trimming only applies to snapshots longer than this.
pub const EDGE_TRIM_MIN_LEN: usize = 2 * EDGE_TRIM;

/// Minimum spacing between two accepted builds.
pub const DEFAULT_COOLDOWN_SECS: u64 = 60;
/// Hard deadline for one build.
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 10 * 60;

/// Successful cell embeddings collected before sampling stops.
pub const DEFAULT_SAMPLE_QUOTA: usize = 5;

/// Disk usage (percent) above which the oldest entries are evicted.
pub const DEFAULT_USAGE_THRESHOLD_PERCENT: f64 = 80.0;
/// Fixed eviction count used by the `count` policy.
pub const DEFAULT_EVICT_COUNT: usize = 10;
/// Divisor used by the `fraction` policy (one-sixth of the population).
pub const DEFAULT_EVICT_DIVISOR: usize = 6;

/// Relative jitter applied to the distance of padded query results.
pub const PAD_JITTER: f32 = 0.10;

/// Channel value above which a pixel counts as white.
pub const WHITE_CHANNEL_THRESHOLD: u8 = 250;
/// A cell whose white-pixel share exceeds this is treated as blank.
pub const BLANK_CELL_RATIO: f32 = 0.75;

/// JPEG quality used when encoding composites.
pub const JPEG_QUALITY: u8 = 80;

/// Prefix of every archive entry folder name.
pub const ENTRY_PREFIX: &str = "X#";
/// Sub-folder of an entry holding the composite image.
pub const SPRITESHEET_DIR: &str = "spritesheet";
/// Sidecar holding the representative embedding; its presence commits an entry.
pub const DESCRIPTOR_FILE: &str = "descriptor.json";
/// Rendered-cell metadata written next to the composite.
pub const INFO_FILE: &str = "info.json";

/// Default frame sampling rate for video ingestion.
pub const DEFAULT_VIDEO_FPS: u32 = 10;
/// Videos shorter than this are rejected.
pub const MIN_VIDEO_SECS: f64 = 5.0;
