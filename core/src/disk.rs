use std::path::Path;

use crate::error::{Result, SpriteError};

/// Capability reporting how full the filesystem holding a path is.
pub trait DiskUsage: Send + Sync {
    /// Used space as a percentage in `[0, 100]`.
    fn usage_percent(&self, path: &Path) -> Result<f64>;
}

/// Reads total and available space through `fs2` (statvfs / GetDiskFreeSpaceEx).
#[derive(Debug, Clone, Copy, Default)]
pub struct Fs2DiskUsage;

impl DiskUsage for Fs2DiskUsage {
    fn usage_percent(&self, path: &Path) -> Result<f64> {
        let total = fs2::total_space(path).map_err(|e| SpriteError::io_at(e, path))?;
        let available = fs2::available_space(path).map_err(|e| SpriteError::io_at(e, path))?;
        Ok(used_percent(total, available))
    }
}

fn used_percent(total: u64, available: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let used = total.saturating_sub(available);
    (used as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}
