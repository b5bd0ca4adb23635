//! Disk-usage triggered eviction of the oldest archive entries.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::archive::ArchiveStore;
use crate::constants::{DEFAULT_EVICT_COUNT, DEFAULT_EVICT_DIVISOR, DEFAULT_USAGE_THRESHOLD_PERCENT};
use crate::disk::DiskUsage;
use crate::error::Result;

/// How many entries one eviction pass removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// A fixed number of entries.
    Count(usize),
    /// `entries / divisor` entries, at least one.
    Fraction(usize),
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::Fraction(DEFAULT_EVICT_DIVISOR)
    }
}

impl EvictionPolicy {
    /// Entries to remove from an archive holding `population` entries.
    #[must_use]
    pub fn batch_size(&self, population: usize) -> usize {
        let n = match *self {
            Self::Count(n) => n,
            Self::Fraction(divisor) => (population / divisor.max(1)).max(1),
        };
        n.min(population)
    }

    #[must_use]
    pub fn fixed() -> Self {
        Self::Count(DEFAULT_EVICT_COUNT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub enabled: bool,
    /// Usage percentage at or above which eviction runs.
    pub threshold_percent: f64,
    pub policy: EvictionPolicy,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_percent: DEFAULT_USAGE_THRESHOLD_PERCENT,
            policy: EvictionPolicy::default(),
        }
    }
}

pub struct CapacityGuard {
    usage: Arc<dyn DiskUsage>,
    config: CapacityConfig,
}

impl CapacityGuard {
    pub fn new(usage: Arc<dyn DiskUsage>, config: CapacityConfig) -> Self {
        Self { usage, config }
    }

    #[must_use]
    pub fn config(&self) -> &CapacityConfig {
        &self.config
    }

    /// Current usage of the volume holding `root`, in percent.
    pub fn usage_percent(&self, root: &Path) -> Result<f64> {
        self.usage.usage_percent(root)
    }

    /// True when the guard is enabled and usage meets the threshold.
    pub fn should_evict(&self, root: &Path) -> Result<bool> {
        if !self.config.enabled {
            return Ok(false);
        }
        let used = self.usage.usage_percent(root)?;
        debug!(used, threshold = self.config.threshold_percent, "disk usage check");
        Ok(used >= self.config.threshold_percent)
    }

    /// Evict the oldest entries if usage is over the threshold.
    pub fn evict(&self, archive: &ArchiveStore) -> Result<usize> {
        if !self.should_evict(archive.root())? {
            return Ok(0);
        }
        self.evict_now(archive)
    }

    /// Evict one batch regardless of current usage.
    pub fn evict_now(&self, archive: &ArchiveStore) -> Result<usize> {
        let population = archive.entry_count()?;
        let batch = self.config.policy.batch_size(population);
        if batch == 0 {
            return Ok(0);
        }
        let removed = archive.delete_oldest(batch)?;
        info!(removed, population, "capacity eviction");
        Ok(removed)
    }
}
