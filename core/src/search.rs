//! Nearest / farthest lookup over the archive by linear scan.

use rand::Rng;
use tracing::{debug, warn};

use crate::archive::ArchiveStore;
use crate::constants::PAD_JITTER;
use crate::error::{Result, SpriteError};
use crate::types::{EntryRef, QueryMatch, QueryResult};

/// One archive entry scored against the live embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub entry: EntryRef,
    pub distance: f32,
}

impl ScoredEntry {
    fn to_match(&self, distance: f32) -> QueryMatch {
        QueryMatch {
            entry: self.entry.path.clone(),
            frame_count: self.entry.frame_count,
            distance,
        }
    }
}

#[must_use]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Score every comparable archive entry against `live`.
///
/// Entries whose descriptor dimension differs from `live` are skipped.
pub fn score_archive(archive: &ArchiveStore, live: &[f32]) -> Result<Vec<ScoredEntry>> {
    let mut scored = Vec::new();
    for item in archive.list_entries()? {
        if item.descriptor.len() != live.len() {
            warn!(
                entry = %item.entry.folder,
                expected = live.len(),
                actual = item.descriptor.len(),
                "descriptor dimension mismatch, skipping entry"
            );
            continue;
        }
        let distance = euclidean_distance(live, &item.descriptor);
        scored.push(ScoredEntry {
            entry: item.entry,
            distance,
        });
    }
    Ok(scored)
}

/// Run a similarity query: `ceil(k/2)` nearest and `floor(k/2)` farthest.
pub fn query<R: Rng + ?Sized>(
    archive: &ArchiveStore,
    live: &[f32],
    k: usize,
    rng: &mut R,
) -> Result<QueryResult> {
    if live.is_empty() {
        return Err(SpriteError::invalid("live embedding is empty"));
    }
    let scored = score_archive(archive, live)?;
    debug!(candidates = scored.len(), k, "similarity query");
    Ok(select(scored, k, rng))
}

/// Rank scored entries and split them into nearest and farthest halves.
///
/// Each half is padded to its target length by cycling through its own
/// entries with jittered distances. An empty candidate set yields empty halves.
pub fn select<R: Rng + ?Sized>(mut scored: Vec<ScoredEntry>, k: usize, rng: &mut R) -> QueryResult {
    let near_target = k.div_ceil(2);
    let far_target = k / 2;

    // Stable sort: ties keep archive enumeration order.
    scored.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let near_len = near_target.min(scored.len());
    let far_len = far_target.min(scored.len());
    let nearest: Vec<&ScoredEntry> = scored[..near_len].iter().collect();
    let farthest: Vec<&ScoredEntry> = scored[scored.len() - far_len..].iter().rev().collect();

    QueryResult {
        most_similar: pad(&nearest, near_target, rng),
        least_similar: pad(&farthest, far_target, rng),
    }
}

fn pad<R: Rng + ?Sized>(picked: &[&ScoredEntry], target: usize, rng: &mut R) -> Vec<QueryMatch> {
    let mut out: Vec<QueryMatch> = picked.iter().map(|s| s.to_match(s.distance)).collect();
    if picked.is_empty() {
        return out;
    }
    for source in picked.iter().cycle().take(target.saturating_sub(picked.len())) {
        let jitter = rng.gen_range(-PAD_JITTER..=PAD_JITTER);
        let distance = (source.distance * (1.0 + jitter)).max(0.0);
        out.push(source.to_match(distance));
    }
    out
}
