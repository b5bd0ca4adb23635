//! On-disk archive of committed spritesheet entries.
//!
//! Layout (one folder per entry, name encodes creation time):
//!
//! ```text
//! <root>/X#2024-08-01-14-03-22-117/
//!     descriptor.json                  {"descriptor": [...]}   (commit marker)
//!     spritesheet/
//!         342.200.200.jpg              composite, "<frames>.<cell>.<cell>.jpg"
//!         info.json                    {"numImages": n}
//! ```
//!
//! An entry is visible to readers only once `descriptor.json` exists; it is
//! always written last.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use chrono::Local;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::constants::{DESCRIPTOR_FILE, ENTRY_PREFIX, INFO_FILE, SPRITESHEET_DIR};
use crate::descriptor::{DescriptorExtractor, count_rendered_cells, read_descriptor, write_descriptor};
use crate::error::{Result, SpriteError};
use crate::types::{Embedding, EntryRef, SheetLayout, frame_count_from_file_name};

/// Metadata written next to the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryInfo {
    pub num_images: usize,
}

/// A committed entry together with its representative embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub entry: EntryRef,
    pub descriptor: Embedding,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveStats {
    /// Entry folders on disk.
    pub folders: usize,
    /// Folders without a descriptor sidecar (mid-commit or abandoned).
    pub incomplete: usize,
}

pub struct ArchiveStore {
    root: PathBuf,
    layout: SheetLayout,
    // Serialises commits against eviction and purging.
    write_lock: Mutex<()>,
}

impl ArchiveStore {
    /// Open (creating if needed) the archive rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, layout: SheetLayout) -> Result<Self> {
        layout.validate()?;
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            layout,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guard protects no data, so a poisoned lock is still usable.
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Persist an encoded composite, derive its descriptor and commit.
    ///
    /// Returns the committed entry, or removes the whole entry folder and
    /// fails when no descriptor could be produced.
    pub fn create_entry(
        &self,
        composite_jpeg: &[u8],
        frame_count: usize,
        extractor: &DescriptorExtractor,
    ) -> Result<EntryRef> {
        let _guard = self.lock();

        let (folder, entry_dir) = self.allocate_entry_dir()?;
        match self.commit_entry(&folder, &entry_dir, composite_jpeg, frame_count, extractor) {
            Ok(entry) => {
                info!(entry = %entry.path, frames = frame_count, "committed archive entry");
                Ok(entry)
            }
            Err(err) => {
                warn!(entry = %folder, %err, "entry not committed, rolling back");
                remove_entry_dir(&entry_dir);
                Err(err)
            }
        }
    }

    fn commit_entry(
        &self,
        folder: &str,
        entry_dir: &Path,
        composite_jpeg: &[u8],
        frame_count: usize,
        extractor: &DescriptorExtractor,
    ) -> Result<EntryRef> {
        let sheet_dir = entry_dir.join(SPRITESHEET_DIR);
        fs::create_dir_all(&sheet_dir)?;
        let file_name = self.layout.file_name(frame_count);
        let image_path = sheet_dir.join(&file_name);
        fs::write(&image_path, composite_jpeg)?;

        let sheet = image::open(&image_path)?.to_rgb8();
        let descriptor = extractor
            .extract(&sheet)
            .ok_or_else(|| SpriteError::DescriptorNotFound {
                path: image_path.clone(),
            })?;

        let info = EntryInfo {
            num_images: count_rendered_cells(&sheet, &self.layout),
        };
        if let Err(err) = write_info(&sheet_dir.join(INFO_FILE), &info) {
            warn!(entry = %folder, %err, "failed to write entry info");
        }

        write_descriptor(&entry_dir.join(DESCRIPTOR_FILE), &descriptor)?;

        Ok(EntryRef {
            folder: folder.to_string(),
            path: format!("{folder}/{SPRITESHEET_DIR}/{file_name}"),
            frame_count,
        })
    }

    /// Claim a fresh timestamped folder; `-N` suffixes break collisions.
    fn allocate_entry_dir(&self) -> Result<(String, PathBuf)> {
        let base = format!("{ENTRY_PREFIX}{}", Local::now().format("%Y-%m-%d-%H-%M-%S-%3f"));
        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                base.clone()
            } else {
                format!("{base}-{suffix}")
            };
            let dir = self.root.join(&name);
            match std::fs::create_dir(&dir) {
                Ok(()) => return Ok((name, dir)),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
                Err(err) => return Err(SpriteError::io_at(err, dir)),
            }
        }
    }

    /// Remove the `n` oldest entry folders (creation time ascending).
    pub fn delete_oldest(&self, n: usize) -> Result<usize> {
        let _guard = self.lock();
        let mut folders = self.folders_with_age()?;
        folders.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let mut removed = 0;
        for (name, _) in folders.into_iter().take(n) {
            let dir = self.root.join(&name);
            match fs::remove_dir_all(&dir) {
                Ok(()) => {
                    info!(entry = %name, "evicted archive entry");
                    removed += 1;
                }
                Err(err) => error!(entry = %name, %err, "failed to evict archive entry"),
            }
        }
        Ok(removed)
    }

    /// Delete every entry folder that never received a descriptor.
    pub fn purge_incomplete(&self) -> Result<usize> {
        let _guard = self.lock();
        let mut removed = 0;
        for name in self.folder_names()? {
            let dir = self.root.join(&name);
            if dir.join(DESCRIPTOR_FILE).is_file() {
                continue;
            }
            match fs::remove_dir_all(&dir) {
                Ok(()) => {
                    info!(entry = %name, "purged incomplete entry");
                    removed += 1;
                }
                Err(err) => error!(entry = %name, %err, "failed to purge incomplete entry"),
            }
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Lazily enumerate committed entries in folder-name order.
    ///
    /// Folders whose sidecar or composite is missing or unreadable are
    /// skipped and logged.
    pub fn list_entries(&self) -> Result<Entries> {
        Ok(Entries {
            root: self.root.clone(),
            names: self.folder_names()?.into_iter(),
        })
    }

    pub fn entry_count(&self) -> Result<usize> {
        Ok(self.folder_names()?.len())
    }

    pub fn stats(&self) -> Result<ArchiveStats> {
        let names = self.folder_names()?;
        let incomplete = names
            .iter()
            .filter(|name| !self.root.join(name).join(DESCRIPTOR_FILE).is_file())
            .count();
        Ok(ArchiveStats {
            folders: names.len(),
            incomplete,
        })
    }

    /// Entry info written at commit time, if present.
    pub fn entry_info(&self, entry: &EntryRef) -> Result<EntryInfo> {
        let path = self
            .root
            .join(&entry.folder)
            .join(SPRITESHEET_DIR)
            .join(INFO_FILE);
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    fn folder_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for dirent in fs::read_dir(&self.root)? {
            let dirent = dirent?;
            if !dirent.file_type()?.is_dir() {
                continue;
            }
            let name = dirent.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    fn folders_with_age(&self) -> Result<Vec<(String, SystemTime)>> {
        let mut out = Vec::new();
        for name in self.folder_names()? {
            let meta = fs::metadata(self.root.join(&name))?;
            let created = meta
                .created()
                .or_else(|_| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            out.push((name, created));
        }
        Ok(out)
    }
}

/// Lazy iterator over committed entries.
pub struct Entries {
    root: PathBuf,
    names: std::vec::IntoIter<String>,
}

impl Iterator for Entries {
    type Item = ArchiveEntry;

    fn next(&mut self) -> Option<Self::Item> {
        for name in self.names.by_ref() {
            match resolve_entry(&self.root, &name) {
                Ok(entry) => return Some(entry),
                Err(err) => warn!(entry = %name, %err, "skipping unreadable archive entry"),
            }
        }
        None
    }
}

fn resolve_entry(root: &Path, folder: &str) -> Result<ArchiveEntry> {
    let entry_dir = root.join(folder);
    let descriptor_path = entry_dir.join(DESCRIPTOR_FILE);
    if !descriptor_path.is_file() {
        return Err(SpriteError::StorageCorruption {
            path: entry_dir,
            reason: "descriptor sidecar is missing".into(),
        });
    }
    let descriptor = read_descriptor(&descriptor_path)?;

    let sheet_dir = entry_dir.join(SPRITESHEET_DIR);
    let mut composites: Vec<String> = fs::read_dir(&sheet_dir)?
        .filter_map(|d| d.ok())
        .map(|d| d.file_name().to_string_lossy().into_owned())
        .filter(|name| name.to_ascii_lowercase().ends_with(".jpg"))
        .collect();
    composites.sort();
    let file_name = composites
        .into_iter()
        .next()
        .ok_or_else(|| SpriteError::StorageCorruption {
            path: sheet_dir.clone(),
            reason: "no composite image".into(),
        })?;
    let frame_count = frame_count_from_file_name(&file_name).unwrap_or(0);

    debug!(entry = folder, frames = frame_count, "resolved archive entry");
    Ok(ArchiveEntry {
        entry: EntryRef {
            folder: folder.to_string(),
            path: format!("{folder}/{SPRITESHEET_DIR}/{file_name}"),
            frame_count,
        },
        descriptor,
    })
}

fn write_info(path: &Path, info: &EntryInfo) -> Result<()> {
    fs::write(path, serde_json::to_vec(info)?)?;
    Ok(())
}

/// Best-effort recursive delete; failures are logged for manual cleanup.
fn remove_entry_dir(dir: &Path) {
    if let Err(err) = fs::remove_dir_all(dir) {
        error!(path = %dir.display(), %err, "rollback failed, remove this folder manually");
    }
}
