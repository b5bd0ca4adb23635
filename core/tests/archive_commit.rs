mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{
    BlindEmbedder, CELL, ColourEmbedder, assert_close, builder_with, colour_builder, face_frame,
    scaled,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use image::RgbImage;
use spritevault_core::archive::EntryInfo;
use spritevault_core::descriptor::read_descriptor;
use spritevault_core::{Embedding, FaceEmbedder, Frame, Result, SpriteError};

const RED: [u8; 3] = [180, 40, 40];
const GREEN: [u8; 3] = [40, 160, 60];

#[test]
fn committed_entry_has_composite_descriptor_and_info() {
    let dir = tempfile::tempdir().expect("tmp");
    let builder = colour_builder(dir.path());
    let frames: Vec<Frame> = (0..6).map(|_| face_frame(RED)).collect();

    let entry = builder.build(&frames).expect("build");
    assert_eq!(entry.frame_count, 6);
    assert!(entry.folder.starts_with("X#"));
    assert_eq!(
        entry.path,
        format!("{}/spritesheet/6.{CELL}.{CELL}.jpg", entry.folder)
    );

    let root = builder.archive().root();
    assert!(entry.absolute(root).is_file());
    let descriptor =
        read_descriptor(&root.join(&entry.folder).join("descriptor.json")).expect("descriptor");
    assert_close(&descriptor, &scaled(RED), 0.03);

    let info: EntryInfo = builder.archive().entry_info(&entry).expect("info");
    assert_eq!(info.num_images, 6);
}

#[test]
fn descriptor_averages_the_first_cells_only() {
    let dir = tempfile::tempdir().expect("tmp");
    let builder = colour_builder(dir.path());
    // quota is 5: four red cells and one green, the trailing green cells are not sampled
    let mut frames: Vec<Frame> = (0..4).map(|_| face_frame(RED)).collect();
    frames.extend((0..4).map(|_| face_frame(GREEN)));

    let entry = builder.build(&frames).expect("build");
    let listed: Vec<_> = builder.archive().list_entries().expect("list").collect();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].entry, entry);

    let expected: Vec<f32> = scaled(RED)
        .iter()
        .zip(scaled(GREEN))
        .map(|(r, g)| (4.0 * r + g) / 5.0)
        .collect();
    assert_close(&listed[0].descriptor, &expected, 0.03);
}

#[test]
fn failed_extraction_leaves_no_entry_behind() {
    let dir = tempfile::tempdir().expect("tmp");
    let builder = builder_with(dir.path(), Arc::new(BlindEmbedder));
    let frames: Vec<Frame> = (0..5).map(|_| face_frame(RED)).collect();

    let err = builder.build(&frames).expect_err("no face anywhere");
    assert!(matches!(err, SpriteError::DescriptorNotFound { .. }));

    let leftovers = std::fs::read_dir(builder.archive().root())
        .expect("read root")
        .count();
    assert_eq!(leftovers, 0);
    assert_eq!(builder.archive().list_entries().expect("list").count(), 0);
}

#[test]
fn half_written_entries_are_invisible_until_purged() {
    let dir = tempfile::tempdir().expect("tmp");
    let builder = colour_builder(dir.path());
    let frames: Vec<Frame> = (0..3).map(|_| face_frame(GREEN)).collect();
    builder.build(&frames).expect("build");

    let root = builder.archive().root();
    let partial = root.join("X#2000-01-01-00-00-00-000").join("spritesheet");
    std::fs::create_dir_all(&partial).expect("mkdir");
    std::fs::write(partial.join("3.16.16.jpg"), b"not really a jpeg").expect("write");

    assert_eq!(builder.archive().list_entries().expect("list").count(), 1);
    let stats = builder.archive().stats().expect("stats");
    assert_eq!(stats.folders, 2);
    assert_eq!(stats.incomplete, 1);

    assert_eq!(builder.archive().purge_incomplete().expect("purge"), 1);
    assert_eq!(builder.archive().entry_count().expect("count"), 1);
}

#[test]
fn corrupt_descriptor_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().expect("tmp");
    let builder = colour_builder(dir.path());
    let frames: Vec<Frame> = (0..3).map(|_| face_frame(RED)).collect();
    let good = builder.build(&frames).expect("build");

    let root = builder.archive().root();
    let broken = root.join("X#1999-01-01-00-00-00-000");
    std::fs::create_dir_all(broken.join("spritesheet")).expect("mkdir");
    std::fs::write(broken.join("spritesheet").join("3.16.16.jpg"), b"jpg").expect("write");
    std::fs::write(broken.join("descriptor.json"), b"{\"descriptor\": [1.0,").expect("write");

    let listed: Vec<_> = builder.archive().list_entries().expect("list").collect();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].entry, good);
}

/// Signals the first sampled cell, then blocks every call until released.
struct GatedEmbedder {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl FaceEmbedder for GatedEmbedder {
    fn kind(&self) -> &str {
        "gated"
    }

    fn embed_face(&self, image: &RgbImage) -> Result<Option<Embedding>> {
        let _ = self.entered.try_send(());
        // Err once the sender is dropped: released.
        let _ = self.release.recv();
        ColourEmbedder.embed_face(image)
    }
}

#[test]
fn eviction_waits_for_an_entry_mid_commit() {
    let dir = tempfile::tempdir().expect("tmp");
    let (entered_tx, entered_rx) = bounded(1);
    let (release_tx, release_rx) = bounded::<()>(0);
    let builder = Arc::new(builder_with(
        dir.path(),
        Arc::new(GatedEmbedder {
            entered: entered_tx,
            release: release_rx,
        }),
    ));

    let build = {
        let builder = Arc::clone(&builder);
        thread::spawn(move || {
            let frames: Vec<Frame> = (0..3).map(|_| face_frame(RED)).collect();
            builder.build(&frames)
        })
    };
    entered_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("sampling started");

    let (purged_tx, purged_rx) = bounded(1);
    let purger = {
        let builder = Arc::clone(&builder);
        thread::spawn(move || {
            let removed = builder.archive().purge_incomplete().expect("purge");
            purged_tx.send(removed).expect("report purge");
        })
    };
    let (evicted_tx, evicted_rx) = bounded(1);
    let evictor = {
        let builder = Arc::clone(&builder);
        thread::spawn(move || {
            let removed = builder.archive().delete_oldest(5).expect("evict");
            evicted_tx.send(removed).expect("report evict");
        })
    };

    // Both maintenance calls are parked on the archive lock while sampling runs.
    assert_eq!(
        purged_rx.recv_timeout(Duration::from_millis(200)),
        Err(RecvTimeoutError::Timeout)
    );
    assert_eq!(
        evicted_rx.recv_timeout(Duration::from_millis(50)),
        Err(RecvTimeoutError::Timeout)
    );
    let folders: Vec<_> = std::fs::read_dir(builder.archive().root())
        .expect("read root")
        .map(|d| d.expect("dirent").path())
        .collect();
    assert_eq!(folders.len(), 1);
    assert!(folders[0].join("spritesheet").is_dir());
    assert!(!folders[0].join("descriptor.json").exists());

    drop(release_tx);
    let entry = build.join().expect("join build").expect("build");
    purger.join().expect("join purge");
    evictor.join().expect("join evict");

    // The purge never saw the entry without its descriptor.
    assert_eq!(purged_rx.recv().expect("purge count"), 0);
    // Eviction removed the entry only after the commit finished.
    assert_eq!(evicted_rx.recv().expect("evict count"), 1);
    assert!(!builder.archive().root().join(&entry.folder).exists());
}
