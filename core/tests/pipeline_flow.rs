mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::{colour_builder, face_frame};
use spritevault_core::{
    AddFrameOutcome, BufferConfig, CapacityConfig, CapacityGuard, DiskUsage, EntryRef,
    EvictionPolicy, FlushReport, IngestionPipeline, Result, SkipReason, SpriteError, WorkerGate,
};

const FACE: [u8; 3] = [150, 90, 60];

fn pipeline(root: &Path, max_frames: usize, min_frames: usize, cooldown: Duration) -> IngestionPipeline {
    IngestionPipeline::new(
        colour_builder(root),
        BufferConfig {
            max_frames,
            min_frames,
        },
        WorkerGate::new(cooldown, Duration::from_secs(30)),
    )
    .expect("pipeline")
}

fn wait(outcome: FlushReport) -> EntryRef {
    match outcome {
        FlushReport::Dispatched(ticket) => ticket.wait().expect("build"),
        other => panic!("expected a dispatched build, got {other:?}"),
    }
}

#[test]
fn full_buffer_dispatches_exactly_once() {
    let dir = tempfile::tempdir().expect("tmp");
    let pipeline = pipeline(dir.path(), 6, 2, Duration::ZERO);

    let mut tickets = Vec::new();
    for i in 0..10 {
        match pipeline.add_frame(face_frame(FACE)).expect("add") {
            AddFrameOutcome::Buffered { len } => assert_eq!(len, i + 1),
            AddFrameOutcome::Dispatched(ticket) => {
                assert_eq!(i, 5);
                tickets.push(ticket);
            }
            AddFrameOutcome::Ignored => assert!(i > 5),
            AddFrameOutcome::Skipped(reason) => panic!("unexpected skip: {reason}"),
        }
    }
    assert_eq!(tickets.len(), 1);
    let entry = tickets.pop().expect("ticket").wait().expect("build");
    assert_eq!(entry.frame_count, 6);

    assert!(matches!(
        pipeline.flush_on_signal().expect("flush"),
        FlushReport::AlreadyDispatched
    ));
    assert_eq!(pipeline.buffered(), 0);
    assert_eq!(pipeline.archive().entry_count().expect("count"), 1);
}

#[test]
fn flush_trims_edges_before_building() {
    let dir = tempfile::tempdir().expect("tmp");
    let min = 4;
    let pipeline = pipeline(dir.path(), 100, min, Duration::ZERO);
    for _ in 0..min + 9 {
        pipeline.add_frame(face_frame(FACE)).expect("add");
    }
    let entry = wait(pipeline.flush_on_signal().expect("flush"));
    assert_eq!(entry.frame_count, min + 1);
    assert_eq!(pipeline.buffered(), 0);
}

#[test]
fn short_session_is_insufficient() {
    let dir = tempfile::tempdir().expect("tmp");
    let pipeline = pipeline(dir.path(), 100, 4, Duration::ZERO);
    for _ in 0..4 {
        pipeline.add_frame(face_frame(FACE)).expect("add");
    }
    match pipeline.flush_on_signal() {
        Err(SpriteError::InsufficientFrames { count: 4, min: 4 }) => {}
        other => panic!("expected insufficient frames, got {other:?}"),
    }
    assert_eq!(pipeline.buffered(), 0);
    assert_eq!(pipeline.archive().entry_count().expect("count"), 0);
}

#[test]
fn frames_without_box_are_rejected() {
    let dir = tempfile::tempdir().expect("tmp");
    let pipeline = pipeline(dir.path(), 10, 2, Duration::ZERO);
    let mut frame = face_frame(FACE);
    frame.bbox = None;
    assert!(matches!(
        pipeline.add_frame(frame),
        Err(SpriteError::InvalidInput { .. })
    ));
    assert_eq!(pipeline.buffered(), 0);
}

#[test]
fn cooldown_skips_the_next_session() {
    let dir = tempfile::tempdir().expect("tmp");
    let pipeline = pipeline(dir.path(), 100, 2, Duration::from_secs(60));

    for _ in 0..5 {
        pipeline.add_frame(face_frame(FACE)).expect("add");
    }
    wait(pipeline.flush_on_signal().expect("flush"));

    for _ in 0..5 {
        pipeline.add_frame(face_frame(FACE)).expect("add");
    }
    match pipeline.flush_on_signal().expect("flush") {
        FlushReport::Skipped(SkipReason::TooSoon { .. }) => {}
        other => panic!("expected cooldown skip, got {other:?}"),
    }
    assert!(!pipeline.is_busy());

    pipeline.reset();
    for _ in 0..5 {
        pipeline.add_frame(face_frame(FACE)).expect("add");
    }
    wait(pipeline.flush_on_signal().expect("flush"));
    assert_eq!(pipeline.archive().entry_count().expect("count"), 2);
}

struct FullDisk;

impl DiskUsage for FullDisk {
    fn usage_percent(&self, _path: &Path) -> Result<f64> {
        Ok(97.5)
    }
}

#[test]
fn capacity_guard_evicts_before_building() {
    let dir = tempfile::tempdir().expect("tmp");
    let stale = dir.path().join("X#1990-01-01-00-00-00-000");
    std::fs::create_dir_all(&stale).expect("mkdir");

    let guard = CapacityGuard::new(
        Arc::new(FullDisk),
        CapacityConfig {
            policy: EvictionPolicy::Count(1),
            ..CapacityConfig::default()
        },
    );
    let pipeline = pipeline(dir.path(), 100, 2, Duration::ZERO).with_capacity_guard(guard);
    for _ in 0..4 {
        pipeline.add_frame(face_frame(FACE)).expect("add");
    }
    let entry = wait(pipeline.flush_on_signal().expect("flush"));

    assert!(!stale.exists());
    let listed: Vec<_> = pipeline.archive().list_entries().expect("list").collect();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].entry, entry);
}
