//! The ingestion pipeline: one object owning the frame buffer, the worker
//! gate and the build path for the lifetime of the process.

use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::archive::ArchiveStore;
use crate::buffer::{BufferConfig, FlushOutcome, FrameBuffer, PushOutcome};
use crate::builder::SpritesheetBuilder;
use crate::capacity::CapacityGuard;
use crate::error::{Result, SpriteError};
use crate::gate::{BuildTicket, SkipReason, Submission, WorkerGate};
use crate::search;
use crate::types::{EntryRef, Frame, QueryResult};

/// What happened to a frame handed to [`IngestionPipeline::add_frame`].
#[derive(Debug)]
pub enum AddFrameOutcome {
    Buffered { len: usize },
    /// The buffer filled up and a build was started.
    Dispatched(BuildTicket<EntryRef>),
    /// The buffer filled up but the gate turned the build away. The cycle
    /// still counts as dispatched.
    Skipped(SkipReason),
    /// The cycle already dispatched; the frame was dropped.
    Ignored,
}

/// What happened on an end-of-session flush.
#[derive(Debug)]
pub enum FlushReport {
    Dispatched(BuildTicket<EntryRef>),
    Skipped(SkipReason),
    /// The cycle already fired at capacity; the buffer was only cleared.
    AlreadyDispatched,
}

pub struct IngestionPipeline {
    buffer: Mutex<FrameBuffer>,
    gate: WorkerGate<EntryRef>,
    builder: Arc<SpritesheetBuilder>,
    capacity: Option<Arc<CapacityGuard>>,
}

impl IngestionPipeline {
    pub fn new(
        builder: SpritesheetBuilder,
        buffer: BufferConfig,
        gate: WorkerGate<EntryRef>,
    ) -> Result<Self> {
        buffer.validate()?;
        Ok(Self {
            buffer: Mutex::new(FrameBuffer::new(buffer)),
            gate,
            builder: Arc::new(builder),
            capacity: None,
        })
    }

    /// Run `guard` on the worker before every build.
    #[must_use]
    pub fn with_capacity_guard(mut self, guard: CapacityGuard) -> Self {
        self.capacity = Some(Arc::new(guard));
        self
    }

    #[must_use]
    pub fn archive(&self) -> &ArchiveStore {
        self.builder.archive()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.lock_buffer().len()
    }

    fn lock_buffer(&self) -> MutexGuard<'_, FrameBuffer> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one detected face frame; starts a build when the buffer fills.
    pub fn add_frame(&self, frame: Frame) -> Result<AddFrameOutcome> {
        let mut buffer = self.lock_buffer();
        match buffer.push(frame)? {
            PushOutcome::Appended { len } => Ok(AddFrameOutcome::Buffered { len }),
            PushOutcome::Ignored => Ok(AddFrameOutcome::Ignored),
            PushOutcome::Dispatch(snapshot) => {
                info!(frames = snapshot.len(), "frame buffer full, dispatching build");
                Ok(match self.submit(snapshot)? {
                    Submission::Accepted(ticket) => AddFrameOutcome::Dispatched(ticket),
                    Submission::Skipped(reason) => AddFrameOutcome::Skipped(reason),
                })
            }
        }
    }

    /// The face left the frame: build from what was captured, if enough.
    pub fn flush_on_signal(&self) -> Result<FlushReport> {
        let mut buffer = self.lock_buffer();
        let min = buffer.config().min_frames;
        match buffer.flush() {
            FlushOutcome::AlreadyDispatched => Ok(FlushReport::AlreadyDispatched),
            FlushOutcome::Insufficient { count } => {
                debug!(count, min, "flush with too few frames");
                Err(SpriteError::InsufficientFrames { count, min })
            }
            FlushOutcome::Dispatch(snapshot) => {
                info!(frames = snapshot.len(), "session ended, dispatching build");
                Ok(match self.submit(snapshot)? {
                    Submission::Accepted(ticket) => FlushReport::Dispatched(ticket),
                    Submission::Skipped(reason) => FlushReport::Skipped(reason),
                })
            }
        }
    }

    /// Clear buffered frames and the gate cooldown.
    pub fn reset(&self) {
        self.lock_buffer().reset();
        self.gate.clear_cooldown();
    }

    /// Nearest / farthest archive entries for a live embedding.
    pub fn query<R: Rng + ?Sized>(&self, live: &[f32], k: usize, rng: &mut R) -> Result<QueryResult> {
        search::query(self.archive(), live, k, rng)
    }

    fn submit(&self, frames: Vec<Frame>) -> Result<Submission<EntryRef>> {
        let builder = Arc::clone(&self.builder);
        let capacity = self.capacity.clone();
        let submission = self.gate.submit(Box::new(move || {
            if let Some(guard) = capacity {
                if let Err(err) = guard.evict(builder.archive()) {
                    warn!(%err, "capacity check failed");
                }
            }
            builder.build(&frames)
        }))?;
        if let Submission::Skipped(reason) = &submission {
            info!(%reason, "build not started");
        }
        Ok(submission)
    }
}
