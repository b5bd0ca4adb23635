//! Frame buffer state machine for one capture session.
//!
//! The buffer itself is not synchronised; [`crate::pipeline::IngestionPipeline`]
//! keeps it behind a mutex so append and snapshot-and-clear are atomic with
//! respect to each other.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_FRAMES, DEFAULT_MIN_FRAMES, EDGE_TRIM, EDGE_TRIM_MIN_LEN};
use crate::error::{Result, SpriteError};
use crate::types::{BoundingBox, Frame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Frames that fill one cycle and trigger a build.
    pub max_frames: usize,
    /// A flush needs strictly more than this many frames to build.
    pub min_frames: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_frames: DEFAULT_MAX_FRAMES,
            min_frames: DEFAULT_MIN_FRAMES,
        }
    }
}

impl BufferConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_frames == 0 {
            return Err(SpriteError::invalid("max_frames must be positive"));
        }
        if self.min_frames >= self.max_frames {
            return Err(SpriteError::invalid("min_frames must be below max_frames"));
        }
        Ok(())
    }
}

/// Outcome of appending a frame.
#[derive(Debug)]
pub enum PushOutcome {
    /// Stored; the cycle is still filling.
    Appended { len: usize },
    /// Stored and the buffer reached capacity: build this snapshot.
    Dispatch(Vec<Frame>),
    /// The cycle already dispatched; the frame was dropped.
    Ignored,
}

/// Outcome of an end-of-session flush. The buffer is always cleared.
#[derive(Debug)]
pub enum FlushOutcome {
    /// Build this (edge-trimmed) snapshot.
    Dispatch(Vec<Frame>),
    /// Too few frames; nothing to build.
    Insufficient { count: usize },
    /// This cycle already dispatched at capacity.
    AlreadyDispatched,
}

#[derive(Debug)]
pub struct FrameBuffer {
    frames: Vec<Frame>,
    config: BufferConfig,
    dispatched: bool,
}

impl FrameBuffer {
    #[must_use]
    pub fn new(config: BufferConfig) -> Self {
        Self {
            frames: Vec::with_capacity(config.max_frames.min(256)),
            config,
            dispatched: false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[must_use]
    pub fn is_dispatched(&self) -> bool {
        self.dispatched
    }

    #[must_use]
    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Append a frame. Frames must carry a bounding box and a payload.
    pub fn push(&mut self, frame: Frame) -> Result<PushOutcome> {
        if frame.image.is_empty() {
            return Err(SpriteError::invalid("frame payload is empty"));
        }
        let Some(bbox) = &frame.bbox else {
            return Err(SpriteError::invalid("frame has no bounding box"));
        };
        // Fields are public, so a literal can bypass `BoundingBox::new`.
        BoundingBox::new(bbox.x, bbox.y, bbox.w, bbox.h)?;
        if self.dispatched || self.frames.len() >= self.config.max_frames {
            return Ok(PushOutcome::Ignored);
        }

        self.frames.push(frame);
        if self.frames.len() == self.config.max_frames {
            self.dispatched = true;
            return Ok(PushOutcome::Dispatch(self.frames.clone()));
        }
        Ok(PushOutcome::Appended {
            len: self.frames.len(),
        })
    }

    /// Snapshot and clear, trimming transitional frames at both ends.
    pub fn flush(&mut self) -> FlushOutcome {
        let frames = std::mem::take(&mut self.frames);
        let was_dispatched = std::mem::replace(&mut self.dispatched, false);

        if was_dispatched {
            return FlushOutcome::AlreadyDispatched;
        }
        if frames.len() <= self.config.min_frames {
            return FlushOutcome::Insufficient {
                count: frames.len(),
            };
        }
        FlushOutcome::Dispatch(trim_edges(frames))
    }

    /// Drop everything and start a fresh cycle.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.dispatched = false;
    }
}

/// Remove [`EDGE_TRIM`] frames from each end of sequences longer than
/// [`EDGE_TRIM_MIN_LEN`].
#[must_use]
pub fn trim_edges(mut frames: Vec<Frame>) -> Vec<Frame> {
    if frames.len() > EDGE_TRIM_MIN_LEN {
        frames.truncate(frames.len() - EDGE_TRIM);
        frames.drain(..EDGE_TRIM);
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> Frame {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0).expect("bbox");
        Frame::new(vec![tag], Some(bbox))
    }

    fn tags(frames: &[Frame]) -> Vec<u8> {
        frames.iter().map(|f| f.image[0]).collect()
    }

    fn buffer(max_frames: usize, min_frames: usize) -> FrameBuffer {
        FrameBuffer::new(BufferConfig {
            max_frames,
            min_frames,
        })
    }

    #[test]
    fn rejects_malformed_frames() {
        let mut buf = buffer(4, 1);
        assert!(buf.push(Frame::new(vec![1], None)).is_err());
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).expect("bbox");
        assert!(buf.push(Frame::new(Vec::new(), Some(bbox))).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_unvalidated_bounding_boxes() {
        let mut buf = buffer(4, 1);
        let negative = BoundingBox {
            x: 0.0,
            y: 0.0,
            w: -5.0,
            h: 10.0,
        };
        let nan = BoundingBox {
            x: 0.0,
            y: 0.0,
            w: 10.0,
            h: f64::NAN,
        };
        for bbox in [negative, nan] {
            assert!(matches!(
                buf.push(Frame::new(vec![1], Some(bbox))),
                Err(SpriteError::InvalidInput { .. })
            ));
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn dispatches_exactly_once_at_capacity() {
        let mut buf = buffer(5, 2);
        let mut dispatches = 0;
        for i in 0..12u8 {
            match buf.push(frame(i)).expect("push") {
                PushOutcome::Dispatch(snapshot) => {
                    dispatches += 1;
                    assert_eq!(i, 4);
                    assert_eq!(tags(&snapshot), vec![0, 1, 2, 3, 4]);
                }
                PushOutcome::Appended { len } => assert_eq!(len, usize::from(i) + 1),
                PushOutcome::Ignored => assert!(i >= 5),
            }
        }
        assert_eq!(dispatches, 1);
        assert_eq!(buf.len(), 5);
        assert!(matches!(buf.flush(), FlushOutcome::AlreadyDispatched));
        assert!(buf.is_empty());
        assert!(!buf.is_dispatched());
    }

    #[test]
    fn flush_trims_four_from_each_end() {
        let min = 16;
        let mut buf = buffer(100, min);
        for i in 0..(min + 9) as u8 {
            buf.push(frame(i)).expect("push");
        }
        match buf.flush() {
            FlushOutcome::Dispatch(snapshot) => {
                assert_eq!(snapshot.len(), min + 1);
                assert_eq!(snapshot[0].image[0], 4);
                assert_eq!(snapshot[min].image[0], 20);
            }
            other => panic!("expected dispatch, got {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn flush_at_minimum_reports_insufficient() {
        let mut buf = buffer(100, 16);
        for i in 0..16u8 {
            buf.push(frame(i)).expect("push");
        }
        assert!(matches!(buf.flush(), FlushOutcome::Insufficient { count: 16 }));
        assert!(buf.is_empty());
        assert!(matches!(buf.flush(), FlushOutcome::Insufficient { count: 0 }));
    }

    #[test]
    fn short_sequences_are_not_trimmed() {
        let frames: Vec<Frame> = (0..8).map(frame).collect();
        assert_eq!(trim_edges(frames).len(), 8);
        let frames: Vec<Frame> = (0..9).map(frame).collect();
        assert_eq!(tags(&trim_edges(frames)), vec![4]);
    }
}
