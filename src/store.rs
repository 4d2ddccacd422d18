//! The ordered, append-only frame collection of the active run.

use std::sync::Arc;

use crate::{error::FilmstripError, frame::Frame};

/// Holds the frames captured so far by the current run.
///
/// Frames are kept behind [`Arc`] so that [`snapshot`](FrameStore::snapshot)
/// is cheap enough to call on every presentation refresh.
#[derive(Debug, Default, Clone)]
pub struct FrameStore {
    frames: Vec<Arc<Frame>>,
}

impl FrameStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every frame.
    pub fn reset(&mut self) {
        self.frames.clear();
    }

    /// Append a frame at the end of the sequence.
    ///
    /// # Errors
    ///
    /// Returns [`FilmstripError::OutOfOrder`] unless `frame.index()` equals
    /// the current length.
    pub fn append(&mut self, frame: Frame) -> Result<(), FilmstripError> {
        let expected = self.frames.len() as u64;
        if frame.index() != expected {
            return Err(FilmstripError::OutOfOrder {
                expected,
                found: frame.index(),
            });
        }
        self.frames.push(Arc::new(frame));
        Ok(())
    }

    /// An ordered copy of the frames appended so far.
    pub fn snapshot(&self) -> Vec<Arc<Frame>> {
        self.frames.clone()
    }

    /// Number of frames held.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if no frame has been appended since the last reset.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The most recently appended frame.
    pub fn last(&self) -> Option<&Arc<Frame>> {
        self.frames.last()
    }
}
