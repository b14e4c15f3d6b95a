//! Time-indexed store of decoded frames shared with renderers

use crate::frames::DecodedFrame;
use parking_lot::RwLock;
use std::sync::Arc;

/// Which frame to pick relative to a lookup time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameLocation {
    /// Greatest pts at or before the time
    Near,
    /// Greatest pts strictly before the time
    Before,
    /// Smallest pts strictly after the time
    After,
}

/// Decoded frames of one stream, ordered by presentation time
#[derive(Debug, Default)]
pub struct DecodedStream {
    frames: RwLock<Vec<Arc<DecodedFrame>>>,
}

impl DecodedStream {
    /// Create an empty stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a frame, replacing any frame with the same pts
    pub fn insert(&self, frame: Arc<DecodedFrame>) {
        let mut frames = self.frames.write();
        match frames.binary_search_by(|f| f.pts.total_cmp(&frame.pts)) {
            Ok(index) => frames[index] = frame,
            Err(index) => frames.insert(index, frame),
        }
    }

    /// Look up a frame relative to `time`
    pub fn get_frame(&self, time: f64, location: FrameLocation) -> Option<Arc<DecodedFrame>> {
        let frames = self.frames.read();
        // Index of the first frame with pts > time
        let after = frames.partition_point(|f| f.pts <= time);
        match location {
            FrameLocation::Near => after.checked_sub(1).map(|i| frames[i].clone()),
            FrameLocation::Before => {
                let before = frames.partition_point(|f| f.pts < time);
                before.checked_sub(1).map(|i| frames[i].clone())
            }
            FrameLocation::After => frames.get(after).cloned(),
        }
    }

    /// Drop frames that end before `time`
    pub fn remove_before(&self, time: f64) {
        self.frames.write().retain(|f| f.end() >= time);
    }

    /// Remove every frame
    pub fn clear(&self) {
        self.frames.write().clear();
    }

    /// Number of stored frames
    pub fn len(&self) -> usize {
        self.frames.read().len()
    }

    /// True when no frames are stored
    pub fn is_empty(&self) -> bool {
        self.frames.read().is_empty()
    }
}
