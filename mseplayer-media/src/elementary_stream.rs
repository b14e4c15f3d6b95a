//! Encoded frame sources
//!
//! An [`ElementaryStream`] holds the demuxed frames of one track. The decode
//! thread subscribes to it: stored frames from the seek point are replayed and
//! every frame appended afterwards is delivered through the same sink.

use crate::frames::{EncodedFrame, StreamInfo};
use mseplayer_core::{merge_frame_spans, BufferedRange, DEFAULT_GAP_TOLERANCE};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Receives frames in decode order
pub type FrameSink = Box<dyn Fn(Arc<EncodedFrame>) + Send + Sync>;

/// Demuxed frames of one track
pub trait ElementaryStream: Send + Sync + fmt::Debug {
    /// Description of the track
    fn stream_info(&self) -> Arc<StreamInfo>;

    /// Ordered, merged ranges of buffered presentation time
    fn buffered_ranges(&self) -> Vec<BufferedRange>;

    /// Replay stored frames starting at the key frame at or before `from`,
    /// then keep delivering new frames. Replaces any previous sink. Replay and
    /// registration happen atomically with respect to appends.
    fn subscribe(&self, from: f64, sink: FrameSink);

    /// Stop delivering frames
    fn unsubscribe(&self);
}

struct Subscriber {
    sink: FrameSink,
    /// Frames decoding before this were skipped by the subscription
    from_dts: f64,
}

#[derive(Default)]
struct StreamFrames {
    /// Sorted by dts
    frames: Vec<Arc<EncodedFrame>>,
    subscriber: Option<Subscriber>,
}

impl StreamFrames {
    /// Deliver `frames[index]`, which was just stored.
    ///
    /// A frame stored behind frames the subscriber already received is
    /// delivered together with everything from the key frame at or before it,
    /// so the decoder sees a decodable sequence.
    fn deliver(&self, index: usize) {
        let Some(subscriber) = &self.subscriber else {
            return;
        };
        let frame = &self.frames[index];
        if frame.dts < subscriber.from_dts {
            return;
        }
        if index + 1 == self.frames.len() {
            (subscriber.sink)(frame.clone());
            return;
        }
        let start = self.frames[..=index]
            .iter()
            .rposition(|f| f.is_key_frame && f.dts >= subscriber.from_dts)
            .unwrap_or(index);
        debug!(
            "Frame at {:.3}s stored out of order, redelivering {} frames",
            frame.pts,
            self.frames.len() - start
        );
        for frame in &self.frames[start..] {
            (subscriber.sink)(frame.clone());
        }
    }
}

/// In-memory elementary stream fed by the demuxer
pub struct MemoryElementaryStream {
    stream_info: Arc<StreamInfo>,
    gap_tolerance: f64,
    inner: Mutex<StreamFrames>,
}

impl MemoryElementaryStream {
    /// Create an empty stream
    pub fn new(stream_info: Arc<StreamInfo>) -> Self {
        Self::with_gap_tolerance(stream_info, DEFAULT_GAP_TOLERANCE)
    }

    /// Create an empty stream with a custom gap tolerance
    pub fn with_gap_tolerance(stream_info: Arc<StreamInfo>, gap_tolerance: f64) -> Self {
        Self {
            stream_info,
            gap_tolerance,
            inner: Mutex::new(StreamFrames::default()),
        }
    }

    /// Store a frame in decode order and deliver it to the subscriber.
    ///
    /// A frame with the dts and pts of a stored one replaces it.
    pub fn push_frame(&self, frame: EncodedFrame) {
        let frame = Arc::new(frame);
        let mut inner = self.inner.lock();
        let index = inner
            .frames
            .partition_point(|f| f.dts.total_cmp(&frame.dts).is_le());
        if index > 0 {
            let prev = &inner.frames[index - 1];
            if prev.dts == frame.dts && prev.pts == frame.pts {
                inner.frames[index - 1] = frame;
                inner.deliver(index - 1);
                return;
            }
        }
        inner.frames.insert(index, frame);
        inner.deliver(index);
    }

    /// Remove frames whose pts lies in `[start, end)`
    pub fn remove(&self, start: f64, end: f64) {
        let mut inner = self.inner.lock();
        let before = inner.frames.len();
        inner.frames.retain(|f| f.pts < start || f.pts >= end);
        debug!(
            "Removed {} frames in [{:.3}, {:.3})",
            before - inner.frames.len(),
            start,
            end
        );
    }

    /// Remove every frame
    pub fn clear(&self) {
        self.inner.lock().frames.clear();
    }

    /// Number of stored frames
    pub fn frame_count(&self) -> usize {
        self.inner.lock().frames.len()
    }
}

impl ElementaryStream for MemoryElementaryStream {
    fn stream_info(&self) -> Arc<StreamInfo> {
        self.stream_info.clone()
    }

    fn buffered_ranges(&self) -> Vec<BufferedRange> {
        let inner = self.inner.lock();
        let mut spans: Vec<BufferedRange> = inner
            .frames
            .iter()
            .map(|f| BufferedRange::new(f.pts, f.end()))
            .collect();
        spans.sort_by(|a, b| a.start.total_cmp(&b.start));
        merge_frame_spans(spans, self.gap_tolerance)
    }

    fn subscribe(&self, from: f64, sink: FrameSink) {
        let mut inner = self.inner.lock();
        let start = inner
            .frames
            .iter()
            .rposition(|f| f.is_key_frame && f.pts <= from)
            .or_else(|| inner.frames.iter().position(|f| f.is_key_frame));
        let from_dts = match start {
            Some(start) => {
                for frame in &inner.frames[start..] {
                    sink(frame.clone());
                }
                inner.frames[start].dts
            }
            None => f64::NEG_INFINITY,
        };
        inner.subscriber = Some(Subscriber { sink, from_dts });
    }

    fn unsubscribe(&self) {
        self.inner.lock().subscriber = None;
    }
}

impl fmt::Debug for MemoryElementaryStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemoryElementaryStream")
            .field("codec", &self.stream_info.codec)
            .field("frames", &inner.frames.len())
            .field("subscribed", &inner.subscriber.is_some())
            .finish()
    }
}
