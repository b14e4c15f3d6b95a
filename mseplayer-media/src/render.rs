//! Audio and video renderer seams
//!
//! Renderers pull decoded frames from a [`DecodedStream`] and read the play
//! head from the [`PipelineManager`]. The player never pushes frames; it only
//! attaches, detaches and notifies renderers of seeks.

use crate::decoded_stream::DecodedStream;
use mseplayer_core::PipelineManager;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// How video is fitted into the output region
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoFillMode {
    /// Letterbox, keeping the aspect ratio
    #[default]
    MaintainRatio,
    /// Fill the region, cropping to keep the aspect ratio
    Zoom,
    /// Fill the region, ignoring the aspect ratio
    Stretch,
}

/// Frame statistics in the shape of `HTMLVideoElement.getVideoPlaybackQuality`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoPlaybackQuality {
    /// Time the sample was taken, in seconds
    pub creation_time: f64,
    /// Frames presented or dropped
    pub total_video_frames: u32,
    /// Frames dropped
    pub dropped_video_frames: u32,
    /// Frames that could not be decoded
    pub corrupted_video_frames: u32,
}

/// Trait for video rendering implementations
pub trait VideoRenderer: Send + Sync {
    /// Start presenting frames from `stream`
    fn attach(&self, stream: Arc<DecodedStream>);

    /// Stop presenting frames
    fn detach(&self);

    /// The play head jumped
    fn on_seek(&self);

    /// Returns false when the mode is not supported
    fn set_video_fill_mode(&self, mode: VideoFillMode) -> bool;

    /// Current frame statistics
    fn video_playback_quality(&self) -> VideoPlaybackQuality;

    /// Pipeline to read the play head from; `None` on teardown
    fn set_pipeline(&self, pipeline: Option<Arc<PipelineManager>>);
}

/// Trait for audio rendering implementations
pub trait AudioRenderer: Send + Sync {
    /// Start playing samples from `stream`
    fn attach(&self, stream: Arc<DecodedStream>);

    /// Stop playing samples
    fn detach(&self);

    /// The play head jumped
    fn on_seek(&self);

    /// Current volume in `[0, 1]`
    fn volume(&self) -> f64;

    /// Set the volume
    fn set_volume(&self, volume: f64);

    /// Whether output is muted
    fn muted(&self) -> bool;

    /// Mute or unmute
    fn set_muted(&self, muted: bool);

    /// Pipeline to read the play head from; `None` on teardown
    fn set_pipeline(&self, pipeline: Option<Arc<PipelineManager>>);
}

/// Video renderer that presents nothing, for headless playback and tests
#[derive(Default)]
pub struct NullVideoRenderer {
    stream: RwLock<Option<Arc<DecodedStream>>>,
    pipeline: RwLock<Option<Arc<PipelineManager>>>,
    fill_mode: Mutex<VideoFillMode>,
    seeks: AtomicUsize,
}

impl NullVideoRenderer {
    /// Create a detached renderer
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a stream is attached
    pub fn is_attached(&self) -> bool {
        self.stream.read().is_some()
    }

    /// Whether a pipeline is set
    pub fn has_pipeline(&self) -> bool {
        self.pipeline.read().is_some()
    }

    /// Number of seeks seen
    pub fn seek_count(&self) -> usize {
        self.seeks.load(Ordering::Acquire)
    }

    /// Current fill mode
    pub fn fill_mode(&self) -> VideoFillMode {
        *self.fill_mode.lock()
    }
}

impl VideoRenderer for NullVideoRenderer {
    fn attach(&self, stream: Arc<DecodedStream>) {
        *self.stream.write() = Some(stream);
    }

    fn detach(&self) {
        *self.stream.write() = None;
    }

    fn on_seek(&self) {
        self.seeks.fetch_add(1, Ordering::AcqRel);
    }

    fn set_video_fill_mode(&self, mode: VideoFillMode) -> bool {
        *self.fill_mode.lock() = mode;
        true
    }

    fn video_playback_quality(&self) -> VideoPlaybackQuality {
        let total = self
            .stream
            .read()
            .as_ref()
            .map(|stream| stream.len() as u32)
            .unwrap_or(0);
        VideoPlaybackQuality {
            total_video_frames: total,
            ..Default::default()
        }
    }

    fn set_pipeline(&self, pipeline: Option<Arc<PipelineManager>>) {
        *self.pipeline.write() = pipeline;
    }
}

/// Audio renderer that plays nothing, for headless playback and tests
pub struct NullAudioRenderer {
    stream: RwLock<Option<Arc<DecodedStream>>>,
    pipeline: RwLock<Option<Arc<PipelineManager>>>,
    volume: Mutex<f64>,
    muted: Mutex<bool>,
    seeks: AtomicUsize,
}

impl NullAudioRenderer {
    /// Create a detached renderer at full volume
    pub fn new() -> Self {
        Self {
            stream: RwLock::new(None),
            pipeline: RwLock::new(None),
            volume: Mutex::new(1.0),
            muted: Mutex::new(false),
            seeks: AtomicUsize::new(0),
        }
    }

    /// Whether a stream is attached
    pub fn is_attached(&self) -> bool {
        self.stream.read().is_some()
    }

    /// Whether a pipeline is set
    pub fn has_pipeline(&self) -> bool {
        self.pipeline.read().is_some()
    }

    /// Number of seeks seen
    pub fn seek_count(&self) -> usize {
        self.seeks.load(Ordering::Acquire)
    }
}

impl Default for NullAudioRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioRenderer for NullAudioRenderer {
    fn attach(&self, stream: Arc<DecodedStream>) {
        *self.stream.write() = Some(stream);
    }

    fn detach(&self) {
        *self.stream.write() = None;
    }

    fn on_seek(&self) {
        self.seeks.fetch_add(1, Ordering::AcqRel);
    }

    fn volume(&self) -> f64 {
        *self.volume.lock()
    }

    fn set_volume(&self, volume: f64) {
        *self.volume.lock() = volume.clamp(0.0, 1.0);
    }

    fn muted(&self) -> bool {
        *self.muted.lock()
    }

    fn set_muted(&self, muted: bool) {
        *self.muted.lock() = muted;
    }

    fn set_pipeline(&self, pipeline: Option<Arc<PipelineManager>>) {
        *self.pipeline.write() = pipeline;
    }
}
