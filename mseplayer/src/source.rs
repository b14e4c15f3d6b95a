//! Per-track input, decode thread and decoded frames

use mseplayer_core::{intersection_of_buffered_ranges, BufferedRange, PlayerError, PlayerResult};
use mseplayer_media::{
    default_decoder, Cdm, DecodedFrame, DecodedStream, Decoder, DecoderCallbacks, DecoderConfig,
    DecoderThread, ElementaryStream, FrameLocation,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// One track of the player: the attached elementary stream, its decode thread
/// and the frames decoded so far.
pub struct Source {
    track: &'static str,
    decoded: Arc<DecodedStream>,
    thread: DecoderThread,
    input: Option<Arc<dyn ElementaryStream>>,
    decoder: Option<Arc<dyn Decoder>>,
    default_decoder: Option<Arc<dyn Decoder>>,
}

impl Source {
    /// Create a detached source and start its decode thread
    pub fn new(
        is_video: bool,
        callbacks: DecoderCallbacks,
        config: DecoderConfig,
    ) -> PlayerResult<Self> {
        let track = if is_video { "video" } else { "audio" };
        let decoded = Arc::new(DecodedStream::new());
        let default_decoder = default_decoder(is_video);
        let thread = DecoderThread::new(
            track,
            decoded.clone(),
            default_decoder.clone(),
            callbacks,
            config,
        )?;
        Ok(Self {
            track,
            decoded,
            thread,
            input: None,
            decoder: None,
            default_decoder,
        })
    }

    /// "video" or "audio"
    pub fn track(&self) -> &'static str {
        self.track
    }

    /// Whether a stream is attached
    pub fn is_attached(&self) -> bool {
        self.input.is_some()
    }

    /// Start decoding `stream` from the key frame at or before `from`
    pub fn attach(&mut self, stream: Arc<dyn ElementaryStream>, from: f64) -> PlayerResult<()> {
        if self.is_attached() {
            return Err(PlayerError::AlreadyAttached {
                track: self.track.to_string(),
            });
        }
        info!("Attaching {} source ({})", self.track, stream.stream_info().codec);
        self.decoded.clear();
        self.thread.attach(stream.clone(), from);
        self.input = Some(stream);
        Ok(())
    }

    /// Stop decoding and forget the stream; no-op when detached
    pub fn detach(&mut self) {
        if self.input.take().is_some() {
            self.thread.detach();
            debug!("Detached {} source", self.track);
        }
    }

    /// Buffered ranges of the attached stream
    pub fn buffered(&self) -> Vec<BufferedRange> {
        self.input
            .as_ref()
            .map(|stream| stream.buffered_ranges())
            .unwrap_or_default()
    }

    /// Decoded frame showing at `time`
    pub fn frame(&self, time: f64) -> Option<Arc<DecodedFrame>> {
        self.decoded.get_frame(time, FrameLocation::Near)
    }

    /// Decoded frames, shared with the renderer
    pub fn decoded_stream(&self) -> Arc<DecodedStream> {
        self.decoded.clone()
    }

    /// The decoder in use: the one set explicitly, else the built-in default
    pub fn decoder(&self) -> Option<Arc<dyn Decoder>> {
        self.decoder.clone().or_else(|| self.default_decoder.clone())
    }

    /// Replace the decoder; `None` returns to the default
    pub fn set_decoder(&mut self, decoder: Option<Arc<dyn Decoder>>) {
        self.decoder = decoder;
        self.thread.set_decoder(self.decoder());
    }

    /// Key system used for encrypted frames
    pub fn set_cdm(&self, cdm: Option<Arc<dyn Cdm>>) {
        self.thread.set_cdm(cdm);
    }

    /// Restart decoding at `time`
    pub fn on_seek(&self, time: f64) {
        if self.is_attached() {
            self.thread.on_seek(time);
        }
    }
}

/// Time ranges every attached source has buffered; detached sources are
/// ignored
pub fn buffered_intersection(sources: &[&Source]) -> Vec<BufferedRange> {
    let ranges: Vec<Vec<BufferedRange>> = sources
        .iter()
        .filter(|source| source.is_attached())
        .map(|source| source.buffered())
        .collect();
    intersection_of_buffered_ranges(&ranges)
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("track", &self.track)
            .field("attached", &self.is_attached())
            .field("decoded_frames", &self.decoded.len())
            .field("thread", &self.thread)
            .finish()
    }
}
