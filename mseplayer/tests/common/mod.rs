//! Shared fixtures for the player integration tests

#![allow(dead_code)]

use mseplayer::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Emits one video image per frame, carrying the decrypted payload
#[derive(Debug, Default)]
pub struct PassThroughDecoder {
    /// Fail every frame with this message
    pub fail_with: Option<String>,
}

impl PassThroughDecoder {
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
        }
    }
}

impl Decoder for PassThroughDecoder {
    fn decoding_info(&self, config: &MediaDecodingConfiguration) -> MediaCapabilitiesInfo {
        let content_type = if config.video.content_type.is_empty() {
            &config.audio.content_type
        } else {
            &config.video.content_type
        };
        if content_type.starts_with("video/mp4") || content_type.starts_with("audio/mp4") {
            MediaCapabilitiesInfo::supported()
        } else {
            MediaCapabilitiesInfo::unsupported()
        }
    }

    fn decode(&self, frame: &EncodedFrame, cdm: Option<&dyn Cdm>) -> MediaResult<Vec<DecodedFrame>> {
        if let Some(reason) = &self.fail_with {
            return Err(MediaError::DecodingFailed {
                codec: frame.stream_info.codec.clone(),
                reason: reason.clone(),
            });
        }
        let data = frame.decrypt(cdm)?;
        Ok(vec![DecodedFrame::new(
            frame.stream_info.clone(),
            frame.pts,
            frame.duration,
            FramePayload::Video(VideoImage {
                width: frame.stream_info.width,
                height: frame.stream_info.height,
                data,
            }),
        )])
    }

    fn reset(&self) {}
}

/// Clear Key stand-in that only knows its key once `grant` is called
#[derive(Debug, Default)]
pub struct GatedCdm {
    has_key: AtomicBool,
}

impl GatedCdm {
    pub fn grant(&self) {
        self.has_key.store(true, Ordering::Release);
    }
}

impl Cdm for GatedCdm {
    fn key_system(&self) -> &str {
        "org.w3.clearkey"
    }

    fn decrypt(
        &self,
        _scheme: EncryptionScheme,
        _pattern: EncryptionPattern,
        _block_offset: usize,
        _key_id: &[u8],
        _iv: &[u8],
        src: &[u8],
    ) -> MediaResult<Vec<u8>> {
        if self.has_key.load(Ordering::Acquire) {
            Ok(src.to_vec())
        } else {
            Err(MediaError::KeyNotFound {
                key_id: "11111111111111111111111111111111".to_string(),
            })
        }
    }
}

/// Records every notification in order
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<PlayerEvent>>,
}

impl Recorder {
    pub fn take(&self) -> Vec<PlayerEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn count(&self, wanted: &PlayerEvent) -> usize {
        self.events.lock().iter().filter(|e| *e == wanted).count()
    }

    fn push(&self, event: PlayerEvent) {
        self.events.lock().push(event);
    }
}

impl Client for Recorder {
    fn on_attach_mse(&self) {
        self.push(PlayerEvent::AttachMse);
    }

    fn on_detach(&self) {
        self.push(PlayerEvent::Detach);
    }

    fn on_play(&self) {
        self.push(PlayerEvent::Play);
    }

    fn on_seeking(&self) {
        self.push(PlayerEvent::Seeking);
    }

    fn on_error(&self, message: &str) {
        self.push(PlayerEvent::Error {
            message: message.to_string(),
        });
    }

    fn on_waiting_for_key(&self) {
        self.push(PlayerEvent::WaitingForKey);
    }

    fn on_playback_state_changed(&self, old: PlaybackState, new: PlaybackState) {
        self.push(PlayerEvent::PlaybackStateChanged { old, new });
    }

    fn on_ready_state_changed(&self, old: ReadyState, new: ReadyState) {
        self.push(PlayerEvent::ReadyStateChanged { old, new });
    }
}

pub struct Harness {
    pub player: MediaPlayer,
    pub clock: Arc<ManualClock>,
    pub video_renderer: Arc<NullVideoRenderer>,
    pub audio_renderer: Arc<NullAudioRenderer>,
    pub recorder: Arc<Recorder>,
}

/// The background monitor never fires on its own; tests poll explicitly
pub fn test_config() -> PlayerConfig {
    let mut config = PlayerConfig::default();
    config.monitor.poll_interval = Duration::from_secs(3600);
    config.decoder.key_retry_interval = Duration::from_millis(5);
    config
}

pub fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(100.0));
    let video_renderer = Arc::new(NullVideoRenderer::new());
    let audio_renderer = Arc::new(NullAudioRenderer::new());
    let player = MediaPlayer::with_clock(
        video_renderer.clone(),
        audio_renderer.clone(),
        test_config(),
        clock.clone(),
    )
    .unwrap();
    let recorder = Arc::new(Recorder::default());
    player.add_client(recorder.clone());
    player.set_decoders(
        Some(Arc::new(PassThroughDecoder::default())),
        Some(Arc::new(PassThroughDecoder::default())),
    );
    Harness {
        player,
        clock,
        video_renderer,
        audio_renderer,
        recorder,
    }
}

pub fn video_info() -> Arc<StreamInfo> {
    Arc::new(StreamInfo::video(
        "video/mp4; codecs=\"avc1.42E01E\"",
        "avc1.42E01E",
        Rational::new(1, 90000),
        1280,
        720,
    ))
}

pub fn audio_info() -> Arc<StreamInfo> {
    Arc::new(StreamInfo::audio(
        "audio/mp4; codecs=\"mp4a.40.2\"",
        "mp4a.40.2",
        Rational::new(1, 48000),
        2,
        48000,
    ))
}

/// Half-second key frames covering `[start, end)`
pub fn push_frames(stream: &MemoryElementaryStream, start: f64, end: f64) {
    let info = stream.stream_info();
    let mut pts = start;
    while pts < end {
        stream.push_frame(EncodedFrame::new(info.clone(), pts, pts, 0.5, true, vec![1u8; 16]));
        pts += 0.5;
    }
}

/// Like [`push_frames`], but every frame needs a key
pub fn push_encrypted_frames(stream: &MemoryElementaryStream, start: f64, end: f64) {
    let info = stream.stream_info();
    let mut pts = start;
    while pts < end {
        let frame = EncodedFrame::new(info.clone(), pts, pts, 0.5, true, vec![1u8; 16])
            .with_encryption(EncryptionInfo {
                scheme: ProtectionScheme::Cenc,
                pattern: EncryptionPattern::default(),
                key_id: vec![0x11; 16],
                iv: vec![0; 16],
                subsamples: Vec::new(),
            });
        stream.push_frame(frame);
        pts += 0.5;
    }
}

pub fn stream_with(info: Arc<StreamInfo>, start: f64, end: f64) -> Arc<MemoryElementaryStream> {
    let stream = Arc::new(MemoryElementaryStream::new(info));
    push_frames(&stream, start, end);
    stream
}

pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(2));
    }
}

pub fn changed(old: PlaybackState, new: PlaybackState) -> PlayerEvent {
    PlayerEvent::PlaybackStateChanged { old, new }
}

pub fn ready(old: ReadyState, new: ReadyState) -> PlayerEvent {
    PlayerEvent::ReadyStateChanged { old, new }
}
