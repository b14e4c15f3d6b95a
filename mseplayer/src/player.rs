//! The media player facade
//!
//! [`MediaPlayer`] wires one [`PipelineManager`], one [`PipelineMonitor`] and
//! a video and an audio [`Source`] together, and forwards their reports to the
//! renderers and to registered clients.
//!
//! Locking rules:
//! - `PlayerShared::state` guards the ready state, the last reported playback
//!   state and both sources.
//! - The pipeline is never called while `state` is held. The pipeline's status
//!   callback takes `state` while the pipeline's own lock is held, so the
//!   opposite order would deadlock.
//! - The monitor's ready-state callback runs under its poll lock and the
//!   pipeline's status callback under the pipeline lock; both only queue.
//! - Client notifications are queued while `state` is held and delivered once
//!   every lock is released.

use crate::clients::{Client, ClientId, ClientList, NotificationQueue};
use crate::config::PlayerConfig;
use crate::event::{EventSink, EventStream, PlayerEvent};
use crate::source::{buffered_intersection, Source};
use mseplayer_core::{
    BufferedRange, Clock, PipelineManager, PipelineMonitor, PlaybackState, PlayerError,
    PlayerResult, ReadyState, SystemClock,
};
use mseplayer_media::{
    AudioRenderer, Cdm, Decoder, DecoderCallbacks, ElementaryStream, MediaCapabilitiesInfo,
    MediaDecodingConfiguration, MediaDecodingType, MediaError, VideoFillMode, VideoPlaybackQuality,
    VideoRenderer,
};
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Decoded frames older than this, relative to the play head, are released
const DECODED_HISTORY_SECONDS: f64 = 1.0;

/// Late-bound back reference from pipeline and decoder callbacks to the player
type PlayerLink = Arc<OnceLock<Weak<PlayerShared>>>;

fn upgrade(link: &PlayerLink) -> Option<Arc<PlayerShared>> {
    link.get().and_then(Weak::upgrade)
}

struct PlayerState {
    /// Last playback state reported to clients
    old_state: PlaybackState,
    ready_state: ReadyState,
    video: Source,
    audio: Source,
}

impl PlayerState {
    fn source_mut(&mut self, is_video: bool) -> &mut Source {
        if is_video {
            &mut self.video
        } else {
            &mut self.audio
        }
    }

    fn sources(&self) -> [&Source; 2] {
        [&self.video, &self.audio]
    }
}

struct PlayerShared {
    state: RwLock<PlayerState>,
    pipeline: Arc<PipelineManager>,
    monitor: PipelineMonitor,
    video_renderer: Arc<dyn VideoRenderer>,
    audio_renderer: Arc<dyn AudioRenderer>,
    clients: Arc<ClientList>,
    notifications: NotificationQueue,
    config: PlayerConfig,
}

impl PlayerShared {
    fn buffered(&self) -> Vec<BufferedRange> {
        let state = self.state.read();
        buffered_intersection(&state.sources())
    }

    /// Deliver queued notifications unless another thread already is
    fn flush(&self) {
        self.notifications
            .drain(|event| self.clients.dispatch(event));
    }

    /// Called by the pipeline with its lock held; must only queue
    fn on_status_changed(&self, new: PlaybackState) {
        let mut state = self.state.write();
        let old = state.old_state;
        state.old_state = new;
        if old == new {
            return;
        }
        debug!("Playback state {} -> {}", old, new);
        self.notifications
            .push(PlayerEvent::PlaybackStateChanged { old, new });
        // Seeking is announced by the seek callback instead
        if old == PlaybackState::Paused
            && matches!(new, PlaybackState::Playing | PlaybackState::Initializing)
        {
            self.notifications.push(PlayerEvent::Play);
        }
    }

    /// Called by the monitor mid-poll; must only queue. The poll hook flushes.
    fn on_ready_state_changed(&self, new: ReadyState) {
        let mut state = self.state.write();
        let old = state.ready_state;
        state.ready_state = new;
        if old == new {
            return;
        }
        self.notifications
            .push(PlayerEvent::ReadyStateChanged { old, new });
    }

    fn on_seek(&self) {
        self.audio_renderer.on_seek();
        self.video_renderer.on_seek();
        self.notifications.push(PlayerEvent::Seeking);
        self.flush();

        let time = self.pipeline.current_time();
        let state = self.state.read();
        for source in state.sources() {
            source.on_seek(time);
        }
    }

    fn on_error(&self, message: &str) {
        error!("Playback failed: {}", message);
        self.pipeline.on_error();
        self.notifications.push(PlayerEvent::Error {
            message: message.to_string(),
        });
        self.flush();
    }

    fn on_waiting_for_key(&self) {
        self.pipeline.on_waiting_for_key();
        self.notifications.push(PlayerEvent::WaitingForKey);
        self.flush();
    }

    fn on_key_available(&self) {
        self.pipeline.on_key_available();
        self.flush();
    }

    fn after_poll(&self) {
        let time = self.pipeline.current_time();
        {
            let state = self.state.read();
            for source in state.sources() {
                source
                    .decoded_stream()
                    .remove_before(time - DECODED_HISTORY_SECONDS);
            }
        }
        self.flush();
    }
}

impl Drop for PlayerShared {
    fn drop(&mut self) {
        self.monitor.stop();
        self.video_renderer.set_pipeline(None);
        self.audio_renderer.set_pipeline(None);
    }
}

fn decoder_callbacks(link: &PlayerLink) -> DecoderCallbacks {
    let on_error = link.clone();
    let on_waiting = link.clone();
    let on_available = link.clone();
    DecoderCallbacks {
        on_error: Box::new(move |e: &MediaError| {
            if let Some(player) = upgrade(&on_error) {
                player.on_error(&e.to_string());
            }
        }),
        on_waiting_for_key: Box::new(move || {
            if let Some(player) = upgrade(&on_waiting) {
                player.on_waiting_for_key();
            }
        }),
        on_key_available: Box::new(move || {
            if let Some(player) = upgrade(&on_available) {
                player.on_key_available();
            }
        }),
    }
}

/// Media-Source-Extensions style media player
///
/// Cheap to clone; every clone drives the same session. The session is torn
/// down, and its threads joined, when the last clone is dropped.
///
/// # Example
/// ```rust,no_run
/// use mseplayer::{MediaPlayer, NullAudioRenderer, NullVideoRenderer, PlayerConfig};
/// use std::sync::Arc;
///
/// let player = MediaPlayer::new(
///     Arc::new(NullVideoRenderer::new()),
///     Arc::new(NullAudioRenderer::new()),
///     PlayerConfig::default(),
/// )?;
/// player.attach_mse()?;
/// player.play();
/// # Ok::<(), mseplayer::PlayerError>(())
/// ```
#[derive(Clone)]
pub struct MediaPlayer {
    shared: Arc<PlayerShared>,
}

impl MediaPlayer {
    /// Create a player driven by the system clock
    pub fn new(
        video_renderer: Arc<dyn VideoRenderer>,
        audio_renderer: Arc<dyn AudioRenderer>,
        config: PlayerConfig,
    ) -> PlayerResult<Self> {
        Self::with_clock(
            video_renderer,
            audio_renderer,
            config,
            Arc::new(SystemClock::new()),
        )
    }

    /// Create a player driven by `clock`
    pub fn with_clock(
        video_renderer: Arc<dyn VideoRenderer>,
        audio_renderer: Arc<dyn AudioRenderer>,
        config: PlayerConfig,
        clock: Arc<dyn Clock>,
    ) -> PlayerResult<Self> {
        config.validate()?;
        let link: PlayerLink = Arc::new(OnceLock::new());

        let pipeline = {
            let status_link = link.clone();
            let seek_link = link.clone();
            Arc::new(PipelineManager::new(
                Box::new(move |state| {
                    if let Some(player) = upgrade(&status_link) {
                        player.on_status_changed(state);
                    }
                }),
                Box::new(move || {
                    if let Some(player) = upgrade(&seek_link) {
                        player.on_seek();
                    }
                }),
                clock.clone(),
            ))
        };

        let monitor = {
            let buffered_link = link.clone();
            let ready_link = link.clone();
            PipelineMonitor::new(
                Box::new(move || {
                    upgrade(&buffered_link)
                        .map(|player| player.buffered())
                        .unwrap_or_default()
                }),
                Box::new(move |ready| {
                    if let Some(player) = upgrade(&ready_link) {
                        player.on_ready_state_changed(ready);
                    }
                }),
                clock,
                pipeline.clone(),
                config.monitor.clone(),
            )
        };
        let poll_link = link.clone();
        monitor.set_poll_hook(Some(Arc::new(move || {
            if let Some(player) = upgrade(&poll_link) {
                player.after_poll();
            }
        })));

        let video = Source::new(true, decoder_callbacks(&link), config.decoder.clone())?;
        let audio = Source::new(false, decoder_callbacks(&link), config.decoder.clone())?;

        video_renderer.set_pipeline(Some(pipeline.clone()));
        audio_renderer.set_pipeline(Some(pipeline.clone()));

        let shared = Arc::new(PlayerShared {
            state: RwLock::new(PlayerState {
                old_state: PlaybackState::Initializing,
                ready_state: ReadyState::NotAttached,
                video,
                audio,
            }),
            pipeline,
            monitor,
            video_renderer,
            audio_renderer,
            clients: Arc::new(ClientList::new()),
            notifications: NotificationQueue::new(),
            config,
        });
        // Freshly created, so the link cannot be set yet
        let _ = link.set(Arc::downgrade(&shared));
        Ok(Self { shared })
    }

    /// Configuration the player was built with
    pub fn config(&self) -> &PlayerConfig {
        &self.shared.config
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Start an MSE session: reset the pipeline and start the monitor
    pub fn attach_mse(&self) -> PlayerResult<()> {
        {
            let mut state = self.shared.state.write();
            state.old_state = PlaybackState::Initializing;
            state.ready_state = ReadyState::HaveNothing;
        }

        self.shared.pipeline.reset();
        self.shared.monitor.start()?;
        info!("MSE session attached");
        self.shared.notifications.push(PlayerEvent::AttachMse);
        self.shared.flush();
        Ok(())
    }

    /// Attach the elementary stream of one track
    ///
    /// Attaching a track twice is a contract violation and returns
    /// [`PlayerError::AlreadyAttached`]. Without an MSE session this returns
    /// [`PlayerError::InvalidState`].
    pub fn add_mse_buffer(
        &self,
        mime: &str,
        is_video: bool,
        stream: Arc<dyn ElementaryStream>,
    ) -> PlayerResult<()> {
        let from = self.shared.pipeline.current_time();
        let decoded = {
            let mut state = self.shared.state.write();
            if state.ready_state == ReadyState::NotAttached {
                error!("Cannot add {} buffer without an MSE session", mime);
                return Err(PlayerError::InvalidState {
                    expected: "an attached MSE session".to_string(),
                    actual: state.ready_state.to_string(),
                });
            }
            let source = state.source_mut(is_video);
            if let Err(e) = source.attach(stream, from) {
                error!("Cannot add {} buffer: {}", mime, e);
                return Err(e);
            }
            source.decoded_stream()
        };
        debug!("Added {} buffer", mime);

        // Renderers are called without the lock
        if is_video {
            self.shared.video_renderer.attach(decoded);
        } else {
            self.shared.audio_renderer.attach(decoded);
        }
        Ok(())
    }

    /// Detach one track's stream; the other track keeps playing from its own
    /// buffer. Returns [`PlayerError::NotAttached`] when the track has none.
    pub fn remove_mse_buffer(&self, is_video: bool) -> PlayerResult<()> {
        {
            let mut state = self.shared.state.write();
            let source = state.source_mut(is_video);
            if !source.is_attached() {
                return Err(PlayerError::NotAttached {
                    track: source.track().to_string(),
                });
            }
            source.detach();
        }
        debug!("Removed {} buffer", if is_video { "video" } else { "audio" });

        if is_video {
            self.shared.video_renderer.detach();
        } else {
            self.shared.audio_renderer.detach();
        }
        Ok(())
    }

    /// Metadata is known; a finite `duration` is used unless one was set
    pub fn loaded_meta_data(&self, duration: f64) {
        let pipeline = &self.shared.pipeline;
        if duration.is_finite() && !pipeline.duration().is_finite() {
            pipeline.set_duration(duration);
        }
        pipeline.done_initializing();
        self.shared.flush();
    }

    /// All data was appended; the duration becomes the furthest buffered end
    /// of any attached track.
    pub fn mse_end_of_stream(&self) {
        let duration = {
            let state = self.shared.state.read();
            state
                .sources()
                .iter()
                .filter(|source| source.is_attached())
                .filter_map(|source| source.buffered().last().map(|range| range.end))
                .fold(0.0, f64::max)
        };
        info!("End of stream, duration {:.3}s", duration);
        self.shared.pipeline.set_duration(duration);
        self.shared.flush();
    }

    /// Use `cdm` to decrypt both tracks; `None` removes it
    pub fn set_eme_implementation(&self, key_system: &str, cdm: Option<Arc<dyn Cdm>>) -> bool {
        let state = self.shared.state.write();
        info!(
            "EME implementation for {} {}",
            key_system,
            if cdm.is_some() { "set" } else { "cleared" }
        );
        state.video.set_cdm(cdm.clone());
        state.audio.set_cdm(cdm);
        true
    }

    /// Replace the decoders; `None` returns a track to its default decoder
    pub fn set_decoders(
        &self,
        video_decoder: Option<Arc<dyn Decoder>>,
        audio_decoder: Option<Arc<dyn Decoder>>,
    ) {
        let mut state = self.shared.state.write();
        state.video.set_decoder(video_decoder);
        state.audio.set_decoder(audio_decoder);
    }

    /// End the session: stop the monitor and both decode threads
    pub fn detach(&self) {
        self.shared.audio_renderer.detach();
        self.shared.video_renderer.detach();
        self.shared.monitor.stop();

        {
            let mut state = self.shared.state.write();
            state.video.detach();
            state.audio.detach();
            state.ready_state = ReadyState::NotAttached;
        }

        self.shared.pipeline.on_detach();
        info!("MSE session detached");
        self.shared.notifications.push(PlayerEvent::Detach);
        self.shared.flush();
    }

    /// Only MSE playback is supported, so this always returns false
    pub fn attach_source(&self, url: &str) -> bool {
        warn!("Cannot play {}: only MSE playback is supported", url);
        false
    }

    // ------------------------------------------------------------------
    // Playback control
    // ------------------------------------------------------------------

    /// Request playback
    pub fn play(&self) {
        self.shared.pipeline.play();
        self.shared.flush();
    }

    /// Request a pause
    pub fn pause(&self) {
        self.shared.pipeline.pause();
        self.shared.flush();
    }

    /// Current media time in seconds
    pub fn current_time(&self) -> f64 {
        self.shared.pipeline.current_time()
    }

    /// Seek to `time`
    pub fn set_current_time(&self, time: f64) {
        self.shared.pipeline.set_current_time(time);
        self.shared.flush();
    }

    /// Duration in seconds; NaN while unknown
    pub fn duration(&self) -> f64 {
        self.shared.pipeline.duration()
    }

    /// Set the duration
    pub fn set_duration(&self, duration: f64) {
        self.shared.pipeline.set_duration(duration);
        self.shared.flush();
    }

    /// Playback rate
    pub fn playback_rate(&self) -> f64 {
        self.shared.pipeline.playback_rate()
    }

    /// Set the playback rate
    pub fn set_playback_rate(&self, rate: f64) {
        self.shared.pipeline.set_playback_rate(rate);
        self.shared.flush();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Time ranges every attached track has buffered
    pub fn buffered(&self) -> Vec<BufferedRange> {
        self.shared.buffered()
    }

    /// Current ready state
    pub fn ready_state(&self) -> ReadyState {
        self.shared.state.read().ready_state
    }

    /// Current playback state
    pub fn playback_state(&self) -> PlaybackState {
        self.shared.pipeline.playback_state()
    }

    /// Whether the configured decoders can play `config` through MSE
    pub fn decoding_info(&self, config: &MediaDecodingConfiguration) -> MediaCapabilitiesInfo {
        let wants_video = !config.video.content_type.is_empty();
        let wants_audio = !config.audio.content_type.is_empty();
        if config.decoding_type != MediaDecodingType::MediaSource || !(wants_video || wants_audio)
        {
            return MediaCapabilitiesInfo::unsupported();
        }

        let (video_decoder, audio_decoder) = {
            let state = self.shared.state.read();
            (state.video.decoder(), state.audio.decoder())
        };

        let mut info = MediaCapabilitiesInfo::supported();
        if wants_video {
            let Some(decoder) = video_decoder else {
                return MediaCapabilitiesInfo::unsupported();
            };
            let mut query = config.clone();
            query.audio.content_type.clear();
            info = info.and(decoder.decoding_info(&query));
        }
        if wants_audio {
            let Some(decoder) = audio_decoder else {
                return MediaCapabilitiesInfo::unsupported();
            };
            let mut query = config.clone();
            query.video.content_type.clear();
            info = info.and(decoder.decoding_info(&query));
        }
        info
    }

    /// Width of the video frame at the play head; 0 when there is none
    pub fn width(&self) -> u32 {
        let time = self.current_time();
        let state = self.shared.state.read();
        state
            .video
            .frame(time)
            .map(|frame| frame.stream_info.width)
            .unwrap_or(0)
    }

    /// Height of the video frame at the play head; 0 when there is none
    pub fn height(&self) -> u32 {
        let time = self.current_time();
        let state = self.shared.state.read();
        state
            .video
            .frame(time)
            .map(|frame| frame.stream_info.height)
            .unwrap_or(0)
    }

    /// Run one monitor iteration now
    pub fn poll_monitor(&self) {
        self.shared.monitor.poll();
    }

    // ------------------------------------------------------------------
    // Renderer pass-throughs
    // ------------------------------------------------------------------

    /// Audio volume
    pub fn volume(&self) -> f64 {
        self.shared.audio_renderer.volume()
    }

    /// Set the audio volume
    pub fn set_volume(&self, volume: f64) {
        self.shared.audio_renderer.set_volume(volume);
    }

    /// Whether audio is muted
    pub fn muted(&self) -> bool {
        self.shared.audio_renderer.muted()
    }

    /// Mute or unmute audio
    pub fn set_muted(&self, muted: bool) {
        self.shared.audio_renderer.set_muted(muted);
    }

    /// Returns false when the renderer does not support `mode`
    pub fn set_video_fill_mode(&self, mode: VideoFillMode) -> bool {
        self.shared.video_renderer.set_video_fill_mode(mode)
    }

    /// Frame statistics from the video renderer
    pub fn video_playback_quality(&self) -> VideoPlaybackQuality {
        self.shared.video_renderer.video_playback_quality()
    }

    // ------------------------------------------------------------------
    // Clients and events
    // ------------------------------------------------------------------

    /// Register an observer
    ///
    /// A client that keeps a clone of this player keeps the session alive
    /// until it is removed.
    pub fn add_client(&self, client: Arc<dyn Client>) -> ClientId {
        self.shared.clients.add(client)
    }

    /// Unregister an observer; false if it was not registered
    pub fn remove_client(&self, id: ClientId) -> bool {
        self.shared.clients.remove(id)
    }

    /// Stream of every notification from now on
    pub fn events(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.shared.clients.add(Arc::new(EventSink::new(tx)));
        EventStream::registered(rx, id, Arc::downgrade(&self.shared.clients))
    }

    // ------------------------------------------------------------------
    // Text tracks
    // ------------------------------------------------------------------

    /// Text tracks are handled by the embedding layer
    pub fn text_tracks(&self) -> PlayerResult<Vec<String>> {
        Err(unsupported("text_tracks"))
    }

    /// Text tracks are handled by the embedding layer
    pub fn add_text_track(&self, kind: &str, label: &str, language: &str) -> PlayerResult<()> {
        debug!("Rejected {} text track {} ({})", kind, label, language);
        Err(unsupported("add_text_track"))
    }
}

fn unsupported(operation: &str) -> PlayerError {
    error!("{} is not supported by the MSE player", operation);
    PlayerError::Unsupported {
        operation: operation.to_string(),
    }
}

impl fmt::Debug for MediaPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaPlayer")
            .field("playback_state", &self.playback_state())
            .field("ready_state", &self.ready_state())
            .field("clients", &self.shared.clients)
            .finish()
    }
}
