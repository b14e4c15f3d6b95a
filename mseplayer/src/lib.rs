//! # MSE Player
//!
//! Playback orchestration for a Media-Source-Extensions style player. Feed
//! demuxed audio and video frames into elementary streams; the player decodes
//! them on background threads, tracks what is buffered, drives the playback
//! clock and reports one coherent ready state and playback state to clients
//! and renderers.
//!
//! ## Key Features
//!
//! - **Off-thread decoding**: one decode thread per track, with seek and
//!   detach that never decode stale frames
//! - **Buffering watchdog**: ready state and stall/resume derived from the
//!   data buffered ahead of the play head
//! - **Pluggable seams**: decoders, CDMs, renderers and clocks are traits
//! - **Ordered notifications**: clients see state changes in the order they
//!   happened, and may call back into the player
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mseplayer::{
//!     MediaPlayer, MemoryElementaryStream, NullAudioRenderer, NullVideoRenderer,
//!     PlayerConfig, Rational, StreamInfo,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PlayerConfig::default();
//!     config.init_logging()?;
//!
//!     let player = MediaPlayer::new(
//!         Arc::new(NullVideoRenderer::new()),
//!         Arc::new(NullAudioRenderer::new()),
//!         config,
//!     )?;
//!     let mut events = player.events();
//!
//!     player.attach_mse()?;
//!     let info = Arc::new(StreamInfo::video(
//!         "video/mp4", "avc1.42E01E", Rational::new(1, 90000), 1280, 720,
//!     ));
//!     let video = Arc::new(MemoryElementaryStream::new(info));
//!     player.add_mse_buffer("video/mp4", true, video.clone())?;
//!     player.loaded_meta_data(f64::NAN);
//!     player.play();
//!
//!     while let Some(event) = events.next().await {
//!         println!("Player event: {:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use mseplayer_core::{
    intersection_of_buffered_ranges, BufferedRange, Clock, ManualClock, MonitorConfig,
    PipelineManager, PlaybackState, PlayerError, PlayerResult, ReadyState, SystemClock,
};

pub use mseplayer_media::{
    AudioRenderer, AudioSamples, Cdm, DecodedFrame, DecodedStream, Decoder, DecoderConfig,
    ElementaryStream, EncodedFrame, EncryptionInfo, EncryptionPattern, EncryptionScheme,
    FrameLocation, FramePayload, MediaCapabilitiesInfo, MediaDecodingConfiguration,
    MediaDecodingType, MediaError, MediaResult, MemoryElementaryStream, NullAudioRenderer,
    NullVideoRenderer, ProtectionScheme, Rational, StreamInfo, Subsample, VideoFillMode,
    VideoImage, VideoPlaybackQuality, VideoRenderer,
};

// Public API modules
pub mod clients;
pub mod config;
pub mod event;
pub mod logging;
pub mod player;
pub mod source;

// Re-export main API types
pub use clients::{Client, ClientId, ClientList, NotificationQueue};
pub use config::PlayerConfig;
pub use event::{EventStream, PlayerEvent};
pub use logging::init_logging;
pub use player::MediaPlayer;
pub use source::{buffered_intersection, Source};
