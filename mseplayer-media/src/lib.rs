//! # MSE Player Media
//!
//! Frames, elementary streams, decode threads and renderer seams for the MSE
//! player. Decoders, CDMs and renderers are pluggable trait objects; this
//! crate ships an optional Opus decoder and null renderers.

#![warn(clippy::all)]

pub mod cdm;
pub mod config;
pub mod decoded_stream;
pub mod decoder;
pub mod decoder_thread;
pub mod elementary_stream;
pub mod error;
pub mod frames;
#[cfg(feature = "opus")]
pub mod opus;
pub mod render;

// Re-export main types
pub use cdm::{Cdm, EncryptionPattern, EncryptionScheme, AES_BLOCK_SIZE};
pub use config::DecoderConfig;
pub use decoded_stream::{DecodedStream, FrameLocation};
pub use decoder::{
    default_decoder, parse_content_type, AudioConfiguration, Decoder, MediaCapabilitiesInfo,
    MediaDecodingConfiguration, MediaDecodingType, VideoConfiguration,
};
pub use decoder_thread::{DecoderCallbacks, DecoderThread};
pub use elementary_stream::{ElementaryStream, FrameSink, MemoryElementaryStream};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use frames::{
    AudioSamples, DecodedFrame, EncodedFrame, EncryptionInfo, FramePayload, ProtectionScheme,
    Rational, StreamInfo, Subsample, VideoImage,
};
#[cfg(feature = "opus")]
pub use opus::OpusDecoder;
pub use render::{
    AudioRenderer, NullAudioRenderer, NullVideoRenderer, VideoFillMode, VideoPlaybackQuality,
    VideoRenderer,
};
