//! Decoder seam and capability queries
//!
//! Decoders are shared between the player (capability queries) and the decode
//! threads, so every method takes `&self` and implementations use interior
//! mutability for codec state.

use crate::cdm::Cdm;
use crate::error::MediaResult;
use crate::frames::{DecodedFrame, EncodedFrame};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where the media will come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaDecodingType {
    /// Plain file playback
    File,
    /// Media Source Extensions
    MediaSource,
}

/// Video half of a capability query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoConfiguration {
    /// MIME type with codecs parameter; empty when unused
    pub content_type: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bits per second
    pub bitrate: u64,
    /// Frames per second
    pub framerate: f64,
}

/// Audio half of a capability query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioConfiguration {
    /// MIME type with codecs parameter; empty when unused
    pub content_type: String,
    /// Channel count
    pub channels: u32,
    /// Bits per second
    pub bitrate: u64,
    /// Samples per second
    pub samplerate: u32,
}

/// Capability query in the shape of `MediaCapabilities.decodingInfo`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDecodingConfiguration {
    /// Playback type
    pub decoding_type: MediaDecodingType,
    /// Video half
    pub video: VideoConfiguration,
    /// Audio half
    pub audio: AudioConfiguration,
}

impl MediaDecodingConfiguration {
    /// Query for MSE playback of a single video type
    pub fn video(content_type: impl Into<String>) -> Self {
        Self {
            decoding_type: MediaDecodingType::MediaSource,
            video: VideoConfiguration {
                content_type: content_type.into(),
                ..Default::default()
            },
            audio: AudioConfiguration::default(),
        }
    }

    /// Query for MSE playback of a single audio type
    pub fn audio(content_type: impl Into<String>) -> Self {
        Self {
            decoding_type: MediaDecodingType::MediaSource,
            video: VideoConfiguration::default(),
            audio: AudioConfiguration {
                content_type: content_type.into(),
                ..Default::default()
            },
        }
    }
}

/// Answer to a capability query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaCapabilitiesInfo {
    /// Can be decoded at all
    pub supported: bool,
    /// Can be decoded without dropping frames
    pub smooth: bool,
    /// Decoding is power efficient
    pub power_efficient: bool,
}

impl MediaCapabilitiesInfo {
    /// Not decodable
    pub fn unsupported() -> Self {
        Self::default()
    }

    /// Decodable, smooth and efficient
    pub fn supported() -> Self {
        Self {
            supported: true,
            smooth: true,
            power_efficient: true,
        }
    }

    /// True only when both answers are true, field by field
    pub fn and(self, other: Self) -> Self {
        Self {
            supported: self.supported && other.supported,
            smooth: self.smooth && other.smooth,
            power_efficient: self.power_efficient && other.power_efficient,
        }
    }
}

/// Pluggable decoder
pub trait Decoder: Send + Sync + fmt::Debug {
    /// Whether this decoder can handle `config`
    fn decoding_info(&self, config: &MediaDecodingConfiguration) -> MediaCapabilitiesInfo;

    /// Decode one frame. Returns
    /// [`MediaError::KeyNotFound`](crate::error::MediaError::KeyNotFound) when
    /// the frame is encrypted and the key is not available yet.
    fn decode(&self, frame: &EncodedFrame, cdm: Option<&dyn Cdm>)
        -> MediaResult<Vec<DecodedFrame>>;

    /// Drop any internal state, e.g. before decoding from a new position
    fn reset(&self);
}

/// Split a content type into its base MIME type and the entries of its
/// `codecs` parameter.
///
/// `video/mp4; codecs="avc1.42E01E, mp4a.40.2"` gives
/// `("video/mp4", ["avc1.42E01E", "mp4a.40.2"])`.
pub fn parse_content_type(content_type: &str) -> (String, Vec<String>) {
    let mut parts = content_type.split(';');
    let base = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
    let codecs = parts
        .filter_map(|param| {
            let (key, value) = param.split_once('=')?;
            if key.trim().eq_ignore_ascii_case("codecs") {
                Some(value.trim().trim_matches('"').to_string())
            } else {
                None
            }
        })
        .flat_map(|list| {
            list.split(',')
                .map(|codec| codec.trim().to_string())
                .filter(|codec| !codec.is_empty())
                .collect::<Vec<_>>()
        })
        .collect();
    (base, codecs)
}

/// Decoder used when none was injected for a stream
pub fn default_decoder(is_video: bool) -> Option<Arc<dyn Decoder>> {
    #[cfg(feature = "opus")]
    {
        if !is_video {
            return Some(Arc::new(crate::opus::OpusDecoder::new()));
        }
    }
    let _ = is_video;
    None
}
