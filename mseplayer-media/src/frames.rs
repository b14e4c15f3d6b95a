//! Stream descriptions and media frame types

use crate::cdm::{Cdm, EncryptionPattern, EncryptionScheme, AES_BLOCK_SIZE};
use crate::error::{MediaError, MediaResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Exact fraction used for time scales.
///
/// Equality is structural: `1/2` and `2/4` are different values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    /// Numerator
    pub numerator: u64,
    /// Denominator
    pub denominator: u64,
}

impl Rational {
    /// Create a new rational
    pub fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Value as a float
    pub fn to_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Convert a tick count in this time scale into seconds
    pub fn scale(self, ticks: i64) -> f64 {
        ticks as f64 * self.numerator as f64 / self.denominator as f64
    }
}

impl From<Rational> for f64 {
    fn from(value: Rational) -> Self {
        value.to_f64()
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Immutable description of one elementary stream, used to set up decoders
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Full MIME type of the input, possibly naming several codecs
    pub mime_type: String,
    /// The single codec this stream carries
    pub codec: String,
    /// Time scale of tick-based frame times
    pub time_scale: Rational,
    /// Decoder initialization data
    pub extra_data: Bytes,
    /// Video or audio
    pub is_video: bool,
    /// Frame width in pixels (video)
    pub width: u32,
    /// Frame height in pixels (video)
    pub height: u32,
    /// Channel count (audio)
    pub channel_count: u32,
    /// Sample rate in Hz (audio)
    pub sample_rate: u32,
}

impl StreamInfo {
    /// Describe a video stream
    pub fn video(
        mime_type: impl Into<String>,
        codec: impl Into<String>,
        time_scale: Rational,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            mime_type: mime_type.into(),
            codec: codec.into(),
            time_scale,
            extra_data: Bytes::new(),
            is_video: true,
            width,
            height,
            channel_count: 0,
            sample_rate: 0,
        }
    }

    /// Describe an audio stream
    pub fn audio(
        mime_type: impl Into<String>,
        codec: impl Into<String>,
        time_scale: Rational,
        channel_count: u32,
        sample_rate: u32,
    ) -> Self {
        Self {
            mime_type: mime_type.into(),
            codec: codec.into(),
            time_scale,
            extra_data: Bytes::new(),
            is_video: false,
            width: 0,
            height: 0,
            channel_count,
            sample_rate,
        }
    }

    /// Attach decoder initialization data
    pub fn with_extra_data(mut self, extra_data: impl Into<Bytes>) -> Self {
        self.extra_data = extra_data.into();
        self
    }
}

/// Common-encryption protection scheme of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtectionScheme {
    /// AES-CTR, full sample
    Cenc,
    /// AES-CTR with pattern
    Cens,
    /// AES-CBC, full sample
    Cbc1,
    /// AES-CBC with pattern and constant IV
    Cbcs,
}

impl ProtectionScheme {
    /// Parse a scheme from its four-character code
    pub fn from_fourcc(fourcc: u32) -> MediaResult<Self> {
        match &fourcc.to_be_bytes() {
            b"cenc" => Ok(ProtectionScheme::Cenc),
            b"cens" => Ok(ProtectionScheme::Cens),
            b"cbc1" => Ok(ProtectionScheme::Cbc1),
            b"cbcs" => Ok(ProtectionScheme::Cbcs),
            _ => Err(MediaError::UnsupportedScheme {
                scheme: format!("0x{:08x}", fourcc),
            }),
        }
    }

    /// Four-character code
    pub fn fourcc(self) -> u32 {
        u32::from_be_bytes(*self.as_bytes())
    }

    fn as_bytes(self) -> &'static [u8; 4] {
        match self {
            ProtectionScheme::Cenc => b"cenc",
            ProtectionScheme::Cens => b"cens",
            ProtectionScheme::Cbc1 => b"cbc1",
            ProtectionScheme::Cbcs => b"cbcs",
        }
    }

    /// Cipher mode handed to the CDM
    pub fn cipher(self) -> EncryptionScheme {
        match self {
            ProtectionScheme::Cenc | ProtectionScheme::Cens => EncryptionScheme::AesCtr,
            ProtectionScheme::Cbc1 | ProtectionScheme::Cbcs => EncryptionScheme::AesCbc,
        }
    }

    fn allows_pattern(self) -> bool {
        matches!(self, ProtectionScheme::Cens | ProtectionScheme::Cbcs)
    }
}

impl fmt::Display for ProtectionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // All four codes are ASCII
        f.write_str(std::str::from_utf8(self.as_bytes()).unwrap_or("????"))
    }
}

/// Clear/protected split of one subsample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subsample {
    /// Leading bytes left in the clear
    pub clear_bytes: u32,
    /// Following encrypted bytes
    pub protected_bytes: u32,
}

impl Subsample {
    /// Create a new subsample entry
    pub fn new(clear_bytes: u32, protected_bytes: u32) -> Self {
        Self {
            clear_bytes,
            protected_bytes,
        }
    }
}

/// Per-frame encryption parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionInfo {
    /// Protection scheme
    pub scheme: ProtectionScheme,
    /// Pattern, only valid for 'cens' and 'cbcs'
    pub pattern: EncryptionPattern,
    /// Key id
    pub key_id: Vec<u8>,
    /// Initialization vector (8 or 16 bytes)
    pub iv: Vec<u8>,
    /// Subsample layout; empty means the whole frame is protected
    pub subsamples: Vec<Subsample>,
}

/// One compressed frame as produced by the demuxer
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Stream this frame belongs to
    pub stream_info: Arc<StreamInfo>,
    /// Presentation time in seconds
    pub pts: f64,
    /// Decode time in seconds
    pub dts: f64,
    /// Duration in seconds
    pub duration: f64,
    /// Whether decoding can start at this frame
    pub is_key_frame: bool,
    /// Compressed payload, possibly encrypted
    pub data: Bytes,
    /// Offset already applied to `pts` and `dts`
    pub timestamp_offset: f64,
    /// Present when the payload is encrypted
    pub encryption: Option<EncryptionInfo>,
}

impl EncodedFrame {
    /// Create a clear frame with times in seconds
    pub fn new(
        stream_info: Arc<StreamInfo>,
        pts: f64,
        dts: f64,
        duration: f64,
        is_key_frame: bool,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            stream_info,
            pts,
            dts,
            duration,
            is_key_frame,
            data: data.into(),
            timestamp_offset: 0.0,
            encryption: None,
        }
    }

    /// Create a frame with times in ticks of the stream's time scale
    pub fn from_ticks(
        stream_info: Arc<StreamInfo>,
        pts: i64,
        dts: i64,
        duration: i64,
        is_key_frame: bool,
        data: impl Into<Bytes>,
        timestamp_offset: f64,
    ) -> Self {
        let scale = stream_info.time_scale;
        Self {
            pts: scale.scale(pts) + timestamp_offset,
            dts: scale.scale(dts) + timestamp_offset,
            duration: scale.scale(duration),
            is_key_frame,
            data: data.into(),
            timestamp_offset,
            encryption: None,
            stream_info,
        }
    }

    /// Mark the payload as encrypted
    pub fn with_encryption(mut self, encryption: EncryptionInfo) -> Self {
        self.encryption = Some(encryption);
        self
    }

    /// Whether the payload needs a CDM
    pub fn is_encrypted(&self) -> bool {
        self.encryption.is_some()
    }

    /// Presentation end time
    pub fn end(&self) -> f64 {
        self.pts + self.duration
    }

    /// Produce the clear payload.
    ///
    /// Clear frames are returned as-is. Encrypted frames need a CDM; clear
    /// subsample bytes are copied through and each protected region is handed
    /// to the CDM with the IV and block offset for its position.
    pub fn decrypt(&self, cdm: Option<&dyn Cdm>) -> MediaResult<Bytes> {
        let Some(info) = &self.encryption else {
            return Ok(self.data.clone());
        };
        let Some(cdm) = cdm else {
            return Err(MediaError::DecryptionFailed {
                reason: "encrypted frame without a CDM".to_string(),
            });
        };

        if !info.scheme.allows_pattern() && !info.pattern.is_none() {
            return Err(MediaError::DecryptionFailed {
                reason: format!("'{}' does not allow an encryption pattern", info.scheme),
            });
        }
        let cipher = info.scheme.cipher();

        if info.subsamples.is_empty() {
            return cdm
                .decrypt(cipher, info.pattern, 0, &info.key_id, &info.iv, &self.data)
                .map(Bytes::from);
        }

        let mut iv = normalize_iv(info)?;
        let src = &self.data[..];
        let mut out = Vec::with_capacity(src.len());
        let mut pos = 0usize;
        let mut block_offset = 0usize;
        for subsample in &info.subsamples {
            let clear = subsample.clear_bytes as usize;
            let protected = subsample.protected_bytes as usize;
            let remaining = src.len() - pos;
            if remaining < clear || remaining - clear < protected {
                return Err(MediaError::InvalidSubsample {
                    reason: format!(
                        "subsample {}+{} exceeds remaining {} bytes",
                        clear, protected, remaining
                    ),
                });
            }

            out.extend_from_slice(&src[pos..pos + clear]);
            pos += clear;
            if protected == 0 {
                continue;
            }

            let region = &src[pos..pos + protected];
            let decrypted =
                cdm.decrypt(cipher, info.pattern, block_offset, &info.key_id, &iv, region)?;
            out.extend_from_slice(&decrypted);

            match info.scheme {
                ProtectionScheme::Cenc => {
                    let increment = (block_offset + protected) / AES_BLOCK_SIZE;
                    increment_iv(&mut iv, increment as u64);
                    block_offset = (block_offset + protected) % AES_BLOCK_SIZE;
                }
                ProtectionScheme::Cens => {
                    let increment = pattern_block_count(protected, info.pattern);
                    increment_iv(&mut iv, increment as u64);
                    block_offset = (block_offset + protected) % AES_BLOCK_SIZE;
                }
                ProtectionScheme::Cbc1 => {
                    if protected % AES_BLOCK_SIZE != 0 {
                        return Err(MediaError::InvalidSubsample {
                            reason: "'cbc1' requires subsamples to be a multiple of the AES block size"
                                .to_string(),
                        });
                    }
                    // Chaining continues from the last cipher block
                    iv = region[protected - AES_BLOCK_SIZE..].to_vec();
                }
                // Constant IV
                ProtectionScheme::Cbcs => {}
            }
            pos += protected;
        }

        if pos != src.len() {
            return Err(MediaError::InvalidSubsample {
                reason: format!("{} bytes left after subsample handling", src.len() - pos),
            });
        }
        Ok(Bytes::from(out))
    }
}

/// Counter mode IVs are 16 bytes; an 8 byte IV is the upper half with a zero
/// block counter.
fn normalize_iv(info: &EncryptionInfo) -> MediaResult<Vec<u8>> {
    match (info.scheme.cipher(), info.iv.len()) {
        (_, 16) => Ok(info.iv.clone()),
        (EncryptionScheme::AesCtr, 8) => {
            let mut iv = info.iv.clone();
            iv.resize(16, 0);
            Ok(iv)
        }
        (_, len) => Err(MediaError::DecryptionFailed {
            reason: format!("invalid IV length {} for '{}'", len, info.scheme),
        }),
    }
}

/// Add `count` to the big-endian 64-bit block counter in the IV's low half
fn increment_iv(iv: &mut [u8], count: u64) {
    let mut counter = [0u8; 8];
    counter.copy_from_slice(&iv[8..16]);
    let next = u64::from_be_bytes(counter).wrapping_add(count);
    iv[8..16].copy_from_slice(&next.to_be_bytes());
}

/// Encrypted blocks within `protected` bytes under `pattern`. A trailing
/// partial pattern counts only if it holds a whole crypt run.
fn pattern_block_count(protected: usize, pattern: EncryptionPattern) -> usize {
    let blocks = protected / AES_BLOCK_SIZE;
    let crypt = pattern.crypt_byte_block as usize;
    let pattern_size = crypt + pattern.skip_byte_block as usize;
    if pattern_size == 0 {
        return blocks;
    }
    let mut count = (blocks / pattern_size) * crypt;
    if blocks % pattern_size >= crypt {
        count += crypt;
    }
    count
}

/// PCM samples produced by an audio decoder
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSamples {
    /// Interleaved samples in `[-1, 1]`
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u8,
}

/// Image produced by a video decoder
#[derive(Debug, Clone, PartialEq)]
pub struct VideoImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel data, layout chosen by the decoder
    pub data: Bytes,
}

/// Decoded payload
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    /// Audio samples
    Audio(AudioSamples),
    /// Video image
    Video(VideoImage),
}

/// One decoded frame ready for a renderer
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Stream this frame came from
    pub stream_info: Arc<StreamInfo>,
    /// Presentation time in seconds
    pub pts: f64,
    /// Duration in seconds
    pub duration: f64,
    /// Decoded data
    pub payload: FramePayload,
}

impl DecodedFrame {
    /// Create a decoded frame
    pub fn new(stream_info: Arc<StreamInfo>, pts: f64, duration: f64, payload: FramePayload) -> Self {
        Self {
            stream_info,
            pts,
            duration,
            payload,
        }
    }

    /// Presentation end time
    pub fn end(&self) -> f64 {
        self.pts + self.duration
    }
}
