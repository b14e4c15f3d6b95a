//! Opus audio decoder backed by audiopus

use crate::cdm::Cdm;
use crate::decoder::{parse_content_type, Decoder, MediaCapabilitiesInfo, MediaDecodingConfiguration};
use crate::error::{MediaError, MediaResult};
use crate::frames::{AudioSamples, DecodedFrame, EncodedFrame, FramePayload};
use audiopus::{coder::Decoder as RawOpusDecoder, Channels, SampleRate};
use parking_lot::Mutex;
use tracing::debug;

/// Largest Opus frame: 120 ms at 48 kHz
const MAX_FRAME_SAMPLES: usize = 5760;

struct ActiveDecoder {
    decoder: RawOpusDecoder,
    sample_rate: u32,
    channels: u8,
}

/// Decodes Opus audio into interleaved f32 samples
#[derive(Default)]
pub struct OpusDecoder {
    active: Mutex<Option<ActiveDecoder>>,
}

impl OpusDecoder {
    /// Create a decoder; the codec is set up from the first frame's stream info
    pub fn new() -> Self {
        Self::default()
    }

    fn open(sample_rate: u32, channels: u32) -> MediaResult<ActiveDecoder> {
        let rate = match sample_rate {
            8000 => SampleRate::Hz8000,
            12000 => SampleRate::Hz12000,
            16000 => SampleRate::Hz16000,
            24000 => SampleRate::Hz24000,
            48000 => SampleRate::Hz48000,
            _ => {
                return Err(MediaError::CodecInitializationFailed {
                    codec: "opus".to_string(),
                    reason: format!("unsupported sample rate {}", sample_rate),
                })
            }
        };
        let layout = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(MediaError::CodecInitializationFailed {
                    codec: "opus".to_string(),
                    reason: format!("unsupported channel count {}", channels),
                })
            }
        };
        let decoder = RawOpusDecoder::new(rate, layout).map_err(|e| {
            MediaError::CodecInitializationFailed {
                codec: "opus".to_string(),
                reason: format!("{:?}", e),
            }
        })?;
        debug!("Opened Opus decoder at {} Hz, {} channels", sample_rate, channels);
        Ok(ActiveDecoder {
            decoder,
            sample_rate,
            channels: channels as u8,
        })
    }
}

fn is_opus(content_type: &str) -> bool {
    let (base, codecs) = parse_content_type(content_type);
    base.starts_with("audio/") && codecs.len() == 1 && codecs[0].eq_ignore_ascii_case("opus")
}

impl Decoder for OpusDecoder {
    fn decoding_info(&self, config: &MediaDecodingConfiguration) -> MediaCapabilitiesInfo {
        let video_ok = config.video.content_type.is_empty();
        let audio = &config.audio.content_type;
        if video_ok && !audio.is_empty() && is_opus(audio) {
            MediaCapabilitiesInfo::supported()
        } else {
            MediaCapabilitiesInfo::unsupported()
        }
    }

    fn decode(
        &self,
        frame: &EncodedFrame,
        cdm: Option<&dyn Cdm>,
    ) -> MediaResult<Vec<DecodedFrame>> {
        let info = &frame.stream_info;
        if info.is_video || !info.codec.eq_ignore_ascii_case("opus") {
            return Err(MediaError::UnsupportedFormat {
                format: format!("{} ({})", info.codec, info.mime_type),
            });
        }
        let data = frame.decrypt(cdm)?;

        let mut active = self.active.lock();
        let reopen = match active.as_ref() {
            Some(current) => {
                current.sample_rate != info.sample_rate
                    || u32::from(current.channels) != info.channel_count
            }
            None => true,
        };
        if reopen {
            *active = Some(Self::open(info.sample_rate, info.channel_count)?);
        }
        let Some(current) = active.as_mut() else {
            return Ok(Vec::new());
        };

        let channels = current.channels as usize;
        let mut samples_i16 = vec![0i16; MAX_FRAME_SAMPLES * channels];
        let decoded = current
            .decoder
            .decode(Some(&data[..]), &mut samples_i16, false)
            .map_err(|e| MediaError::DecodingFailed {
                codec: "opus".to_string(),
                reason: format!("{:?}", e),
            })?;

        let samples = samples_i16[..decoded * channels]
            .iter()
            .map(|&s| s as f32 / 32767.0)
            .collect();
        Ok(vec![DecodedFrame::new(
            info.clone(),
            frame.pts,
            frame.duration,
            FramePayload::Audio(AudioSamples {
                samples,
                sample_rate: current.sample_rate,
                channels: current.channels,
            }),
        )])
    }

    fn reset(&self) {
        *self.active.lock() = None;
    }
}

impl std::fmt::Debug for OpusDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpusDecoder")
            .field("open", &self.active.lock().is_some())
            .finish()
    }
}
