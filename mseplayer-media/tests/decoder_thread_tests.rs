//! Integration tests for the per-stream decode thread
//!
//! These tests drive a real decode thread with an in-memory elementary stream
//! and a scripted decoder, and wait on the decoded frame store.

use mseplayer_media::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::assert_ok;

// ============================================================================
// TEST DOUBLES
// ============================================================================

/// Turns every frame into one image; fails at `fail_at` if set
#[derive(Debug, Default)]
struct ScriptedDecoder {
    fail_at: Mutex<Option<f64>>,
    decoded: Mutex<Vec<f64>>,
    resets: AtomicUsize,
}

impl Decoder for ScriptedDecoder {
    fn decoding_info(&self, _config: &MediaDecodingConfiguration) -> MediaCapabilitiesInfo {
        MediaCapabilitiesInfo::supported()
    }

    fn decode(&self, frame: &EncodedFrame, cdm: Option<&dyn Cdm>) -> MediaResult<Vec<DecodedFrame>> {
        let data = frame.decrypt(cdm)?;
        if *self.fail_at.lock() == Some(frame.pts) {
            return Err(MediaError::DecodingFailed {
                codec: frame.stream_info.codec.clone(),
                reason: "scripted failure".to_string(),
            });
        }
        self.decoded.lock().push(frame.pts);
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

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::AcqRel);
    }
}

/// Returns the payload unchanged once `has_key` is set
#[derive(Debug, Default)]
struct GatedCdm {
    has_key: AtomicBool,
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
        key_id: &[u8],
        _iv: &[u8],
        src: &[u8],
    ) -> MediaResult<Vec<u8>> {
        if self.has_key.load(Ordering::Acquire) {
            Ok(src.to_vec())
        } else {
            Err(MediaError::KeyNotFound {
                key_id: key_id.iter().map(|b| format!("{:02x}", b)).collect(),
            })
        }
    }
}

#[derive(Default)]
struct Reports {
    errors: AtomicUsize,
    waiting: AtomicUsize,
    available: AtomicUsize,
}

struct Fixture {
    thread: DecoderThread,
    decoded: Arc<DecodedStream>,
    decoder: Arc<ScriptedDecoder>,
    stream: Arc<MemoryElementaryStream>,
    reports: Arc<Reports>,
}

fn info() -> Arc<StreamInfo> {
    Arc::new(StreamInfo::video(
        "video/mp4; codecs=\"avc1.42E01E\"",
        "avc1.42E01E",
        Rational::new(1, 1000),
        640,
        360,
    ))
}

/// Frame `i` starts at `i * 0.5` s; every other frame is a key frame
fn frame(i: u32) -> EncodedFrame {
    let pts = i as f64 * 0.5;
    EncodedFrame::new(info(), pts, pts, 0.5, i % 2 == 0, vec![i as u8; 8])
}

fn encrypted_frame(i: u32) -> EncodedFrame {
    frame(i).with_encryption(EncryptionInfo {
        scheme: ProtectionScheme::Cenc,
        pattern: EncryptionPattern::default(),
        key_id: vec![0x11; 16],
        iv: vec![0; 16],
        subsamples: Vec::new(),
    })
}

fn fixture() -> Fixture {
    let decoded = Arc::new(DecodedStream::new());
    let decoder = Arc::new(ScriptedDecoder::default());
    let reports = Arc::new(Reports::default());

    let on_error = reports.clone();
    let on_waiting = reports.clone();
    let on_available = reports.clone();
    let callbacks = DecoderCallbacks {
        on_error: Box::new(move |_| {
            on_error.errors.fetch_add(1, Ordering::AcqRel);
        }),
        on_waiting_for_key: Box::new(move || {
            on_waiting.waiting.fetch_add(1, Ordering::AcqRel);
        }),
        on_key_available: Box::new(move || {
            on_available.available.fetch_add(1, Ordering::AcqRel);
        }),
    };
    let config = DecoderConfig {
        key_retry_interval: Duration::from_millis(5),
    };
    let thread = assert_ok!(DecoderThread::new(
        "video",
        decoded.clone(),
        Some(decoder.clone() as Arc<dyn Decoder>),
        callbacks,
        config,
    ));

    Fixture {
        thread,
        decoded,
        decoder,
        stream: Arc::new(MemoryElementaryStream::new(info())),
        reports,
    }
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(2));
    }
}

// ============================================================================
// DECODING
// ============================================================================

#[test]
fn test_decodes_attached_stream() {
    let f = fixture();
    for i in 0..4 {
        f.stream.push_frame(frame(i));
    }
    f.thread.attach(f.stream.clone(), 0.0);
    wait_until("replayed frames", || f.decoded.len() == 4);

    f.stream.push_frame(frame(4));
    wait_until("appended frame", || f.decoded.len() == 5);
    assert_eq!(*f.decoder.decoded.lock(), vec![0.0, 0.5, 1.0, 1.5, 2.0]);
}

#[test]
fn test_gap_filled_after_attach_is_decoded() {
    let f = fixture();
    for i in (0..4).chain(8..12) {
        f.stream.push_frame(frame(i));
    }
    f.thread.attach(f.stream.clone(), 0.0);
    wait_until("frames around the gap", || f.decoded.len() == 8);
    assert_eq!(
        f.decoded.get_frame(3.0, FrameLocation::Near).unwrap().pts,
        1.5
    );

    // [2, 4) arrives late
    for i in 4..8 {
        f.stream.push_frame(frame(i));
    }
    assert_eq!(
        f.stream.buffered_ranges(),
        vec![mseplayer_core::BufferedRange::new(0.0, 6.0)]
    );
    wait_until("gap decoded", || f.decoded.len() == 12);
    assert_eq!(
        f.decoded.get_frame(3.0, FrameLocation::Near).unwrap().pts,
        3.0
    );
}

#[test]
fn test_seek_restarts_from_key_frame() {
    let f = fixture();
    for i in 0..10 {
        f.stream.push_frame(frame(i));
    }
    f.thread.attach(f.stream.clone(), 0.0);
    wait_until("initial decode", || f.decoded.len() == 10);

    // 3.2 lies in the group starting at the key frame at 3.0
    f.thread.on_seek(3.2);
    wait_until("decode after seek", || {
        f.decoded.get_frame(0.0, FrameLocation::Near).is_none() && f.decoded.len() == 4
    });
    let first = f.decoded.get_frame(3.0, FrameLocation::Near).unwrap();
    assert_eq!(first.pts, 3.0);
    assert!(f.decoder.resets.load(Ordering::Acquire) >= 2);
}

#[test]
fn test_detach_stops_decoding() {
    let f = fixture();
    for i in 0..4 {
        f.stream.push_frame(frame(i));
    }
    f.thread.attach(f.stream.clone(), 0.0);
    wait_until("decode", || f.decoded.len() == 4);

    f.thread.detach();
    let decoded_before = f.decoder.decoded.lock().len();
    for i in 4..8 {
        f.stream.push_frame(frame(i));
    }
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(f.decoder.decoded.lock().len(), decoded_before);
}

#[test]
fn test_reattach_starts_over() {
    let f = fixture();
    for i in 0..4 {
        f.stream.push_frame(frame(i));
    }
    f.thread.attach(f.stream.clone(), 0.0);
    wait_until("decode", || f.decoded.len() == 4);
    f.thread.detach();
    f.decoded.clear();

    let other = Arc::new(MemoryElementaryStream::new(info()));
    for i in 10..12 {
        other.push_frame(frame(i));
    }
    f.thread.attach(other, 0.0);
    wait_until("decode of new stream", || f.decoded.len() == 2);
    assert_eq!(
        f.decoded.get_frame(100.0, FrameLocation::Near).unwrap().pts,
        5.5
    );
}

// ============================================================================
// ERRORS AND KEYS
// ============================================================================

#[test]
fn test_decode_error_reported_once() {
    let f = fixture();
    *f.decoder.fail_at.lock() = Some(1.0);
    for i in 0..4 {
        f.stream.push_frame(frame(i));
    }
    f.thread.attach(f.stream.clone(), 0.0);
    wait_until("error report", || f.reports.errors.load(Ordering::Acquire) == 1);

    f.stream.push_frame(frame(4));
    std::thread::sleep(Duration::from_millis(30));
    assert_eq!(f.reports.errors.load(Ordering::Acquire), 1);
    assert_eq!(*f.decoder.decoded.lock(), vec![0.0, 0.5]);
}

#[test]
fn test_missing_decoder_is_an_error() {
    let f = fixture();
    f.thread.set_decoder(None);
    f.stream.push_frame(frame(0));
    f.thread.attach(f.stream.clone(), 0.0);
    wait_until("error report", || f.reports.errors.load(Ordering::Acquire) == 1);
    assert!(f.decoded.is_empty());
}

#[test]
fn test_waits_for_key_then_resumes() {
    let f = fixture();
    let cdm = Arc::new(GatedCdm::default());
    f.thread.set_cdm(Some(cdm.clone() as Arc<dyn Cdm>));
    for i in 0..3 {
        f.stream.push_frame(encrypted_frame(i));
    }
    f.thread.attach(f.stream.clone(), 0.0);
    wait_until("waiting report", || f.reports.waiting.load(Ordering::Acquire) == 1);

    // Several retry intervals pass without a second report
    std::thread::sleep(Duration::from_millis(40));
    assert_eq!(f.reports.waiting.load(Ordering::Acquire), 1);
    assert!(f.decoded.is_empty());

    cdm.has_key.store(true, Ordering::Release);
    wait_until("frames after key", || f.decoded.len() == 3);
    assert_eq!(f.reports.available.load(Ordering::Acquire), 1);
    assert_eq!(f.reports.errors.load(Ordering::Acquire), 0);
}

#[test]
fn test_encrypted_frames_without_cdm_fail() {
    let f = fixture();
    f.stream.push_frame(encrypted_frame(0));
    f.thread.attach(f.stream.clone(), 0.0);
    wait_until("error report", || f.reports.errors.load(Ordering::Acquire) == 1);
    assert_eq!(f.reports.waiting.load(Ordering::Acquire), 0);
}

#[test]
fn test_drop_joins_thread() {
    let f = fixture();
    f.stream.push_frame(frame(0));
    f.thread.attach(f.stream.clone(), 0.0);
    drop(f.thread);
    // The thread unsubscribed on the way out
    f.stream.push_frame(frame(1));
    assert!(f.decoded.len() <= 1);
}
