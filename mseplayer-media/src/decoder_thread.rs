//! Per-stream decode thread
//!
//! Each stream gets one OS thread that owns the decode loop. The thread is
//! driven by a `crossbeam_channel` command queue; frames from the attached
//! [`ElementaryStream`] arrive on the same queue, tagged with the generation
//! that subscribed them. Seek and detach bump the generation so frames queued
//! for an older position are dropped without being decoded.

use crate::cdm::Cdm;
use crate::config::DecoderConfig;
use crate::decoded_stream::DecodedStream;
use crate::decoder::Decoder;
use crate::elementary_stream::{ElementaryStream, FrameSink};
use crate::error::MediaError;
use crate::frames::EncodedFrame;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use mseplayer_core::{PlayerError, PlayerResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, trace};

/// Reports from the decode thread. Called on the decode thread, never while
/// the decode lock is held.
pub struct DecoderCallbacks {
    /// Decoding failed; the thread stops decoding until re-attached
    pub on_error: Box<dyn Fn(&MediaError) + Send + Sync>,
    /// A frame needs a key the CDM does not have yet
    pub on_waiting_for_key: Box<dyn Fn() + Send + Sync>,
    /// Decoding resumed after waiting for a key
    pub on_key_available: Box<dyn Fn() + Send + Sync>,
}

impl DecoderCallbacks {
    /// Callbacks that ignore every report
    pub fn noop() -> Self {
        Self {
            on_error: Box::new(|_| {}),
            on_waiting_for_key: Box::new(|| {}),
            on_key_available: Box::new(|| {}),
        }
    }
}

enum Command {
    Attach {
        stream: Arc<dyn ElementaryStream>,
        generation: u64,
        from: f64,
    },
    Detach,
    Frame {
        generation: u64,
        frame: Arc<EncodedFrame>,
    },
    Seek {
        generation: u64,
        time: f64,
    },
    SetDecoder(Option<Arc<dyn Decoder>>),
    SetCdm(Option<Arc<dyn Cdm>>),
    Shutdown,
}

#[derive(Default)]
struct SharedState {
    generation: AtomicU64,
    /// Held for the whole of each decode
    decode_lock: Mutex<()>,
}

/// Handle to a decode thread. Dropping it stops and joins the thread.
pub struct DecoderThread {
    name: String,
    command_tx: Sender<Command>,
    shared: Arc<SharedState>,
    handle: Option<JoinHandle<()>>,
}

impl DecoderThread {
    /// Spawn the thread; decoded frames go into `decoded`
    pub fn new(
        name: &str,
        decoded: Arc<DecodedStream>,
        decoder: Option<Arc<dyn Decoder>>,
        callbacks: DecoderCallbacks,
        config: DecoderConfig,
    ) -> PlayerResult<Self> {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(SharedState::default());

        let mut decode_loop = DecodeLoop {
            name: name.to_string(),
            command_rx,
            command_tx: command_tx.clone(),
            shared: shared.clone(),
            decoded,
            callbacks,
            config,
            stream: None,
            decoder,
            cdm: None,
            backlog: VecDeque::new(),
            waiting_for_key: false,
            failed: false,
        };
        let thread_name = format!("mse-decode-{}", name);
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || decode_loop.run())
            .map_err(|e| PlayerError::ThreadSpawn {
                name: thread_name,
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            command_tx,
            shared,
            handle: Some(handle),
        })
    }

    /// Start decoding `stream` from the key frame at or before `from`
    pub fn attach(&self, stream: Arc<dyn ElementaryStream>, from: f64) {
        let generation = self.bump_generation();
        debug!("[{}] attach at {:.3}s (generation {})", self.name, from, generation);
        self.send(Command::Attach {
            stream,
            generation,
            from,
        });
    }

    /// Stop decoding. No frame is decoded once this returns.
    pub fn detach(&self) {
        self.bump_generation();
        self.send(Command::Detach);
        // Wait out a decode that started before the generation moved
        drop(self.shared.decode_lock.lock());
        debug!("[{}] detached", self.name);
    }

    /// Restart decoding from `time`
    pub fn on_seek(&self, time: f64) {
        let generation = self.bump_generation();
        self.send(Command::Seek { generation, time });
    }

    /// Swap the decoder between frames
    pub fn set_decoder(&self, decoder: Option<Arc<dyn Decoder>>) {
        self.send(Command::SetDecoder(decoder));
    }

    /// Swap the CDM between frames
    pub fn set_cdm(&self, cdm: Option<Arc<dyn Cdm>>) {
        self.send(Command::SetCdm(cdm));
    }

    fn bump_generation(&self) -> u64 {
        self.shared.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn send(&self, command: Command) {
        if self.command_tx.send(command).is_err() {
            error!("[{}] decode thread is gone", self.name);
        }
    }
}

impl Drop for DecoderThread {
    fn drop(&mut self) {
        self.bump_generation();
        let _ = self.command_tx.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            // The last owner may be a callback running on this very thread
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl fmt::Debug for DecoderThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderThread")
            .field("name", &self.name)
            .field("generation", &self.shared.generation.load(Ordering::Acquire))
            .finish()
    }
}

enum Outcome {
    Stale,
    Decoded(usize),
    KeyPending,
    Failed(MediaError),
}

struct DecodeLoop {
    name: String,
    command_rx: Receiver<Command>,
    command_tx: Sender<Command>,
    shared: Arc<SharedState>,
    decoded: Arc<DecodedStream>,
    callbacks: DecoderCallbacks,
    config: DecoderConfig,
    stream: Option<Arc<dyn ElementaryStream>>,
    decoder: Option<Arc<dyn Decoder>>,
    cdm: Option<Arc<dyn Cdm>>,
    /// Frames waiting to be decoded, oldest first
    backlog: VecDeque<(u64, Arc<EncodedFrame>)>,
    waiting_for_key: bool,
    failed: bool,
}

impl DecodeLoop {
    fn run(&mut self) {
        info!("[{}] decode thread started", self.name);
        loop {
            let command = if self.waiting_for_key && !self.backlog.is_empty() {
                match self.command_rx.recv_timeout(self.config.key_retry_interval) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match self.command_rx.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                }
            };

            if let Some(command) = command {
                if !self.handle(command) {
                    break;
                }
            }
            self.drain_backlog();
        }
        if let Some(stream) = self.stream.take() {
            stream.unsubscribe();
        }
        info!("[{}] decode thread stopped", self.name);
    }

    /// Returns false on shutdown
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Attach {
                stream,
                generation,
                from,
            } => {
                if let Some(old) = self.stream.take() {
                    old.unsubscribe();
                }
                self.reset_decoding();
                self.failed = false;
                stream.subscribe(from, self.sink(generation));
                self.stream = Some(stream);
            }
            Command::Detach => {
                if let Some(stream) = self.stream.take() {
                    stream.unsubscribe();
                }
                self.reset_decoding();
                self.failed = false;
            }
            Command::Frame { generation, frame } => {
                if generation == self.current_generation() {
                    self.backlog.push_back((generation, frame));
                }
            }
            Command::Seek { generation, time } => {
                if generation != self.current_generation() {
                    // Superseded by a later seek or detach
                    return true;
                }
                self.backlog.clear();
                if let Some(decoder) = &self.decoder {
                    decoder.reset();
                }
                self.decoded.clear();
                if let Some(stream) = &self.stream {
                    debug!("[{}] seek to {:.3}s", self.name, time);
                    stream.subscribe(time, self.sink(generation));
                }
            }
            Command::SetDecoder(decoder) => {
                if let Some(decoder) = &decoder {
                    decoder.reset();
                }
                self.decoder = decoder;
            }
            Command::SetCdm(cdm) => self.cdm = cdm,
            Command::Shutdown => return false,
        }
        true
    }

    fn reset_decoding(&mut self) {
        self.backlog.clear();
        self.waiting_for_key = false;
        if let Some(decoder) = &self.decoder {
            decoder.reset();
        }
    }

    fn current_generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    fn sink(&self, generation: u64) -> FrameSink {
        let command_tx = self.command_tx.clone();
        Box::new(move |frame| {
            let _ = command_tx.send(Command::Frame { generation, frame });
        })
    }

    fn drain_backlog(&mut self) {
        while let Some((generation, frame)) = self.backlog.front().cloned() {
            if self.failed {
                self.backlog.clear();
                return;
            }

            match self.decode_one(generation, &frame) {
                Outcome::Stale => {
                    self.backlog.pop_front();
                }
                Outcome::Decoded(count) => {
                    self.backlog.pop_front();
                    trace!("[{}] decoded {:.3}s into {} frames", self.name, frame.pts, count);
                    if self.waiting_for_key {
                        self.waiting_for_key = false;
                        info!("[{}] key available, decoding resumed", self.name);
                        (self.callbacks.on_key_available)();
                    }
                }
                Outcome::KeyPending => {
                    if !self.waiting_for_key {
                        self.waiting_for_key = true;
                        info!("[{}] waiting for key at {:.3}s", self.name, frame.pts);
                        (self.callbacks.on_waiting_for_key)();
                    }
                    return;
                }
                Outcome::Failed(e) => {
                    self.failed = true;
                    self.backlog.clear();
                    error!("[{}] decode failed at {:.3}s: {}", self.name, frame.pts, e);
                    (self.callbacks.on_error)(&e);
                    return;
                }
            }
        }
    }

    fn decode_one(&self, generation: u64, frame: &EncodedFrame) -> Outcome {
        let _guard = self.shared.decode_lock.lock();
        if generation != self.current_generation() {
            return Outcome::Stale;
        }
        let Some(decoder) = &self.decoder else {
            return Outcome::Failed(MediaError::NoDecoder {
                codec: frame.stream_info.codec.clone(),
            });
        };
        match decoder.decode(frame, self.cdm.as_deref()) {
            Ok(frames) => {
                let count = frames.len();
                for decoded in frames {
                    self.decoded.insert(Arc::new(decoded));
                }
                Outcome::Decoded(count)
            }
            Err(MediaError::KeyNotFound { .. }) => Outcome::KeyPending,
            Err(e) => Outcome::Failed(e),
        }
    }
}
