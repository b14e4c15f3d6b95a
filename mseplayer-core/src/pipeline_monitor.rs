//! Buffering watchdog
//!
//! The monitor samples the buffered ranges on a background thread, derives the
//! ready state from how much data sits ahead of the play head, and tells the
//! [`PipelineManager`] whether playback can continue.

use crate::buffered::{find_range, BufferedRange};
use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::error::{PlayerError, PlayerResult};
use crate::pipeline_manager::PipelineManager;
use crate::state::{PlaybackState, ReadyState};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace};

/// Returns the ranges every attached stream has buffered
pub type BufferedCallback = Box<dyn Fn() -> Vec<BufferedRange> + Send + Sync>;

/// Invoked with the new ready state whenever it changes. Polls are serialized
/// around it, so it must not poll the monitor again.
pub type ReadyStateCallback = Box<dyn Fn(ReadyState) + Send + Sync>;

/// Invoked after every iteration, once the pipeline has been updated
pub type PollHook = Arc<dyn Fn() + Send + Sync>;

const MAX_SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Derive the ready state for a play head at `time`.
pub fn compute_ready_state(
    ranges: &[BufferedRange],
    time: f64,
    duration: f64,
    rate: f64,
    config: &MonitorConfig,
) -> ReadyState {
    let tolerance = config.gap_tolerance;
    let reaches_end = |range: &BufferedRange| duration.is_finite() && range.end >= duration - tolerance;

    let range = find_range(ranges, time, tolerance).or_else(|| {
        // At the very end the play head sits on the range's end
        ranges
            .iter()
            .find(|range| range.start <= time + tolerance && reaches_end(range) && time >= range.end)
            .copied()
    });
    let Some(range) = range else {
        return ReadyState::HaveMetadata;
    };
    if reaches_end(&range) {
        return ReadyState::HaveEnoughData;
    }

    let ahead = range.end - time;
    if ahead < config.future_data_seconds {
        ReadyState::HaveCurrentData
    } else if ahead < config.enough_data_for_rate(rate) {
        ReadyState::HaveFutureData
    } else {
        ReadyState::HaveEnoughData
    }
}

struct MonitorInner {
    get_buffered: BufferedCallback,
    ready_state_changed: ReadyStateCallback,
    clock: Arc<dyn Clock>,
    pipeline: Arc<PipelineManager>,
    config: MonitorConfig,
    running: AtomicBool,
    ready_state: Mutex<ReadyState>,
    on_polled: Mutex<Option<PollHook>>,
    /// Held across an iteration, ready-state callback included, so reports
    /// from concurrent polls cannot interleave
    poll_lock: Mutex<()>,
}

impl MonitorInner {
    fn poll(&self) {
        {
            let _serial = self.poll_lock.lock();
            self.update();
        }
        let hook = self.on_polled.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn update(&self) {
        let status = self.pipeline.playback_state();
        if status.is_terminal() {
            return;
        }
        if status == PlaybackState::Initializing {
            self.change_ready_state(ReadyState::HaveNothing);
            return;
        }

        let time = self.pipeline.current_time();
        let duration = self.pipeline.duration();
        let rate = self.pipeline.playback_rate();
        let ranges = (self.get_buffered)();
        let ready = compute_ready_state(&ranges, time, duration, rate, &self.config);
        trace!(
            "Monitor poll: time={:.3} duration={:.3} ready={} ranges={}",
            time,
            duration,
            ready,
            ranges.len()
        );
        self.change_ready_state(ready);

        if duration.is_finite() && time >= duration {
            self.pipeline.on_ended();
        } else if ready >= ReadyState::HaveEnoughData {
            self.pipeline.can_play();
        } else {
            self.pipeline.stalled();
        }
    }

    fn change_ready_state(&self, ready: ReadyState) {
        {
            let mut current = self.ready_state.lock();
            if *current == ready {
                return;
            }
            debug!("Ready state {} -> {}", *current, ready);
            *current = ready;
        }
        (self.ready_state_changed)(ready);
    }

    fn run(&self) {
        let interval = self.config.poll_interval.as_secs_f64();
        while self.running.load(Ordering::Acquire) {
            let deadline = self.clock.now() + interval;
            while self.running.load(Ordering::Acquire) {
                let remaining = deadline - self.clock.now();
                if remaining <= 0.0 {
                    break;
                }
                self.clock
                    .sleep(Duration::from_secs_f64(remaining).min(MAX_SLEEP_SLICE));
            }
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            self.poll();
        }
    }
}

/// Background thread driving ready-state and stall transitions
pub struct PipelineMonitor {
    inner: Arc<MonitorInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PipelineMonitor {
    /// Create a stopped monitor
    pub fn new(
        get_buffered: BufferedCallback,
        ready_state_changed: ReadyStateCallback,
        clock: Arc<dyn Clock>,
        pipeline: Arc<PipelineManager>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                get_buffered,
                ready_state_changed,
                clock,
                pipeline,
                config,
                running: AtomicBool::new(false),
                ready_state: Mutex::new(ReadyState::HaveNothing),
                on_polled: Mutex::new(None),
                poll_lock: Mutex::new(()),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Start polling; the last ready state is reset to `HaveNothing`
    pub fn start(&self) -> PlayerResult<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Ok(());
        }
        *self.inner.ready_state.lock() = ReadyState::HaveNothing;
        self.inner.running.store(true, Ordering::Release);

        let inner = self.inner.clone();
        let spawned = thread::Builder::new()
            .name("mse-monitor".to_string())
            .spawn(move || inner.run());
        match spawned {
            Ok(join) => {
                *handle = Some(join);
                info!(
                    "Pipeline monitor started (interval {:?})",
                    self.inner.config.poll_interval
                );
                Ok(())
            }
            Err(e) => {
                self.inner.running.store(false, Ordering::Release);
                Err(PlayerError::ThreadSpawn {
                    name: "mse-monitor".to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Run `hook` after every iteration, outside the pipeline's lock
    pub fn set_poll_hook(&self, hook: Option<PollHook>) {
        *self.inner.on_polled.lock() = hook;
    }

    /// Stop polling and wait for the thread to exit
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        let Some(join) = self.handle.lock().take() else {
            return;
        };
        // A client callback running on the monitor thread may stop it
        if join.thread().id() != thread::current().id() {
            let _ = join.join();
        }
        info!("Pipeline monitor stopped");
    }

    /// Whether the background thread is running
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Run a single monitor iteration on the calling thread
    pub fn poll(&self) {
        self.inner.poll();
    }

    /// Last ready state the monitor reported
    pub fn ready_state(&self) -> ReadyState {
        *self.inner.ready_state.lock()
    }

    /// Thresholds in use
    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }
}

impl Drop for PipelineMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for PipelineMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineMonitor")
            .field("running", &self.is_running())
            .field("ready_state", &self.ready_state())
            .field("config", &self.inner.config)
            .finish()
    }
}
