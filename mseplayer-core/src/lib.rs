//! # MSE Player Core
//!
//! Playback state machine, buffering monitor and buffered-range bookkeeping
//! for a Media-Source-Extensions style player. This crate has no knowledge of
//! codecs or frames; it works purely in terms of time ranges and states.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod buffered;
pub mod clock;
pub mod config;
pub mod error;
pub mod pipeline_manager;
pub mod pipeline_monitor;
pub mod state;

// Re-export main types
pub use buffered::{
    buffered_ahead, find_range, intersection_of_buffered_ranges, merge_frame_spans,
    BufferedRange, DEFAULT_GAP_TOLERANCE,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::MonitorConfig;
pub use error::{ErrorCategory, PlayerError, PlayerResult};
pub use pipeline_manager::{PipelineManager, SeekCallback, StatusCallback};
pub use pipeline_monitor::{
    compute_ready_state, BufferedCallback, PipelineMonitor, PollHook, ReadyStateCallback,
};
pub use state::{PlaybackState, ReadyState};
