//! Buffering monitor configuration

use crate::buffered::DEFAULT_GAP_TOLERANCE;
use crate::error::{PlayerError, PlayerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thresholds and cadence for the buffering monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// How often buffered ranges are sampled
    pub poll_interval: Duration,
    /// Seconds ahead of the play head needed for `HaveFutureData`
    pub future_data_seconds: f64,
    /// Seconds ahead of the play head needed for `HaveEnoughData`, and to
    /// leave `Buffering`. Scaled by the playback rate when it exceeds 1.
    pub enough_data_seconds: f64,
    /// Largest gap between ranges that is still treated as contiguous
    pub gap_tolerance: f64,
}

impl MonitorConfig {
    /// Smaller thresholds for live streams that keep little data ahead
    pub fn low_latency() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            future_data_seconds: 0.1,
            enough_data_seconds: 0.5,
            gap_tolerance: DEFAULT_GAP_TOLERANCE,
        }
    }

    /// Larger thresholds that trade start-up time for fewer stalls
    pub fn conservative() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            future_data_seconds: 1.0,
            enough_data_seconds: 5.0,
            gap_tolerance: DEFAULT_GAP_TOLERANCE,
        }
    }

    /// Seconds of data needed to play at `rate`
    pub fn enough_data_for_rate(&self, rate: f64) -> f64 {
        self.enough_data_seconds * rate.abs().max(1.0)
    }

    /// Reject values the monitor cannot work with
    pub fn validate(&self) -> PlayerResult<()> {
        if self.poll_interval.is_zero() {
            return Err(PlayerError::Configuration {
                field: "poll_interval".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(self.future_data_seconds > 0.0) {
            return Err(PlayerError::Configuration {
                field: "future_data_seconds".to_string(),
                reason: format!("must be positive, got {}", self.future_data_seconds),
            });
        }
        if !(self.enough_data_seconds >= self.future_data_seconds) {
            return Err(PlayerError::Configuration {
                field: "enough_data_seconds".to_string(),
                reason: format!(
                    "must be at least future_data_seconds ({}), got {}",
                    self.future_data_seconds, self.enough_data_seconds
                ),
            });
        }
        if !(self.gap_tolerance >= 0.0) {
            return Err(PlayerError::Configuration {
                field: "gap_tolerance".to_string(),
                reason: format!("must not be negative, got {}", self.gap_tolerance),
            });
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            future_data_seconds: 0.5,
            enough_data_seconds: 2.0,
            gap_tolerance: DEFAULT_GAP_TOLERANCE,
        }
    }
}
