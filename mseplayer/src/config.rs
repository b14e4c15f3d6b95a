//! Configuration types and defaults

use mseplayer_core::{MonitorConfig, PlayerError, PlayerResult};
use mseplayer_media::DecoderConfig;
use serde::{Deserialize, Serialize};

/// Player-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Buffering thresholds and poll interval
    pub monitor: MonitorConfig,
    /// Decode thread settings
    pub decoder: DecoderConfig,
    /// `tracing` filter installed by [`PlayerConfig::init_logging`] when
    /// `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            decoder: DecoderConfig::default(),
            log_filter: "mseplayer=info".to_string(),
        }
    }
}

impl PlayerConfig {
    /// Start playback as soon as possible, at the cost of more stalls
    pub fn low_latency() -> Self {
        Self {
            monitor: MonitorConfig::low_latency(),
            ..Self::default()
        }
    }

    /// Buffer generously before playing
    pub fn conservative() -> Self {
        Self {
            monitor: MonitorConfig::conservative(),
            ..Self::default()
        }
    }

    /// Parse a configuration; missing fields take their defaults
    pub fn from_json(json: &str) -> PlayerResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| PlayerError::Configuration {
            field: "json".to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize for logging or persisting
    pub fn to_json(&self) -> PlayerResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| PlayerError::Configuration {
            field: "json".to_string(),
            reason: e.to_string(),
        })
    }

    /// Install the global `tracing` subscriber with [`log_filter`](Self::log_filter);
    /// see [`init_logging`](crate::logging::init_logging)
    pub fn init_logging(&self) -> PlayerResult<bool> {
        crate::logging::init_logging(&self.log_filter)
    }

    /// Check every section
    pub fn validate(&self) -> PlayerResult<()> {
        self.monitor.validate()?;
        self.decoder.validate()?;
        if self.log_filter.trim().is_empty() {
            return Err(PlayerError::Configuration {
                field: "log_filter".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
