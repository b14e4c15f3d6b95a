//! Decode thread configuration

use mseplayer_core::{PlayerError, PlayerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by the per-stream decode threads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// How long a frame waiting for its key sits before it is retried
    pub key_retry_interval: Duration,
}

impl DecoderConfig {
    /// Reject values the decode thread cannot work with
    pub fn validate(&self) -> PlayerResult<()> {
        if self.key_retry_interval.is_zero() {
            return Err(PlayerError::Configuration {
                field: "key_retry_interval".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            key_retry_interval: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(DecoderConfig::default().validate().is_ok());
        let zero = DecoderConfig {
            key_retry_interval: Duration::ZERO,
        };
        assert!(zero.validate().is_err());
    }
}
