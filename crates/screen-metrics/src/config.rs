//! Tracer configuration.
//!
//! Every field has a default, so an empty TOML document is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TracerError, TracerResult};

/// Frames strictly slower than this miss a 60fps budget.
const DEFAULT_SLOW_FRAME_MS: u64 = 16;
/// Frames strictly slower than this are a perceptible freeze.
const DEFAULT_FROZEN_FRAME_MS: u64 = 700;
const DEFAULT_LOG_TAG: &str = "ScreenMetrics";

/// Classification boundaries for frame durations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FrameThresholds {
    pub slow_frame_ms: u64,
    pub frozen_frame_ms: u64,
}

impl Default for FrameThresholds {
    fn default() -> Self {
        Self {
            slow_frame_ms: DEFAULT_SLOW_FRAME_MS,
            frozen_frame_ms: DEFAULT_FROZEN_FRAME_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TracerConfig {
    pub thresholds: FrameThresholds,
    /// Tag handed to the logger with every diagnostic line
    pub log_tag: String,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            thresholds: FrameThresholds::default(),
            log_tag: DEFAULT_LOG_TAG.to_string(),
        }
    }
}

impl TracerConfig {
    pub fn with_thresholds(mut self, slow_frame_ms: u64, frozen_frame_ms: u64) -> Self {
        self.thresholds = FrameThresholds {
            slow_frame_ms,
            frozen_frame_ms,
        };
        self
    }

    pub fn with_log_tag(mut self, log_tag: impl Into<String>) -> Self {
        self.log_tag = log_tag.into();
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> TracerResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> TracerResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> TracerResult<()> {
        if self.thresholds.slow_frame_ms == 0 {
            return Err(TracerError::Config(
                "slow_frame_ms must be greater than zero".to_string(),
            ));
        }
        if self.thresholds.frozen_frame_ms <= self.thresholds.slow_frame_ms {
            return Err(TracerError::Config(format!(
                "frozen_frame_ms ({}) must be greater than slow_frame_ms ({})",
                self.thresholds.frozen_frame_ms, self.thresholds.slow_frame_ms
            )));
        }
        if self.log_tag.trim().is_empty() {
            return Err(TracerError::Config("log_tag must not be empty".to_string()));
        }
        Ok(())
    }
}
