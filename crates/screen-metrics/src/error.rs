use thiserror::Error;

use crate::types::{ScreenId, SurfaceId};

pub type TracerResult<T> = Result<T, TracerError>;

#[derive(Debug, Error)]
pub enum TracerError {
    #[error("render surface unavailable for {0}")]
    SurfaceUnavailable(ScreenId),

    #[error("frame sampling failed on {surface}: {reason}")]
    Sampling { surface: SurfaceId, reason: String },

    #[error("metrics sink error: {0}")]
    Sink(String),

    #[error("invalid tracer config: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl TracerError {
    pub fn sampling(surface: SurfaceId, reason: impl Into<String>) -> Self {
        Self::Sampling {
            surface,
            reason: reason.into(),
        }
    }

    pub fn sink(reason: impl Into<String>) -> Self {
        Self::Sink(reason.into())
    }
}
