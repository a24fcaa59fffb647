use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::DerivedMetrics;

static NEXT_SCREEN_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a single screen instance.
///
/// Two visits of the same screen type get different ids; the registry only
/// ever stores this token, never the screen itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScreenId(u64);

impl ScreenId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Allocate a fresh, process-unique id.
    pub fn next() -> Self {
        Self(NEXT_SCREEN_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "screen#{}", self.0)
    }
}

/// Identity of the rendering surface (host window) a screen draws into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SurfaceId(u64);

impl SurfaceId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

/// A screen as seen by the tracer: its identity plus the logical name used
/// for the trace and every counter it reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenInfo {
    pub id: ScreenId,
    pub display_name: String,
}

impl ScreenInfo {
    pub fn new(id: ScreenId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
        }
    }

    /// Describe a brand new screen instance with a freshly allocated id.
    pub fn named(display_name: impl Into<String>) -> Self {
        Self::new(ScreenId::next(), display_name)
    }
}

impl fmt::Display for ScreenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.display_name, self.id)
    }
}

/// One histogram bucket: `count` frames that each took `duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDurationSample {
    pub duration_ms: u64,
    pub count: u64,
}

impl FrameDurationSample {
    pub const fn new(duration_ms: u64, count: u64) -> Self {
        Self { duration_ms, count }
    }
}

impl From<(u64, u64)> for FrameDurationSample {
    fn from((duration_ms, count): (u64, u64)) -> Self {
        Self::new(duration_ms, count)
    }
}

/// Buckets drained from a sampler.
///
/// Iterating consumes the histogram, so a drained histogram can be walked
/// exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameHistogram {
    buckets: Vec<FrameDurationSample>,
}

impl FrameHistogram {
    pub fn new(buckets: Vec<FrameDurationSample>) -> Self {
        Self { buckets }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }
}

impl IntoIterator for FrameHistogram {
    type Item = FrameDurationSample;
    type IntoIter = std::vec::IntoIter<FrameDurationSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.buckets.into_iter()
    }
}

impl FromIterator<FrameDurationSample> for FrameHistogram {
    fn from_iter<I: IntoIterator<Item = FrameDurationSample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WindowState {
    Open,
    Closed,
}

impl WindowState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// Outcome of closing a measurement window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowReport {
    pub screen: ScreenInfo,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub metrics: DerivedMetrics,
}

impl WindowReport {
    pub fn duration_ms(&self) -> u64 {
        (self.closed_at - self.opened_at)
            .num_milliseconds()
            .max(0) as u64
    }
}
