//! Lifecycle-bound rendering metrics for screens.
//!
//! A [`ScreenMetricsTracer`] listens to a [`LifecycleSource`], opens a
//! [`MeasurementWindow`] whenever a screen starts and, when it stops, turns
//! the frame durations captured in between into [`DerivedMetrics`] that are
//! reported to a [`MetricsSink`].

pub mod bridge;
pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod logger;
pub mod metrics;
pub mod sampler;
pub mod sink;
pub mod tracer;
pub mod types;
pub mod window;

pub use bridge::LifecycleBridge;
pub use bus::{BusSink, TraceBus};
pub use config::{FrameThresholds, TracerConfig};
pub use error::{TracerError, TracerResult};
pub use events::{EventMeta, TraceEvent};
pub use lifecycle::{
    LifecycleEvent, LifecycleKind, LifecycleObserver, LifecycleSource, ScreenContainer,
    ScreenLifecycleCallbacks, SubscriptionId,
};
pub use logger::{LogTracerLogger, SilentLogger, TracerLogger};
pub use metrics::{
    DerivedMetrics, FROZEN_FRAME_COUNT, FROZEN_FRAME_RATIO, METRIC_NAMES, SLOW_RENDERING_COUNT,
    SLOW_RENDERING_RATIO, TOTAL_FRAME_COUNT,
};
pub use sampler::{FrameHub, FrameSampleAggregator, FrameSampler, FrameSamplerFactory};
pub use sink::{CompletedTrace, MetricsSink, RecordingSink, TraceHandle};
pub use tracer::{ScreenMetricsTracer, TracerBuilder};
pub use types::{
    FrameDurationSample, FrameHistogram, ScreenId, ScreenInfo, SurfaceId, WindowReport,
    WindowState,
};
pub use window::MeasurementWindow;
