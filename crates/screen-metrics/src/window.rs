//! Per-screen measurement window.
//!
//! A window is `Open` from the moment its sampler is attached and its
//! trace allocated, and becomes `Closed` exactly once, either by
//! [`MeasurementWindow::close`] (report) or [`MeasurementWindow::abandon`]
//! (no report). A closed window never reopens.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::config::FrameThresholds;
use crate::error::TracerResult;
use crate::logger::TracerLogger;
use crate::metrics::{DerivedMetrics, METRIC_NAMES};
use crate::sampler::FrameSampler;
use crate::sink::{MetricsSink, TraceHandle};
use crate::types::{ScreenInfo, SurfaceId, WindowReport, WindowState};

pub struct MeasurementWindow {
    screen: ScreenInfo,
    surface: SurfaceId,
    sampler: Box<dyn FrameSampler>,
    trace: Option<Box<dyn TraceHandle>>,
    state: WindowState,
    opened_at: DateTime<Utc>,
}

impl MeasurementWindow {
    /// Attach `sampler` to `surface` and start a trace named after the screen.
    ///
    /// If the trace cannot be allocated the sampler is detached again, so a
    /// failed open leaves nothing behind.
    pub fn open(
        screen: ScreenInfo,
        surface: SurfaceId,
        mut sampler: Box<dyn FrameSampler>,
        sink: &dyn MetricsSink,
    ) -> TracerResult<Self> {
        sampler.attach(surface)?;

        let trace = match sink.start_trace(&screen.display_name) {
            Ok(trace) => trace,
            Err(error) => {
                sampler.detach(surface);
                return Err(error);
            }
        };

        Ok(Self {
            screen,
            surface,
            sampler,
            trace: Some(trace),
            state: WindowState::Open,
            opened_at: Utc::now(),
        })
    }

    pub fn screen(&self) -> &ScreenInfo {
        &self.screen
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == WindowState::Open
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    /// Drain the sampler, report positive counters and stop the trace.
    ///
    /// The trace is stopped even when draining or reporting fails; such a
    /// window reports zero metrics. Returns `None` if already closed.
    pub fn close(
        &mut self,
        thresholds: &FrameThresholds,
        logger: &dyn TracerLogger,
        tag: &str,
    ) -> Option<WindowReport> {
        if self.state == WindowState::Closed {
            return None;
        }
        self.state = WindowState::Closed;
        let mut trace = self.trace.take()?;

        let metrics = match self.report(trace.as_mut(), thresholds) {
            Ok(metrics) => {
                logger.info(tag, &summary_line(trace.as_ref()));
                metrics
            }
            Err(error) => {
                logger.error(tag, &error);
                DerivedMetrics::default()
            }
        };

        if let Err(error) = trace.stop() {
            logger.error(tag, &error);
        }

        Some(WindowReport {
            screen: self.screen.clone(),
            opened_at: self.opened_at,
            closed_at: Utc::now(),
            metrics,
        })
    }

    /// Close without reporting: samples are discarded and the trace is
    /// dropped unstopped.
    pub fn abandon(&mut self) {
        if self.state == WindowState::Closed {
            return;
        }
        self.state = WindowState::Closed;
        self.sampler.detach(self.surface);
        self.trace = None;
    }

    fn report(
        &mut self,
        trace: &mut dyn TraceHandle,
        thresholds: &FrameThresholds,
    ) -> TracerResult<DerivedMetrics> {
        let histogram = self.sampler.drain_and_reset(self.surface)?;
        let metrics = DerivedMetrics::from_samples(histogram, thresholds);

        for (name, value) in metrics.counters() {
            trace.increment_metric(name, value)?;
        }
        Ok(metrics)
    }
}

impl Drop for MeasurementWindow {
    fn drop(&mut self) {
        self.abandon();
    }
}

fn summary_line(trace: &dyn TraceHandle) -> String {
    let mut line = format!("sendScreenTrace name:{}", trace.name());
    for name in METRIC_NAMES {
        let _ = write!(line, " {}:{}", name, trace.metric(name).unwrap_or(0));
    }
    line
}
