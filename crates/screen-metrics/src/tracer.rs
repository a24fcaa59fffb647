//! Root of the engine: owns the lifecycle bridge and the registry of open
//! measurement windows.
//!
//! Nothing that goes wrong while measuring a screen escapes the tracer;
//! every failure is logged through the injected [`TracerLogger`] and the
//! affected screen simply reports no metrics for that visit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::bridge::LifecycleBridge;
use crate::config::TracerConfig;
use crate::error::TracerError;
use crate::lifecycle::{LifecycleSource, ScreenLifecycleCallbacks};
use crate::logger::{LogTracerLogger, TracerLogger};
use crate::sampler::FrameSamplerFactory;
use crate::sink::MetricsSink;
use crate::types::{ScreenId, ScreenInfo, SurfaceId, WindowReport};
use crate::window::MeasurementWindow;

#[derive(Default)]
struct Registry {
    windows: HashMap<ScreenId, MeasurementWindow>,
    /// Set by `stop()`; late starts from a stale dispatch are refused.
    stopped: bool,
}

struct TracerCore {
    config: TracerConfig,
    sink: Arc<dyn MetricsSink>,
    samplers: Arc<dyn FrameSamplerFactory>,
    logger: Arc<dyn TracerLogger>,
    registry: Mutex<Registry>,
}

impl TracerCore {
    // Held only for insert/lookup/remove; windows are closed after release.
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tag(&self) -> &str {
        &self.config.log_tag
    }

    fn start_window(&self, screen: &ScreenInfo, surface: Option<SurfaceId>) {
        let Some(surface) = surface else {
            self.logger
                .error(self.tag(), &TracerError::SurfaceUnavailable(screen.id));
            return;
        };

        let window = match MeasurementWindow::open(
            screen.clone(),
            surface,
            self.samplers.create_sampler(),
            self.sink.as_ref(),
        ) {
            Ok(window) => window,
            Err(error) => {
                self.logger.error(self.tag(), &error);
                return;
            }
        };

        let previous = {
            let mut registry = self.registry();
            if registry.stopped {
                Err(window)
            } else {
                Ok(registry.windows.insert(screen.id, window))
            }
        };

        let previous = match previous {
            Ok(previous) => previous,
            Err(mut refused) => {
                refused.abandon();
                self.logger.info(
                    self.tag(),
                    &format!("tracing stopped; not measuring {}", screen),
                );
                return;
            }
        };
        if let Some(mut previous) = previous {
            previous.abandon();
            self.logger.info(
                self.tag(),
                &format!("replaced open measurement for {}", screen),
            );
        }
    }

    fn finish_window(&self, screen: &ScreenInfo) -> Option<WindowReport> {
        let mut window = self.registry().windows.remove(&screen.id)?;
        window.close(&self.config.thresholds, self.logger.as_ref(), self.tag())
    }

    fn purge_window(&self, screen: &ScreenInfo) {
        let window = self.registry().windows.remove(&screen.id);
        if let Some(mut window) = window {
            window.abandon();
            self.logger.info(
                self.tag(),
                &format!("discarded measurement for destroyed {}", screen),
            );
        }
    }
}

impl ScreenLifecycleCallbacks for TracerCore {
    fn on_screen_started(&self, screen: &ScreenInfo, surface: Option<SurfaceId>) {
        self.start_window(screen, surface);
    }

    fn on_screen_stopped(&self, screen: &ScreenInfo, _surface: Option<SurfaceId>) {
        self.finish_window(screen);
    }

    fn on_screen_destroyed(&self, screen: &ScreenInfo) {
        self.purge_window(screen);
    }
}

/// Measures frame timing for every screen a lifecycle source reports.
pub struct ScreenMetricsTracer {
    core: Arc<TracerCore>,
    bridge: LifecycleBridge,
}

impl ScreenMetricsTracer {
    /// Tracer with the default config, logging through the `log` facade.
    pub fn new(sink: Arc<dyn MetricsSink>, samplers: Arc<dyn FrameSamplerFactory>) -> Self {
        Self::builder(sink, samplers).build()
    }

    pub fn builder(
        sink: Arc<dyn MetricsSink>,
        samplers: Arc<dyn FrameSamplerFactory>,
    ) -> TracerBuilder {
        TracerBuilder {
            sink,
            samplers,
            logger: Arc::new(LogTracerLogger),
            config: TracerConfig::default(),
        }
    }

    pub fn config(&self) -> &TracerConfig {
        &self.core.config
    }

    /// Begin listening on `source`.
    ///
    /// Calling this while already started replaces the subscription.
    pub fn start(&self, source: Arc<dyn LifecycleSource>) {
        self.core.registry().stopped = false;
        if self.bridge.listen(source) {
            self.core.logger.info(
                self.core.tag(),
                "tracer was already started; subscription re-established",
            );
        } else {
            self.core.logger.info(self.core.tag(), "screen tracing started");
        }
    }

    /// Stop listening on the source given to [`start`](Self::start) and drop
    /// every window still open.
    ///
    /// In-flight measurements are discarded, never reported. Screens that
    /// start afterwards are ignored until the tracer is started again.
    pub fn stop(&self) {
        let was_listening = self.bridge.unlisten();
        let discarded: Vec<MeasurementWindow> = {
            let mut registry = self.core.registry();
            registry.stopped = true;
            registry.windows.drain().map(|(_, window)| window).collect()
        };

        if !discarded.is_empty() {
            self.core.logger.info(
                self.core.tag(),
                &format!(
                    "screen tracing stopped; discarded {} in-flight measurement(s)",
                    discarded.len()
                ),
            );
        } else if was_listening {
            self.core.logger.info(self.core.tag(), "screen tracing stopped");
        }
    }

    /// Open a measurement window for `screen`.
    pub fn on_screen_started(&self, screen: &ScreenInfo, surface: Option<SurfaceId>) {
        self.core.start_window(screen, surface);
    }

    /// Close and report the window for `screen`, if one is open.
    pub fn on_screen_stopped(
        &self,
        screen: &ScreenInfo,
        _surface: Option<SurfaceId>,
    ) -> Option<WindowReport> {
        self.core.finish_window(screen)
    }

    /// Forget `screen` without reporting anything for it.
    pub fn on_screen_destroyed(&self, screen: &ScreenInfo) {
        self.core.purge_window(screen);
    }

    pub fn is_listening(&self) -> bool {
        self.bridge.is_listening()
    }

    pub fn open_window_count(&self) -> usize {
        self.core.registry().windows.len()
    }

    pub fn is_measuring(&self, screen: ScreenId) -> bool {
        self.core.registry().windows.contains_key(&screen)
    }
}

pub struct TracerBuilder {
    sink: Arc<dyn MetricsSink>,
    samplers: Arc<dyn FrameSamplerFactory>,
    logger: Arc<dyn TracerLogger>,
    config: TracerConfig,
}

impl TracerBuilder {
    pub fn logger(mut self, logger: Arc<dyn TracerLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn config(mut self, config: TracerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> ScreenMetricsTracer {
        let core = Arc::new(TracerCore {
            config: self.config,
            sink: self.sink,
            samplers: self.samplers,
            logger: self.logger,
            registry: Mutex::new(Registry::default()),
        });
        let bridge = LifecycleBridge::new(core.clone());
        ScreenMetricsTracer { core, bridge }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use mockall::predicate::eq;

    use super::*;
    use crate::lifecycle::{LifecycleEvent, LifecycleKind, LifecycleObserver, ScreenContainer};
    use crate::logger::SilentLogger;
    use crate::metrics::TOTAL_FRAME_COUNT;
    use crate::sampler::FrameHub;
    use crate::sink::{MockMetricsSink, MockTraceHandle, RecordingSink};

    #[derive(Default)]
    struct CapturingLogger {
        infos: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
    }

    impl CapturingLogger {
        fn errors(&self) -> Vec<String> {
            self.errors.lock().expect("lock").clone()
        }

        fn infos(&self) -> Vec<String> {
            self.infos.lock().expect("lock").clone()
        }
    }

    impl TracerLogger for CapturingLogger {
        fn info(&self, _tag: &str, message: &str) {
            self.infos.lock().expect("lock").push(message.to_string());
        }

        fn error(&self, _tag: &str, error: &dyn std::error::Error) {
            self.errors.lock().expect("lock").push(error.to_string());
        }
    }

    struct Fixture {
        hub: FrameHub,
        sink: RecordingSink,
        logger: Arc<CapturingLogger>,
        tracer: ScreenMetricsTracer,
    }

    fn fixture() -> Fixture {
        let hub = FrameHub::new();
        let sink = RecordingSink::new();
        let logger = Arc::new(CapturingLogger::default());
        let tracer = ScreenMetricsTracer::builder(Arc::new(sink.clone()), Arc::new(hub.clone()))
            .logger(logger.clone())
            .build();
        Fixture {
            hub,
            sink,
            logger,
            tracer,
        }
    }

    #[test]
    fn test_started_screen_opens_one_window() {
        let f = fixture();
        let screen = ScreenInfo::named("Home");

        f.tracer.on_screen_started(&screen, Some(SurfaceId::next()));

        assert_eq!(f.tracer.open_window_count(), 1);
        assert!(f.tracer.is_measuring(screen.id));
        assert_eq!(f.sink.active_traces(), 1);
    }

    #[test]
    fn test_stopped_screen_reports_and_leaves_registry() {
        let f = fixture();
        let screen = ScreenInfo::named("Home");
        let surface = SurfaceId::next();

        f.tracer.on_screen_started(&screen, Some(surface));
        f.hub.record_frames(surface, 5, 50);
        let report = f.tracer.on_screen_stopped(&screen, Some(surface)).expect("report");

        assert_eq!(report.metrics.total_frame_count, 50);
        assert_eq!(f.tracer.open_window_count(), 0);
        let traces = f.sink.completed_traces();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].metrics.len(), 1);
        assert_eq!(traces[0].metric(TOTAL_FRAME_COUNT), Some(50));
    }

    #[test]
    fn test_stop_without_start_is_a_noop() {
        let f = fixture();
        let screen = ScreenInfo::named("Home");

        assert!(f.tracer.on_screen_stopped(&screen, None).is_none());
        assert_eq!(f.tracer.open_window_count(), 0);
        assert!(f.sink.completed_traces().is_empty());
        assert!(f.logger.errors().is_empty());
    }

    #[test]
    fn test_missing_surface_is_logged_not_measured() {
        let f = fixture();
        let screen = ScreenInfo::named("Home");

        f.tracer.on_screen_started(&screen, None);

        assert_eq!(f.tracer.open_window_count(), 0);
        assert_eq!(f.sink.active_traces(), 0);
        assert_eq!(f.logger.errors().len(), 1);
    }

    #[test]
    fn test_double_start_replaces_and_abandons_previous_window() {
        let f = fixture();
        let screen = ScreenInfo::named("Home");
        let surface = SurfaceId::next();

        f.tracer.on_screen_started(&screen, Some(surface));
        f.hub.record_frames(surface, 5, 10);
        f.tracer.on_screen_started(&screen, Some(surface));

        assert_eq!(f.tracer.open_window_count(), 1);
        assert_eq!(f.hub.active_captures(), 1);
        assert_eq!(f.sink.abandoned_traces(), 1);
        assert!(f.sink.completed_traces().is_empty());

        f.hub.record_frames(surface, 5, 3);
        let report = f.tracer.on_screen_stopped(&screen, Some(surface)).expect("report");
        assert_eq!(report.metrics.total_frame_count, 3);
    }

    #[test]
    fn test_trace_allocation_failure_detaches_sampler() {
        let hub = FrameHub::new();
        let logger = Arc::new(CapturingLogger::default());
        let mut sink = MockMetricsSink::new();
        sink.expect_start_trace()
            .with(eq("Home"))
            .times(1)
            .returning(|_| Err(TracerError::sink("backend offline")));

        let tracer = ScreenMetricsTracer::builder(Arc::new(sink), Arc::new(hub.clone()))
            .logger(logger.clone())
            .build();
        tracer.on_screen_started(&ScreenInfo::named("Home"), Some(SurfaceId::next()));

        assert_eq!(tracer.open_window_count(), 0);
        assert_eq!(hub.active_captures(), 0);
        assert_eq!(logger.errors(), vec!["metrics sink error: backend offline".to_string()]);
    }

    #[test]
    fn test_failed_increment_still_stops_trace() {
        let hub = FrameHub::new();
        let logger = Arc::new(CapturingLogger::default());
        let mut sink = MockMetricsSink::new();
        sink.expect_start_trace().times(1).returning(|_| {
            let mut trace = MockTraceHandle::new();
            trace
                .expect_increment_metric()
                .times(1)
                .returning(|_, _| Err(TracerError::sink("quota exceeded")));
            trace.expect_stop().times(1).returning(|| Ok(()));
            Ok(Box::new(trace))
        });

        let tracer = ScreenMetricsTracer::builder(Arc::new(sink), Arc::new(hub.clone()))
            .logger(logger.clone())
            .build();
        let screen = ScreenInfo::named("Home");
        let surface = SurfaceId::next();
        tracer.on_screen_started(&screen, Some(surface));
        hub.record_frames(surface, 20, 4);

        let report = tracer.on_screen_stopped(&screen, Some(surface)).expect("report");

        assert!(report.metrics.is_empty());
        assert_eq!(logger.errors(), vec!["metrics sink error: quota exceeded".to_string()]);
        assert_eq!(tracer.open_window_count(), 0);
    }

    #[test]
    fn test_tracer_stop_discards_open_windows() {
        let f = fixture();
        let container = Arc::new(ScreenContainer::new());
        f.tracer.start(container.clone());

        let surface = Some(SurfaceId::next());
        container.screen_started(&ScreenInfo::named("List"), surface);
        container.screen_started(&ScreenInfo::named("Detail"), surface);
        assert_eq!(f.tracer.open_window_count(), 2);

        f.tracer.stop();

        assert_eq!(f.tracer.open_window_count(), 0);
        assert!(!f.tracer.is_listening());
        assert!(f.sink.completed_traces().is_empty());
        assert_eq!(f.hub.active_captures(), 0);
        assert!(f
            .logger
            .infos()
            .iter()
            .any(|line| line.contains("discarded 2 in-flight")));
    }

    #[test]
    fn test_tracer_stop_twice_matches_stop_once() {
        let f = fixture();
        let container = Arc::new(ScreenContainer::new());
        f.tracer.start(container.clone());
        container.screen_started(&ScreenInfo::named("Home"), Some(SurfaceId::next()));

        f.tracer.stop();
        f.tracer.stop();

        assert_eq!(f.tracer.open_window_count(), 0);
        assert!(!f.tracer.is_listening());
        assert_eq!(container.observer_count(), 0);
    }

    #[test]
    fn test_tracer_start_twice_keeps_single_subscription() {
        let f = fixture();
        let container = Arc::new(ScreenContainer::new());
        f.tracer.start(container.clone());
        f.tracer.start(container.clone());

        assert_eq!(container.observer_count(), 1);
        container.screen_started(&ScreenInfo::named("Home"), Some(SurfaceId::next()));
        assert_eq!(f.tracer.open_window_count(), 1);
        assert_eq!(f.sink.active_traces(), 1);
        assert!(f
            .logger
            .infos()
            .iter()
            .any(|line| line.contains("already started")));
    }

    #[test]
    fn test_destroyed_screen_is_purged_without_report() {
        let f = fixture();
        let container = Arc::new(ScreenContainer::new());
        f.tracer.start(container.clone());

        let screen = ScreenInfo::named("Home");
        container.screen_started(&screen, Some(SurfaceId::next()));
        container.screen_destroyed(&screen, None);

        assert_eq!(f.tracer.open_window_count(), 0);
        assert!(f.sink.completed_traces().is_empty());
        assert_eq!(f.sink.abandoned_traces(), 1);
    }

    fn silent_tracer(hub: &FrameHub, sink: &RecordingSink) -> ScreenMetricsTracer {
        ScreenMetricsTracer::builder(Arc::new(sink.clone()), Arc::new(hub.clone()))
            .logger(Arc::new(SilentLogger))
            .build()
    }

    #[test]
    fn test_stop_leaves_other_tracers_on_other_sources_alone() {
        let hub = FrameHub::new();
        let sink = RecordingSink::new();
        let ours = silent_tracer(&hub, &sink);
        let theirs = silent_tracer(&hub, &sink);
        let a = Arc::new(ScreenContainer::new());
        let b = Arc::new(ScreenContainer::new());

        theirs.start(b.clone());
        ours.start(a.clone());
        ours.stop();

        assert_eq!(a.observer_count(), 0);
        assert_eq!(b.observer_count(), 1);
        assert!(!ours.is_listening());
        assert!(theirs.is_listening());

        let surface = Some(SurfaceId::next());
        a.screen_started(&ScreenInfo::named("OnA"), surface);
        b.screen_started(&ScreenInfo::named("OnB"), surface);
        assert_eq!(ours.open_window_count(), 0);
        assert_eq!(theirs.open_window_count(), 1);
    }

    #[test]
    fn test_restart_on_another_source_moves_the_subscription() {
        let hub = FrameHub::new();
        let sink = RecordingSink::new();
        let ours = silent_tracer(&hub, &sink);
        let theirs = silent_tracer(&hub, &sink);
        let c = Arc::new(ScreenContainer::new());
        let d = Arc::new(ScreenContainer::new());

        theirs.start(d.clone());
        ours.start(c.clone());
        ours.start(d.clone());

        assert_eq!(c.observer_count(), 0);
        assert_eq!(d.observer_count(), 2);

        d.screen_started(&ScreenInfo::named("Feed"), Some(SurfaceId::next()));
        assert_eq!(ours.open_window_count(), 1);
        assert_eq!(theirs.open_window_count(), 1);

        ours.stop();
        assert_eq!(d.observer_count(), 1);
        assert!(theirs.is_listening());
    }

    /// Stops the tracer the first time any screen starts, ahead of the
    /// tracer's own observer in the same dispatch.
    struct StopOnFirstStart {
        tracer: Arc<ScreenMetricsTracer>,
        fired: Mutex<bool>,
    }

    impl LifecycleObserver for StopOnFirstStart {
        fn on_lifecycle_event(&self, event: &LifecycleEvent) {
            let mut fired = self.fired.lock().expect("lock");
            if event.kind == LifecycleKind::Started && !*fired {
                *fired = true;
                self.tracer.stop();
            }
        }
    }

    #[test]
    fn test_start_delivered_after_stop_is_not_measured() {
        let hub = FrameHub::new();
        let sink = RecordingSink::new();
        let tracer = Arc::new(silent_tracer(&hub, &sink));
        let container = Arc::new(ScreenContainer::new());
        container.register(Arc::new(StopOnFirstStart {
            tracer: Arc::clone(&tracer),
            fired: Mutex::new(false),
        }));
        tracer.start(container.clone());

        let screen = ScreenInfo::named("Home");
        let surface = SurfaceId::next();
        container.screen_started(&screen, Some(surface));

        assert!(!tracer.is_listening());
        assert_eq!(tracer.open_window_count(), 0);
        assert_eq!(hub.active_captures(), 0);
        assert_eq!(sink.active_traces(), 0);
        assert_eq!(sink.abandoned_traces(), 1);

        tracer.start(container.clone());
        container.screen_started(&screen, Some(surface));
        assert!(tracer.is_measuring(screen.id));
    }

    #[test]
    fn test_report_duration_spans_open_to_close() {
        let hub = FrameHub::new();
        let sink = RecordingSink::new();
        let tracer = silent_tracer(&hub, &sink);
        let screen = ScreenInfo::named("Home");
        let surface = SurfaceId::next();

        tracer.on_screen_started(&screen, Some(surface));
        std::thread::sleep(std::time::Duration::from_millis(5));
        let report = tracer.on_screen_stopped(&screen, Some(surface)).expect("report");

        assert!(report.closed_at >= report.opened_at);
        assert!(report.duration_ms() >= 5);
    }
}
