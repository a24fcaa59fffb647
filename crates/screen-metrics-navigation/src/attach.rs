use std::sync::Arc;

use screen_metrics::{
    LifecycleEvent, LifecycleKind, LifecycleObserver, LifecycleSource, ScreenId, ScreenInfo,
    ScreenMetricsTracer, SubscriptionId,
};

/// Follows the host screen's own lifecycle and switches tracing of its
/// child screens on at creation and off at destruction.
struct HostTracerBinding {
    host: ScreenId,
    children: Arc<dyn LifecycleSource>,
    tracer: Arc<ScreenMetricsTracer>,
}

impl LifecycleObserver for HostTracerBinding {
    fn on_lifecycle_event(&self, event: &LifecycleEvent) {
        if event.screen.id != self.host {
            return;
        }

        match event.kind {
            LifecycleKind::Created => {
                log::debug!("host {} created; tracing child screens", event.screen);
                self.tracer.start(Arc::clone(&self.children));
            }
            LifecycleKind::Destroyed => {
                log::debug!("host {} destroyed; tracing stopped", event.screen);
                self.tracer.stop();
            }
            _ => {}
        }
    }
}

/// A tracer bound to one host screen.
pub struct TracerAttachment {
    subscription: SubscriptionId,
    tracer: Arc<ScreenMetricsTracer>,
}

impl TracerAttachment {
    pub fn tracer(&self) -> &ScreenMetricsTracer {
        &self.tracer
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// Stop following the host. Tracing that is already running keeps going
    /// until the tracer itself is stopped.
    pub fn detach(&self, host_lifecycle: &dyn LifecycleSource) -> bool {
        host_lifecycle.unregister(self.subscription)
    }
}

/// Trace every child screen of `host` with `tracer`.
///
/// The tracer starts listening on `children` when `host_lifecycle` reports
/// the host as created, and stops (discarding unfinished measurements)
/// when it reports the host as destroyed.
pub fn attach_performance_tracer(
    host: &ScreenInfo,
    host_lifecycle: &dyn LifecycleSource,
    children: Arc<dyn LifecycleSource>,
    tracer: ScreenMetricsTracer,
) -> TracerAttachment {
    let tracer = Arc::new(tracer);
    let subscription = host_lifecycle.register(Arc::new(HostTracerBinding {
        host: host.id,
        children,
        tracer: Arc::clone(&tracer),
    }));

    TracerAttachment {
        subscription,
        tracer,
    }
}
