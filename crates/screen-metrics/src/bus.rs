use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{TracerError, TracerResult};
use crate::events::{EventMeta, TraceEvent};
use crate::sink::{MetricsSink, TraceHandle};

/// Publishes trace events to a single consumer without ever blocking the
/// screen that produced them.
///
/// A full or closed channel loses the event and bumps `dropped`.
pub struct TraceBus {
    tx: mpsc::Sender<TraceEvent>,
    dropped: Arc<AtomicU64>,
}

impl TraceBus {
    /// Bus holding at most `capacity` undelivered events, plus its receiver.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TraceEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Returns `false` when the event was lost.
    pub fn emit(&self, event: TraceEvent) -> bool {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Events lost by this bus and all of its clones.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// `true` once nobody consumes the events any more.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Clone for TraceBus {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

/// Sink that publishes every trace on a [`TraceBus`].
#[derive(Clone)]
pub struct BusSink {
    bus: TraceBus,
}

impl BusSink {
    pub fn new(bus: TraceBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &TraceBus {
        &self.bus
    }
}

impl MetricsSink for BusSink {
    fn start_trace(&self, name: &str) -> TracerResult<Box<dyn TraceHandle>> {
        if self.bus.is_closed() {
            return Err(TracerError::sink("trace bus receiver is gone"));
        }

        let trace_id = Uuid::new_v4().to_string();
        self.bus.emit(TraceEvent::TraceStarted {
            meta: EventMeta::with_trace_id(trace_id.clone()),
            name: name.to_string(),
        });

        Ok(Box::new(BusTrace {
            bus: self.bus.clone(),
            trace_id,
            name: name.to_string(),
            started_at: Utc::now(),
            metrics: BTreeMap::new(),
            stopped: false,
        }))
    }
}

struct BusTrace {
    bus: TraceBus,
    trace_id: String,
    name: String,
    started_at: DateTime<Utc>,
    metrics: BTreeMap<String, u64>,
    stopped: bool,
}

impl TraceHandle for BusTrace {
    fn name(&self) -> &str {
        &self.name
    }

    fn increment_metric(&mut self, name: &str, value: u64) -> TracerResult<()> {
        if self.stopped {
            return Err(TracerError::sink(format!("trace {} already stopped", self.name)));
        }
        let entry = self.metrics.entry(name.to_string()).or_insert(0);
        *entry = entry.saturating_add(value);
        Ok(())
    }

    fn metric(&self, name: &str) -> Option<u64> {
        self.metrics.get(name).copied()
    }

    fn stop(&mut self) -> TracerResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;

        let delivered = self.bus.emit(TraceEvent::TraceCompleted {
            meta: EventMeta::with_trace_id(self.trace_id.clone()),
            name: self.name.clone(),
            started_at: self.started_at,
            metrics: std::mem::take(&mut self.metrics),
        });
        if !delivered {
            return Err(TracerError::sink(format!(
                "trace {} dropped: bus full or closed",
                self.name
            )));
        }
        Ok(())
    }
}

impl Drop for BusTrace {
    fn drop(&mut self) {
        if !self.stopped {
            self.bus.emit(TraceEvent::TraceAbandoned {
                meta: EventMeta::with_trace_id(self.trace_id.clone()),
                name: self.name.clone(),
            });
        }
    }
}
