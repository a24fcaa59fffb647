use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TracerError, TracerResult};

/// Telemetry backend that receives named counters grouped into traces.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsSink: Send + Sync {
    /// Allocate and start a trace called `name`.
    fn start_trace(&self, name: &str) -> TracerResult<Box<dyn TraceHandle>>;
}

/// One running trace.
///
/// Dropping a handle without calling [`TraceHandle::stop`] abandons the
/// trace; nothing is reported for it.
#[cfg_attr(test, mockall::automock)]
pub trait TraceHandle: Send {
    fn name(&self) -> &str;

    fn increment_metric(&mut self, name: &str, value: u64) -> TracerResult<()>;

    /// Current value of a counter, if it was ever incremented.
    fn metric(&self, name: &str) -> Option<u64>;

    /// Finish the trace and hand it to the backend.
    fn stop(&mut self) -> TracerResult<()>;
}

/// A trace that was stopped and reported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedTrace {
    pub name: String,
    pub metrics: BTreeMap<String, u64>,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
}

impl CompletedTrace {
    pub fn metric(&self, name: &str) -> Option<u64> {
        self.metrics.get(name).copied()
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    completed: Vec<CompletedTrace>,
    active: usize,
    abandoned: usize,
}

/// In-memory sink that keeps every completed trace.
///
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RecordingState> {
        lock(&self.state)
    }

    pub fn completed_traces(&self) -> Vec<CompletedTrace> {
        self.state().completed.clone()
    }

    /// Remove and return everything completed so far.
    pub fn take_completed(&self) -> Vec<CompletedTrace> {
        std::mem::take(&mut self.state().completed)
    }

    /// Traces started but neither stopped nor dropped yet.
    pub fn active_traces(&self) -> usize {
        self.state().active
    }

    /// Traces dropped without being stopped.
    pub fn abandoned_traces(&self) -> usize {
        self.state().abandoned
    }
}

impl MetricsSink for RecordingSink {
    fn start_trace(&self, name: &str) -> TracerResult<Box<dyn TraceHandle>> {
        self.state().active += 1;
        Ok(Box::new(RecordingTrace {
            state: Arc::clone(&self.state),
            name: name.to_string(),
            metrics: BTreeMap::new(),
            started_at: Utc::now(),
            stopped: false,
        }))
    }
}

struct RecordingTrace {
    state: Arc<Mutex<RecordingState>>,
    name: String,
    metrics: BTreeMap<String, u64>,
    started_at: DateTime<Utc>,
    stopped: bool,
}

impl TraceHandle for RecordingTrace {
    fn name(&self) -> &str {
        &self.name
    }

    fn increment_metric(&mut self, name: &str, value: u64) -> TracerResult<()> {
        if self.stopped {
            return Err(TracerError::sink(format!(
                "trace {} already stopped",
                self.name
            )));
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

        let mut state = lock(&self.state);
        state.active = state.active.saturating_sub(1);
        state.completed.push(CompletedTrace {
            name: self.name.clone(),
            metrics: self.metrics.clone(),
            started_at: self.started_at,
            stopped_at: Utc::now(),
        });
        Ok(())
    }
}

impl Drop for RecordingTrace {
    fn drop(&mut self) {
        if !self.stopped {
            let mut state = lock(&self.state);
            state.active = state.active.saturating_sub(1);
            state.abandoned += 1;
        }
    }
}

fn lock(state: &Mutex<RecordingState>) -> MutexGuard<'_, RecordingState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
