use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every trace event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMeta {
    /// Unique event ID (UUID v4)
    pub event_id: String,
    /// When the event occurred
    pub occurred_at: DateTime<Utc>,
    /// ID of the trace the event belongs to
    pub trace_id: Option<String>,
}

impl EventMeta {
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            occurred_at: Utc::now(),
            trace_id: None,
        }
    }

    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            occurred_at: Utc::now(),
            trace_id: Some(trace_id.into()),
        }
    }
}

impl Default for EventMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of a single screen trace, as published on the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TraceEvent {
    TraceStarted {
        meta: EventMeta,
        name: String,
    },
    TraceCompleted {
        meta: EventMeta,
        name: String,
        started_at: DateTime<Utc>,
        metrics: BTreeMap<String, u64>,
    },
    /// The trace handle was dropped without being stopped
    TraceAbandoned {
        meta: EventMeta,
        name: String,
    },
}

impl TraceEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            Self::TraceStarted { meta, .. }
            | Self::TraceCompleted { meta, .. }
            | Self::TraceAbandoned { meta, .. } => meta,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::TraceStarted { name, .. }
            | Self::TraceCompleted { name, .. }
            | Self::TraceAbandoned { name, .. } => name,
        }
    }
}
