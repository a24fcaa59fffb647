//! One-call wiring of screen metrics tracing into a navigation host.

pub mod attach;
pub mod host;

pub use attach::{attach_performance_tracer, TracerAttachment};
pub use host::TraceableNavHost;
