use std::error::Error;

/// Diagnostics capability handed to the tracer at construction.
///
/// Used purely for reporting; nothing in the tracer branches on it.
pub trait TracerLogger: Send + Sync {
    fn info(&self, tag: &str, message: &str);

    fn error(&self, tag: &str, error: &dyn Error);
}

/// Forwards to the `log` facade, using the tag as the log target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracerLogger;

impl TracerLogger for LogTracerLogger {
    fn info(&self, tag: &str, message: &str) {
        log::info!(target: tag, "{}", message);
    }

    fn error(&self, tag: &str, error: &dyn Error) {
        log::error!(target: tag, "{}", error);
    }
}

/// Swallows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentLogger;

impl TracerLogger for SilentLogger {
    fn info(&self, _tag: &str, _message: &str) {}

    fn error(&self, _tag: &str, _error: &dyn Error) {}
}
