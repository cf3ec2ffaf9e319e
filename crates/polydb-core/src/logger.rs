//! Logger capability consumed by adapters and migration engines.
//!
//! The default sink forwards to `tracing`, so applications configure output
//! through their subscriber like any other event.

use std::sync::Arc;

/// Minimal logging contract: informational lines and error lines.
pub trait Logger: Send + Sync {
    /// Log an informational message.
    fn log(&self, message: &str);

    /// Log an error message.
    fn error(&self, message: &str);
}

/// Logger that emits `tracing` events, tagged with an optional scope
/// (the adapter name).
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    scope: Option<String>,
}

impl TracingLogger {
    /// Create an unscoped logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logger whose events carry `adapter = scope`.
    pub fn scoped(scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
        }
    }

    /// The scope attached to events, if any.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

impl Logger for TracingLogger {
    fn log(&self, message: &str) {
        match &self.scope {
            Some(scope) => tracing::info!(target: "polydb", adapter = %scope, "{message}"),
            None => tracing::info!(target: "polydb", "{message}"),
        }
    }

    fn error(&self, message: &str) {
        match &self.scope {
            Some(scope) => tracing::error!(target: "polydb", adapter = %scope, "{message}"),
            None => tracing::error!(target: "polydb", "{message}"),
        }
    }
}

/// Shared logger handle.
pub type SharedLogger = Arc<dyn Logger>;

/// Default logger for an adapter.
pub(crate) fn default_logger(adapter: &str) -> SharedLogger {
    Arc::new(TracingLogger::scoped(adapter))
}
