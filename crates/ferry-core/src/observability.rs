//! Observability infrastructure for Ferry.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers and span constructors used across the daemon's
//! background loops and service operations.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `ferry_engine=debug`)
///
/// # Example
///
/// ```rust
/// use ferry_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for an operation on a single transfer task.
///
/// # Example
///
/// ```rust
/// use ferry_core::observability::task_span;
///
/// let span = task_span("admit", "01J0000000000000000000TASK");
/// let _guard = span.enter();
/// // ... admit the task
/// ```
#[must_use]
pub fn task_span(operation: &str, task_id: &str) -> Span {
    tracing::info_span!("task", op = operation, task_id = task_id)
}

/// Creates a span for an engine-level operation (tick, recovery, lock).
#[must_use]
pub fn engine_span(operation: &str) -> Span {
    tracing::info_span!("engine", op = operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty);
    }

    #[test]
    fn span_helpers_create_usable_spans() {
        let span = task_span("test", "id");
        let _guard = span.enter();
        tracing::info!("message in task span");

        let span = engine_span("tick");
        let _guard = span.enter();
        tracing::info!("message in engine span");
    }
}
