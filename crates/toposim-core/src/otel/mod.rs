//! Structured logging and tracing setup.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use toposim_core::otel::Observability;
//!
//! let _guard = Observability::builder("toposim")
//!     .service_version(env!("CARGO_PKG_VERSION"))
//!     .environment_from_env()
//!     .otlp_endpoint_from_env()
//!     .json_logging()
//!     .log_level_from_env()
//!     .build()?;
//!
//! // Guard keeps the subscriber active; dropping it flushes pending spans.
//! ```

mod builder;
mod testing;

pub use builder::{Observability, ObservabilityBuilder, ObservabilityError, ObservabilityGuard};
pub use testing::{Histogram, MetricsRecorder, Span, SpanContext, SpanRecorder};

/// Maps a `Config.log_level` value (`debug|info|warning|error`) to a
/// `tracing::Level`, matching the original's `warning` synonym for `WARN`.
pub fn log_level_to_tracing(level: &str) -> tracing::Level {
    match level {
        "debug" => tracing::Level::DEBUG,
        "warning" | "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_recorder() {
        let recorder = SpanRecorder::new();

        let span = Span {
            span_id: "span-1".to_string(),
            parent_span_id: None,
            trace_id: "trace-1".to_string(),
            name: "test".to_string(),
            attributes: std::collections::HashMap::new(),
            status: "ok".to_string(),
            error_message: String::new(),
            duration_ms: 100.0,
            layer: String::new(),
        };

        recorder.record(span.clone());
        let spans = recorder.spans();

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].span_id, "span-1");
    }

    #[test]
    fn test_histogram() {
        let hist = Histogram::new(vec![1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(hist.count(), 5);
        assert_eq!(hist.sum(), 15.0);
        assert_eq!(hist.p50(), 3.0);
    }

    #[test]
    fn test_builder_creation() {
        let _builder = ObservabilityBuilder::new("test-service");
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(log_level_to_tracing("warning"), tracing::Level::WARN);
        assert_eq!(log_level_to_tracing("debug"), tracing::Level::DEBUG);
        assert_eq!(log_level_to_tracing("error"), tracing::Level::ERROR);
        assert_eq!(log_level_to_tracing("info"), tracing::Level::INFO);
    }
}
