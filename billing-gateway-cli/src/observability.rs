//! Logging setup and the health report.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

use std::io;

use serde::Serialize;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log format configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable pretty format for development.
    Pretty,
    /// JSON format for production log aggregation.
    Json,
}

impl LogFormat {
    /// Determines log format from the `LOG_FORMAT` environment variable.
    #[must_use]
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("LOG_FORMAT").unwrap_or_default())
    }

    /// `json` selects JSON; anything else is pretty.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") { Self::Json } else { Self::Pretty }
    }
}

/// Initializes structured logging.
///
/// # Environment Variables
///
/// - `LOG_FORMAT`: `json` or `pretty` (default: `pretty`)
/// - `RUST_LOG`: Log level filter (default: `info`)
pub fn init_observability(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => {
            subscriber
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE)
                        .with_writer(io::stderr),
                )
                .init();
        }
        LogFormat::Json => {
            subscriber
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE)
                        .with_writer(io::stderr),
                )
                .init();
        }
    }
}

/// Overall health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Every check passed.
    Healthy,
    /// Usable, with warnings.
    Degraded,
    /// At least one check failed.
    Unhealthy,
}

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheckStatus {
    /// Check passed.
    Pass,
    /// Check failed.
    Fail,
    /// Degraded but operational.
    Warn,
}

/// Individual health check result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Check name.
    pub name: &'static str,
    /// Check status.
    pub status: HealthCheckStatus,
    /// Detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthCheck {
    /// Passing check with a message.
    #[must_use]
    pub fn pass(name: &'static str, message: impl Into<String>) -> Self {
        Self { name, status: HealthCheckStatus::Pass, message: Some(message.into()) }
    }

    /// Warning with a message.
    #[must_use]
    pub fn warn(name: &'static str, message: impl Into<String>) -> Self {
        Self { name, status: HealthCheckStatus::Warn, message: Some(message.into()) }
    }

    /// Failing check with an error message.
    #[must_use]
    pub fn fail(name: &'static str, message: impl Into<String>) -> Self {
        Self { name, status: HealthCheckStatus::Fail, message: Some(message.into()) }
    }
}

/// Health report printed by the `health` command.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// CLI version.
    pub version: &'static str,
    /// Individual checks.
    pub checks: Vec<HealthCheck>,
}

impl HealthReport {
    /// Builds a report whose status is derived from `checks`.
    #[must_use]
    pub fn new(checks: Vec<HealthCheck>) -> Self {
        Self { status: Self::compute_status(&checks), version: env!("CARGO_PKG_VERSION"), checks }
    }

    /// Determines overall health status from individual checks.
    #[must_use]
    pub fn compute_status(checks: &[HealthCheck]) -> HealthStatus {
        if checks.iter().any(|c| c.status == HealthCheckStatus::Fail) {
            HealthStatus::Unhealthy
        } else if checks.iter().any(|c| c.status == HealthCheckStatus::Warn) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse(""), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("unknown"), LogFormat::Pretty);
    }

    #[test]
    fn test_health_status_compute() {
        assert_eq!(HealthReport::compute_status(&[]), HealthStatus::Healthy);
        assert_eq!(
            HealthReport::compute_status(&[HealthCheck::pass("config", "ok")]),
            HealthStatus::Healthy
        );
        assert_eq!(
            HealthReport::compute_status(&[
                HealthCheck::pass("config", "ok"),
                HealthCheck::warn("cache", "disabled"),
            ]),
            HealthStatus::Degraded
        );
        assert_eq!(
            HealthReport::compute_status(&[
                HealthCheck::warn("cache", "disabled"),
                HealthCheck::fail("backend", "connection refused"),
            ]),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn test_health_report_json() {
        let report = HealthReport::new(vec![
            HealthCheck::pass("backend", "2 plans"),
            HealthCheck::fail("cache", "redis unreachable"),
        ]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["checks"][0]["name"], "backend");
        assert_eq!(json["checks"][0]["status"], "pass");
        assert_eq!(json["checks"][1]["message"], "redis unreachable");
        assert!(json["version"].is_string());
    }
}
