//! Operator alerts.

use tracing::warn;

/// Destination for operator alerts (failed quarters, failed validation).
pub trait AlertSink: Send + Sync {
    /// Deliver one alert. Delivery problems must not fail the run.
    fn send(&self, subject: &str, body: &str);
}

/// Alert sink that writes alerts to the log at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn send(&self, subject: &str, body: &str) {
        warn!(alert = subject, "{body}");
    }
}
