//! Desktop notifications for anomaly alerts

use notify_rust::Notification;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Notifier {
    enabled: bool,
}

impl Notifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Failures are logged, never propagated: a missing notification daemon
    /// must not stall the sampling loop.
    pub fn send(&self, summary: &str, body: &str) {
        if !self.enabled {
            debug!("Notifications disabled, dropping: {}", summary);
            return;
        }
        if let Err(e) = send_notification(summary, body) {
            warn!("Failed to show notification: {}", e);
        }
    }
}

pub fn send_notification(summary: &str, body: &str) -> Result<(), notify_rust::error::Error> {
    Notification::new()
        .summary(summary)
        .body(body)
        .appname("HealthPulse")
        .show()?;
    Ok(())
}
