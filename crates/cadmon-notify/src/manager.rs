use crate::NotificationChannel;
use cadmon_common::types::{Severity, Transition};

/// One configured channel plus its routing threshold.
pub struct ChannelRoute {
    pub min_severity: Severity,
    pub channel: Box<dyn NotificationChannel>,
}

/// Routes transitions to the configured channels by severity.
///
/// Delivery failures are logged and absorbed; the evaluator never learns
/// about them, and a failing channel never blocks the others.
pub struct NotificationManager {
    routes: Vec<ChannelRoute>,
}

impl NotificationManager {
    pub fn new(routes: Vec<ChannelRoute>) -> Self {
        Self { routes }
    }

    pub fn channel_count(&self) -> usize {
        self.routes.len()
    }

    pub async fn dispatch(&self, transition: &Transition) {
        for route in &self.routes {
            if transition.severity() < route.min_severity {
                tracing::debug!(
                    channel = route.channel.channel_name(),
                    name = %transition.name(),
                    severity = %transition.severity(),
                    "notification below channel severity threshold, skipped"
                );
                continue;
            }
            if let Err(e) = route.channel.send(transition).await {
                tracing::error!(
                    channel = route.channel.channel_name(),
                    name = %transition.name(),
                    error = %e,
                    "notification delivery failed"
                );
            }
        }
    }
}
