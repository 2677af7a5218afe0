use crate::plugin::ChannelPlugin;
use crate::NotificationChannel;
use anyhow::Result;
use async_trait::async_trait;
use cadmon_common::types::{AlarmState, Transition};
use serde_json::Value;

/// Delivery of last resort: writes transitions to the structured log.
#[derive(Debug)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn send(&self, transition: &Transition) -> Result<()> {
        if transition.to_state() == AlarmState::Alarm {
            tracing::warn!(
                kind = transition.kind(),
                name = %transition.name(),
                from = %transition.from_state(),
                to = %transition.to_state(),
                at_bucket = %transition.at_bucket(),
                severity = %transition.severity(),
                message = %transition.message(),
                "notification"
            );
        } else {
            tracing::info!(
                kind = transition.kind(),
                name = %transition.name(),
                from = %transition.from_state(),
                to = %transition.to_state(),
                at_bucket = %transition.at_bucket(),
                severity = %transition.severity(),
                message = %transition.message(),
                "notification"
            );
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}

pub struct LogPlugin;

impl ChannelPlugin for LogPlugin {
    fn name(&self) -> &str {
        "log"
    }

    fn validate_config(&self, _config: &Value) -> Result<()> {
        Ok(())
    }

    fn create_channel(&self, _config: &Value) -> Result<Box<dyn NotificationChannel>> {
        Ok(Box::new(LogChannel))
    }
}
