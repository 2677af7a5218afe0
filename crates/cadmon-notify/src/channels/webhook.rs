use crate::plugin::ChannelPlugin;
use crate::NotificationChannel;
use anyhow::Result;
use async_trait::async_trait;
use cadmon_common::types::Transition;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug)]
pub struct WebhookChannel {
    url: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }

    fn render_body(&self, transition: &Transition) -> String {
        serde_json::json!({
            "id": transition.id(),
            "kind": transition.kind(),
            "name": transition.name(),
            "from_state": transition.from_state().to_string(),
            "to_state": transition.to_state().to_string(),
            "at_bucket": transition.at_bucket().to_rfc3339(),
            "severity": transition.severity().to_string(),
            "message": transition.message(),
        })
        .to_string()
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, transition: &Transition) -> Result<()> {
        let body = self.render_body(transition);
        let mut last_err = None;

        for attempt in 0..3u32 {
            match self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .body(body.clone())
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    let resp_body = resp.text().await.unwrap_or_default();
                    tracing::warn!(
                        attempt = attempt + 1,
                        status = %status,
                        "Webhook returned non-success status, retrying"
                    );
                    last_err = Some(anyhow::anyhow!("HTTP {status}: {resp_body}"));
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "Webhook send failed, retrying"
                    );
                    last_err = Some(e.into());
                }
            }
            if attempt < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt)))
                    .await;
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("webhook delivery failed")))
    }

    fn channel_name(&self) -> &str {
        "webhook"
    }
}

// Plugin

#[derive(Deserialize)]
struct WebhookConfig {
    url: String,
}

pub struct WebhookPlugin;

impl ChannelPlugin for WebhookPlugin {
    fn name(&self) -> &str {
        "webhook"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        serde_json::from_value::<WebhookConfig>(config.clone())
            .map_err(|e| anyhow::anyhow!("Invalid webhook config: {e}"))?;
        Ok(())
    }

    fn create_channel(&self, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg: WebhookConfig = serde_json::from_value(config.clone())
            .map_err(|e| anyhow::anyhow!("Invalid webhook config: {e}"))?;
        Ok(Box::new(WebhookChannel::new(cfg.url)))
    }
}
