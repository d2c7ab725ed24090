/// Threshold + cooldown anomaly alerting (spec.md §4.6), grounded in the
/// upstream `AlertConfigService`'s get-or-create-default config pattern and
/// the teacher's reqwest usage for outbound HTTP.
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use crate::backend::SearchBackend;
use crate::models::AlertConfig;

#[async_trait::async_trait]
pub trait AnomalyCounter: Send + Sync {
    /// Count backend documents with `is_anomaly = true`, `detection_timestamp`
    /// within the window, and `level` in the configured set.
    async fn count_recent_anomalies(
        &self,
        window_hours: i64,
        levels: &[String],
    ) -> anyhow::Result<u64>;
}

/// spec.md §6: the webhook contract is a plain `{"text": "<message>"}` body,
/// not a structured payload — the count/window/threshold/levels are folded
/// into a human-readable sentence instead of separate JSON fields.
#[derive(Serialize)]
struct WebhookPayload {
    text: String,
}

fn format_alert_text(count: u64, window_hours: i64, threshold: u64, levels: &[String]) -> String {
    format!(
        "Anomaly threshold crossed: {count} anomalies in the last {window_hours}h \
         (threshold {threshold}, levels {}).",
        levels.join(", ")
    )
}

pub struct Alerter {
    backend: Arc<dyn SearchBackend>,
    counter: Arc<dyn AnomalyCounter>,
    http_client: reqwest::Client,
}

impl Alerter {
    pub fn new(backend: Arc<dyn SearchBackend>, counter: Arc<dyn AnomalyCounter>) -> Self {
        Self {
            backend,
            counter,
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Ensure a single fixed-id config document exists, seeding it from
    /// `defaults` if the backend has none yet.
    pub async fn ensure_config(&self, defaults: AlertConfig) -> anyhow::Result<AlertConfig> {
        match self.backend.load_alert_config().await? {
            Some(config) => Ok(config),
            None => {
                self.backend.save_alert_config(&defaults).await?;
                tracing::info!("created default alert config");
                Ok(defaults)
            }
        }
    }

    /// Run at the end of every tick.
    pub async fn check(&self) -> anyhow::Result<()> {
        let mut config = match self.backend.load_alert_config().await? {
            Some(config) => config,
            None => {
                tracing::warn!("no alert config found, skipping alert check");
                return Ok(());
            }
        };

        let count = self
            .counter
            .count_recent_anomalies(config.window_hours, &config.levels)
            .await?;

        if count < config.threshold {
            return Ok(());
        }

        let elapsed_ok = match config.last_alert_time {
            None => true,
            Some(last) => (Utc::now() - last).num_seconds() >= config.cooldown_seconds,
        };

        if !elapsed_ok {
            return Ok(());
        }

        if config.webhook_url.is_empty() {
            tracing::warn!(count, threshold = config.threshold, "anomaly threshold reached but no webhook_url configured");
            return Ok(());
        }

        let payload = WebhookPayload {
            text: format_alert_text(count, config.window_hours, config.threshold, &config.levels),
        };

        match self.http_client.post(&config.webhook_url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                config.last_alert_time = Some(Utc::now());
                self.backend.save_alert_config(&config).await?;
                tracing::info!(count, "anomaly alert webhook delivered");
            }
            Ok(response) => {
                tracing::error!(status = %response.status(), "anomaly alert webhook rejected, will retry next tick once cooldown allows");
            }
            Err(err) => {
                tracing::error!(error = %err, "anomaly alert webhook delivery failed, will retry next tick once cooldown allows");
            }
        }

        Ok(())
    }
}
