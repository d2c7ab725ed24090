use std::env;

/// Process-wide configuration, loaded once at startup from the environment
/// (see spec.md §6 "Configuration").
#[derive(Debug, Clone)]
pub struct Config {
    // Backend (ClickHouse stands in for "any search-engine backend").
    pub clickhouse_url: String,
    pub clickhouse_user: Option<String>,
    pub clickhouse_password: Option<String>,
    pub clickhouse_database: String,

    pub log_index_prefix: String,
    pub templates_index: String,
    pub cursor_file: String,

    pub tick_interval_secs: u64,
    pub cursor_flush_interval_secs: u64,

    // Alerting
    pub webhook_url: String,
    pub alert_window_hours: i64,
    pub alert_threshold: u64,
    pub alert_levels: Vec<String>,
    pub alert_cooldown_seconds: i64,

    // LLM (passed through to the out-of-scope analyzer only, never read by
    // the core pipeline).
    pub llm_api_key: String,
    pub llm_model: String,

    pub ingest_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Config {
            clickhouse_url: env::var("CLICKHOUSE_URL")
                .map_err(|_| "CLICKHOUSE_URL environment variable is required")?,
            clickhouse_user: env::var("CLICKHOUSE_USER").ok(),
            clickhouse_password: env::var("CLICKHOUSE_PASSWORD").ok(),
            clickhouse_database: env::var("CLICKHOUSE_DATABASE")
                .unwrap_or_else(|_| "default".to_string()),

            log_index_prefix: env::var("LOG_INDEX_PREFIX").unwrap_or_else(|_| "logs".to_string()),
            templates_index: env::var("TEMPLATES_INDEX")
                .unwrap_or_else(|_| "event_templates".to_string()),
            cursor_file: env::var("CURSOR_FILE").unwrap_or_else(|_| "checkpoint.json".to_string()),

            tick_interval_secs: env::var("TICK_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            cursor_flush_interval_secs: env::var("CURSOR_FLUSH_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),

            webhook_url: env::var("SLACK_WEBHOOK_URL").unwrap_or_default(),
            alert_window_hours: env::var("ANOMALY_ALERT_WINDOW_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
            alert_threshold: env::var("ANOMALY_ALERT_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            alert_levels: env::var("ANOMALY_ALERT_LEVELS")
                .unwrap_or_else(|_| "ERROR,WARN".to_string())
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            alert_cooldown_seconds: env::var("ANOMALY_ALERT_COOLDOWN_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),

            llm_api_key: env::var("LLM_API_KEY").unwrap_or_default(),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "llama3".to_string()),

            ingest_port: env::var("INGEST_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3002),
        })
    }

    pub fn log_config(&self) {
        tracing::info!("Configuration:");
        tracing::info!("   ClickHouse URL: {}", self.clickhouse_url);
        tracing::info!("   ClickHouse database: {}", self.clickhouse_database);
        tracing::info!("   Log index prefix: {}-*", self.log_index_prefix);
        tracing::info!("   Templates index: {}", self.templates_index);
        tracing::info!("   Cursor file: {}", self.cursor_file);
        tracing::info!("   Tick interval: {}s", self.tick_interval_secs);
        tracing::info!(
            "   Alerting: threshold={} window={}h cooldown={}s levels={:?}",
            self.alert_threshold,
            self.alert_window_hours,
            self.alert_cooldown_seconds,
            self.alert_levels
        );
    }

    pub fn default_alert_config(&self) -> crate::models::AlertConfig {
        crate::models::AlertConfig {
            window_hours: self.alert_window_hours,
            threshold: self.alert_threshold,
            levels: self.alert_levels.clone(),
            cooldown_seconds: self.alert_cooldown_seconds,
            webhook_url: self.webhook_url.clone(),
            last_alert_time: None,
        }
    }
}
