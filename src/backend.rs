/// Abstraction over the log/template store (spec.md §6: "any engine
/// providing paginated sorted reads and upsert writes"). The only concrete
/// implementation is ClickHouse, reusing the teacher's row types and HTTP
/// insert path, but the Scheduler and Clusterer only ever see [`SearchBackend`].
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Client;
use serde::{Deserialize, Serialize};

use crate::models::{AlertConfig, Cursor, EventTemplate, LogRecord, SortKey};

/// One page of log records plus the cursor to resume from on the next call.
#[derive(Debug, Clone)]
pub struct LogBatch {
    pub logs: Vec<LogRecord>,
    pub next_cursor: Cursor,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Read up to `batch_size` log records ordered ascending by timestamp,
    /// resuming after `cursor` (spec.md §4.1's `search_after` semantics).
    async fn read_logs(&self, cursor: &Cursor, batch_size: usize) -> anyhow::Result<LogBatch>;

    /// Upsert the classification result (`event_id`, `is_anomaly`,
    /// `detection_timestamp`) for each record, keyed by its existing id.
    async fn write_back(&self, logs: &[LogRecord]) -> anyhow::Result<()>;

    /// Load the full template catalog, in append order.
    async fn load_templates(&self) -> anyhow::Result<Vec<EventTemplate>>;

    /// Upsert templates, keyed by `event_id`.
    async fn save_templates(&self, templates: &[EventTemplate]) -> anyhow::Result<()>;

    /// Load the single fixed-id alert configuration document, if it exists.
    async fn load_alert_config(&self) -> anyhow::Result<Option<AlertConfig>>;

    /// Upsert the single fixed-id alert configuration document.
    async fn save_alert_config(&self, config: &AlertConfig) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Deserialize, clickhouse::Row)]
struct LogRow {
    id: String,
    timestamp: DateTime<Utc>,
    level: String,
    component: String,
    content: String,
    application: String,
    source_file: String,
    raw_log: String,
    event_id: String,
    is_anomaly: u8,
    detection_timestamp: Option<DateTime<Utc>>,
}

impl From<LogRow> for LogRecord {
    fn from(row: LogRow) -> Self {
        LogRecord {
            id: row.id,
            timestamp: row.timestamp,
            level: row.level,
            component: row.component,
            content: row.content,
            application: none_if_empty(row.application),
            source_file: none_if_empty(row.source_file),
            raw_log: none_if_empty(row.raw_log),
            event_id: none_if_empty(row.event_id),
            is_anomaly: row.is_anomaly != 0,
            detection_timestamp: row.detection_timestamp,
            llm_analysis: None,
        }
    }
}

fn none_if_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

#[derive(Debug, Clone, Serialize, clickhouse::Row)]
struct TemplateRow {
    event_id: String,
    template: String,
    is_abnormal: u8,
}

impl From<&EventTemplate> for TemplateRow {
    fn from(t: &EventTemplate) -> Self {
        TemplateRow {
            event_id: t.event_id.clone(),
            template: t.template.clone(),
            is_abnormal: t.is_abnormal as u8,
        }
    }
}

#[derive(Debug, Clone, Deserialize, clickhouse::Row)]
struct TemplateReadRow {
    event_id: String,
    template: String,
    is_abnormal: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, clickhouse::Row)]
struct AlertConfigRow {
    window_hours: i64,
    threshold: u64,
    levels: Vec<String>,
    cooldown_seconds: i64,
    webhook_url: String,
    last_alert_time: Option<DateTime<Utc>>,
}

impl From<&AlertConfig> for AlertConfigRow {
    fn from(c: &AlertConfig) -> Self {
        AlertConfigRow {
            window_hours: c.window_hours,
            threshold: c.threshold,
            levels: c.levels.clone(),
            cooldown_seconds: c.cooldown_seconds,
            webhook_url: c.webhook_url.clone(),
            last_alert_time: c.last_alert_time,
        }
    }
}

impl From<AlertConfigRow> for AlertConfig {
    fn from(r: AlertConfigRow) -> Self {
        AlertConfig {
            window_hours: r.window_hours,
            threshold: r.threshold,
            levels: r.levels,
            cooldown_seconds: r.cooldown_seconds,
            webhook_url: r.webhook_url,
            last_alert_time: r.last_alert_time,
        }
    }
}

/// ClickHouse-backed implementation of [`SearchBackend`].
///
/// Timestamp pagination stands in for Elasticsearch's `search_after`:
/// ClickHouse has no native cursor concept, so the cursor carries the last
/// row's `(timestamp, id)` pair and the next query filters strictly past it,
/// tie-broken by id to stay deterministic when several rows share a
/// timestamp.
pub struct ClickHouseBackend {
    client: Client,
    log_table: String,
    templates_table: String,
    alert_config_table: String,
}

impl ClickHouseBackend {
    pub fn new(
        url: &str,
        user: Option<&str>,
        password: Option<&str>,
        database: &str,
        log_table: impl Into<String>,
        templates_table: impl Into<String>,
        alert_config_table: impl Into<String>,
    ) -> Self {
        let mut client = Client::default().with_url(url).with_database(database);
        if let Some(user) = user {
            client = client.with_user(user);
        }
        if let Some(password) = password {
            client = client.with_password(password);
        }
        Self {
            client,
            log_table: log_table.into(),
            templates_table: templates_table.into(),
            alert_config_table: alert_config_table.into(),
        }
    }

    fn cursor_parts(cursor: &Cursor) -> Option<(String, String)> {
        match &cursor.last_sort_value {
            Some(SortKey::Tuple(parts)) if parts.len() == 2 => {
                let ts = parts[0].as_str()?.to_string();
                let id = parts[1].as_str()?.to_string();
                Some((ts, id))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl SearchBackend for ClickHouseBackend {
    async fn read_logs(&self, cursor: &Cursor, batch_size: usize) -> anyhow::Result<LogBatch> {
        let cursor_parts = Self::cursor_parts(cursor);
        let rows: Vec<LogRow> = if let Some((ts, id)) = cursor_parts {
            let sql = format!(
                "SELECT id, timestamp, level, component, content, application, \
                 source_file, raw_log, event_id, is_anomaly, detection_timestamp FROM {} \
                 WHERE (timestamp, id) > (parseDateTime64BestEffort(?), ?) \
                 ORDER BY timestamp ASC, id ASC LIMIT ?",
                self.log_table
            );
            self.client
                .query(&sql)
                .bind(ts)
                .bind(id)
                .bind(batch_size as u64)
                .fetch_all::<LogRow>()
                .await?
        } else {
            let sql = format!(
                "SELECT id, timestamp, level, component, content, application, \
                 source_file, raw_log, event_id, is_anomaly, detection_timestamp FROM {} \
                 ORDER BY timestamp ASC, id ASC LIMIT ?",
                self.log_table
            );
            self.client
                .query(&sql)
                .bind(batch_size as u64)
                .fetch_all::<LogRow>()
                .await?
        };
        let next_cursor = match rows.last() {
            Some(last) => Cursor {
                last_sort_value: Some(SortKey::Tuple(vec![
                    serde_json::Value::String(
                        last.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                    ),
                    serde_json::Value::String(last.id.clone()),
                ])),
            },
            None => cursor.clone(),
        };

        Ok(LogBatch {
            logs: rows.into_iter().map(LogRecord::from).collect(),
            next_cursor,
        })
    }

    async fn write_back(&self, logs: &[LogRecord]) -> anyhow::Result<()> {
        if logs.is_empty() {
            return Ok(());
        }
        // ClickHouse has no row-level UPDATE in the MergeTree family used
        // here; a ReplacingMergeTree keyed on `id` makes re-inserting the
        // classified rows an effective upsert, matching
        // `doc_as_upsert: true` in the upstream bulk helper.
        let mut insert = self.client.insert(&self.log_table)?;
        for log in logs {
            let row = LogRow {
                id: log.id.clone(),
                timestamp: log.timestamp,
                level: log.level.clone(),
                component: log.component.clone(),
                content: log.content.clone(),
                application: log.application.clone().unwrap_or_default(),
                source_file: log.source_file.clone().unwrap_or_default(),
                raw_log: log.raw_log.clone().unwrap_or_default(),
                event_id: log.event_id.clone().unwrap_or_default(),
                is_anomaly: log.is_anomaly as u8,
                detection_timestamp: log.detection_timestamp,
            };
            insert.write(&row).await?;
        }
        insert.end().await?;
        Ok(())
    }

    async fn load_templates(&self) -> anyhow::Result<Vec<EventTemplate>> {
        let rows = self
            .client
            .query(&format!(
                "SELECT event_id, template, is_abnormal FROM {} ORDER BY event_id",
                self.templates_table
            ))
            .fetch_all::<TemplateReadRow>()
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| EventTemplate::new(r.event_id, r.template).with_abnormal(r.is_abnormal != 0))
            .collect())
    }

    async fn save_templates(&self, templates: &[EventTemplate]) -> anyhow::Result<()> {
        if templates.is_empty() {
            return Ok(());
        }
        let mut insert = self.client.insert(&self.templates_table)?;
        for t in templates {
            insert.write(&TemplateRow::from(t)).await?;
        }
        insert.end().await?;
        Ok(())
    }

    async fn load_alert_config(&self) -> anyhow::Result<Option<AlertConfig>> {
        let rows = self
            .client
            .query(&format!(
                "SELECT window_hours, threshold, levels, cooldown_seconds, webhook_url, \
                 last_alert_time FROM {} LIMIT 1",
                self.alert_config_table
            ))
            .fetch_all::<AlertConfigRow>()
            .await?;

        Ok(rows.into_iter().next().map(AlertConfig::from))
    }

    async fn save_alert_config(&self, config: &AlertConfig) -> anyhow::Result<()> {
        let mut insert = self.client.insert(&self.alert_config_table)?;
        insert.write(&AlertConfigRow::from(config)).await?;
        insert.end().await?;
        Ok(())
    }
}

/// ClickHouse-backed implementation of [`crate::alerter::AnomalyCounter`].
/// Kept separate from [`ClickHouseBackend`]'s `SearchBackend` impl so the
/// Alerter can be exercised in tests against a fake counter independent of
/// the backend's read/write surface.
pub struct ClickHouseAnomalyCounter {
    client: Client,
    log_table: String,
}

impl ClickHouseAnomalyCounter {
    pub fn new(url: &str, user: Option<&str>, password: Option<&str>, database: &str, log_table: impl Into<String>) -> Self {
        let mut client = Client::default().with_url(url).with_database(database);
        if let Some(user) = user {
            client = client.with_user(user);
        }
        if let Some(password) = password {
            client = client.with_password(password);
        }
        Self {
            client,
            log_table: log_table.into(),
        }
    }
}

#[derive(Debug, Deserialize, clickhouse::Row)]
struct CountRow {
    total: u64,
}

#[async_trait]
impl crate::alerter::AnomalyCounter for ClickHouseAnomalyCounter {
    async fn count_recent_anomalies(&self, window_hours: i64, levels: &[String]) -> anyhow::Result<u64> {
        let window_start = Utc::now() - chrono::Duration::hours(window_hours);
        let sql = format!(
            "SELECT count() as total FROM {} WHERE is_anomaly = 1 \
             AND detection_timestamp >= parseDateTime64BestEffort(?) AND level IN ?",
            self.log_table
        );
        let row = self
            .client
            .query(&sql)
            .bind(window_start.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            .bind(levels)
            .fetch_one::<CountRow>()
            .await?;
        Ok(row.total)
    }
}
