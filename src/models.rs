/// Core data model for the log ingestion and classification pipeline.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event ids seeded as abnormal at bootstrap (spec.md Data Model, §3).
pub const SEED_ABNORMAL_EVENT_IDS: &[&str] = &["E34", "E40", "E42", "E44", "E28", "E31"];

/// Reserved id for the "too generic to classify" bucket.
pub const UNCLASSIFIABLE_EVENT_ID: &str = "E0";

/// A single log record as it arrives from the upstream field-splitting
/// ingestion layer, enriched in place by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub component: String,
    pub content: String,
    pub application: Option<String>,
    pub source_file: Option<String>,
    pub raw_log: Option<String>,
    pub event_id: Option<String>,
    #[serde(default)]
    pub is_anomaly: bool,
    pub detection_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_analysis: Option<serde_json::Value>,
}

impl LogRecord {
    pub fn mark_unknown(&mut self) {
        self.is_anomaly = true;
        self.event_id = None;
    }

    pub fn mark_matched(&mut self, event_id: &str, is_abnormal: bool) {
        self.event_id = Some(event_id.to_string());
        self.is_anomaly = is_abnormal;
    }
}

/// A parametric event template: literal tokens interleaved with `<*>`
/// wildcard placeholders, plus whether matches against it count as
/// anomalies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventTemplate {
    pub event_id: String,
    pub template: String,
    pub is_abnormal: bool,
}

impl EventTemplate {
    pub fn new(event_id: impl Into<String>, template: impl Into<String>) -> Self {
        let event_id = event_id.into();
        let is_abnormal = SEED_ABNORMAL_EVENT_IDS.contains(&event_id.as_str());
        Self {
            event_id,
            template: template.into(),
            is_abnormal,
        }
    }

    pub fn with_abnormal(mut self, is_abnormal: bool) -> Self {
        self.is_abnormal = is_abnormal || SEED_ABNORMAL_EVENT_IDS.contains(&self.event_id.as_str());
        self
    }
}

/// Opaque ordered key returned by the backend alongside the last record of
/// a batch; persisted between ticks so reads resume where they left off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortKey {
    Scalar(serde_json::Value),
    Tuple(Vec<serde_json::Value>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursor {
    pub last_sort_value: Option<SortKey>,
}

impl Cursor {
    pub fn none() -> Self {
        Self {
            last_sort_value: None,
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::none()
    }
}

/// Alert throttling configuration, stored as a single fixed-id document in
/// the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub window_hours: i64,
    pub threshold: u64,
    pub levels: Vec<String>,
    pub cooldown_seconds: i64,
    pub webhook_url: String,
    pub last_alert_time: Option<DateTime<Utc>>,
}
