/// Bulk write-back of classified logs and newly-minted templates
/// (spec.md §4.5), grounded in the teacher's `BufferedClickHouseWriter`
/// batching shape and the upstream `save_logs`/`save_new_events` upsert
/// semantics.
use std::sync::Arc;

use crate::backend::SearchBackend;
use crate::models::{EventTemplate, LogRecord};

pub struct Writer {
    backend: Arc<dyn SearchBackend>,
}

impl Writer {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    /// Upsert the classification outcome for every record in the tick's
    /// batch. A no-op on an empty batch, matching the upstream's early
    /// return in `save_logs`.
    pub async fn save_logs(&self, logs: &[LogRecord]) -> anyhow::Result<()> {
        if logs.is_empty() {
            return Ok(());
        }
        self.backend.write_back(logs).await
    }

    /// Persist only the newly-added templates for this tick, not the whole
    /// catalog — the caller already holds the full catalog in memory.
    pub async fn save_templates(&self, new_templates: &[EventTemplate]) -> anyhow::Result<()> {
        if new_templates.is_empty() {
            return Ok(());
        }
        self.backend.save_templates(new_templates).await
    }
}
