/// Timer-driven tick orchestration (spec.md §4.7), grounded in the upstream
/// `AnomalyDetectionScheduler.run`.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::alerter::Alerter;
use crate::backend::SearchBackend;
use crate::clusterer::Clusterer;
use crate::cursor_reader::CursorStore;
use crate::matcher::Matcher;
use crate::writer::Writer;

const READ_BATCH_SIZE: usize = 5000;

pub struct Scheduler {
    backend: Arc<dyn SearchBackend>,
    cursor_store: Arc<CursorStore>,
    matcher: Arc<Matcher>,
    writer: Writer,
    alerter: Alerter,
    tick_interval: Duration,
}

impl Scheduler {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        cursor_store: Arc<CursorStore>,
        matcher: Arc<Matcher>,
        alerter: Alerter,
        tick_interval: Duration,
    ) -> Self {
        Self {
            writer: Writer::new(backend.clone()),
            backend,
            cursor_store,
            matcher,
            alerter,
            tick_interval,
        }
    }

    /// Run ticks forever on a fixed interval until `shutdown` is triggered.
    /// Ticks never overlap: `tokio::time::interval`'s default `Burst`
    /// behavior would otherwise fire immediately again after a slow tick,
    /// so the loop measures elapsed time itself and sleeps the remainder,
    /// matching spec.md §4.7's "no pile-up" requirement.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("scheduler shutting down, flushing cursor");
                    if let Err(err) = self.cursor_store.flush_now().await {
                        tracing::error!(error = %err, "failed to flush cursor on shutdown");
                    }
                    return;
                }
                _ = tokio::time::sleep(self.tick_interval) => {
                    if let Err(err) = self.tick().await {
                        tracing::error!(error = %err, "tick failed, will retry next interval");
                    }
                }
            }
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let now = Utc::now();

        let cursor = self.cursor_store.current().await;
        let batch = match self.backend.read_logs(&cursor, READ_BATCH_SIZE).await {
            Ok(batch) => batch,
            Err(err) => {
                tracing::error!(error = %err, "failed to read logs this tick, cursor unchanged");
                return Ok(());
            }
        };

        if batch.logs.is_empty() {
            return Ok(());
        }

        let mut logs = batch.logs;
        for log in logs.iter_mut() {
            log.detection_timestamp = Some(now);
        }

        let unknown_indices = self.matcher.classify(&mut logs);

        if !unknown_indices.is_empty() {
            let catalog = self.matcher.catalog_snapshot();
            let mut unknown_logs: Vec<_> = unknown_indices.iter().map(|&i| logs[i].clone()).collect();

            let result = Clusterer::cluster_and_generate_templates(&mut unknown_logs, &catalog);

            for (pos, &i) in unknown_indices.iter().enumerate() {
                logs[i] = unknown_logs[pos].clone();
            }

            if !result.newly_added.is_empty() {
                self.matcher.extend(result.newly_added.clone());
                self.writer.save_templates(&result.newly_added).await?;
            }
        }

        self.writer.save_logs(&logs).await?;
        self.cursor_store.advance(batch.next_cursor).await?;

        self.alerter.check().await?;

        tracing::debug!(
            logs = logs.len(),
            anomalies = logs.iter().filter(|l| l.is_anomaly).count(),
            unknown = unknown_indices.len(),
            "tick complete"
        );

        Ok(())
    }
}
