/// Log classification and anomaly detection service.
///
/// Runs the Scheduler as a background worker ticking over the configured
/// backend, alongside a read-mostly HTTP query API.
use std::sync::Arc;
use std::time::Duration;

use log_analyzer::alerter::Alerter;
use log_analyzer::api::{self, ApiState};
use log_analyzer::backend::{ClickHouseAnomalyCounter, ClickHouseBackend, SearchBackend};
use log_analyzer::config::Config;
use log_analyzer::cursor_reader::CursorStore;
use log_analyzer::llm_analyzer::LlmAnalyzer;
use log_analyzer::matcher::Matcher;
use log_analyzer::scheduler::Scheduler;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt().with_target(false).with_thread_ids(true).init();

    info!("Starting log classification and anomaly detection service");

    let config = Config::from_env().map_err(|err| anyhow::anyhow!(err))?;
    config.log_config();

    let backend: Arc<dyn SearchBackend> = Arc::new(ClickHouseBackend::new(
        &config.clickhouse_url,
        config.clickhouse_user.as_deref(),
        config.clickhouse_password.as_deref(),
        &config.clickhouse_database,
        format!("{}-logs", config.log_index_prefix),
        config.templates_index.clone(),
        "alert_config",
    ));

    let anomaly_counter = Arc::new(ClickHouseAnomalyCounter::new(
        &config.clickhouse_url,
        config.clickhouse_user.as_deref(),
        config.clickhouse_password.as_deref(),
        &config.clickhouse_database,
        format!("{}-logs", config.log_index_prefix),
    ));

    let templates = backend.load_templates().await.unwrap_or_else(|err| {
        tracing::warn!(error = %err, "could not load templates at startup, starting with an empty catalog");
        Vec::new()
    });
    info!("loaded {} templates", templates.len());
    let matcher = Arc::new(Matcher::with_templates(templates));

    let cursor_store = Arc::new(
        CursorStore::load(
            config.cursor_file.clone(),
            Duration::from_secs(config.cursor_flush_interval_secs),
        )
        .await,
    );

    let alerter = Alerter::new(backend.clone(), anomaly_counter);
    alerter.ensure_config(config.default_alert_config()).await?;

    let scheduler = Arc::new(Scheduler::new(
        backend.clone(),
        cursor_store,
        matcher,
        alerter,
        Duration::from_secs(config.tick_interval_secs),
    ));

    let shutdown = CancellationToken::new();
    let scheduler_shutdown = shutdown.clone();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(scheduler_shutdown).await;
    });

    let llm_analyzer = Arc::new(LlmAnalyzer::new(
        "http://localhost:11434/api/generate",
        config.llm_model.clone(),
        config.llm_api_key.clone(),
    ));

    let api_state = ApiState { backend, llm_analyzer };
    let app = api::router(api_state);

    let addr = format!("0.0.0.0:{}", config.ingest_port);
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
            server_shutdown.cancel();
        })
        .await?;

    scheduler_handle.await?;
    Ok(())
}
