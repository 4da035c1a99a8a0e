//! Acquisition and clip production worker binary.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipflow_media::{check_ffmpeg, check_ytdlp, ClipAnalyzer, EffectComposer};
use clipflow_queue::WorkQueue;
use clipflow_storage::{AuditLog, ContentStore, JsonlAuditLog, MemoryStore};
use clipflow_worker::{
    metrics, CaptionService, ClipSelector, Collaborators, ErrorClassifier, FfmpegClipProducer,
    ItemPipeline, JsonFeedSource, LogPublisher, Orchestrator, ResilientDownloader,
    StrategyCascade, WorkerConfig,
};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,clipflow_worker=info,clipflow_media=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting clipflow-worker");

    if let Err(e) = run().await {
        error!("Worker error: {:#}", e);
        std::process::exit(1);
    }

    info!("Worker shutdown complete");
}

async fn run() -> anyhow::Result<()> {
    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        metrics::init_metrics(addr).context("metrics exporter")?;
        info!(%addr, "Prometheus exporter listening");
    }

    if let Err(e) = check_ffmpeg() {
        warn!("{}; clip extraction and effects will degrade", e);
    }
    if let Err(e) = check_ytdlp() {
        warn!("{}; only the HTTP API strategy can acquire media", e);
    }

    let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
    let audit: Arc<dyn AuditLog> =
        Arc::new(JsonlAuditLog::new(config.pipeline.work_dir.join("audit")));

    let classifier = Arc::new(
        ErrorClassifier::new(config.recovery.clone())
            .context("error classifier")?
            .with_audit(Arc::clone(&audit)),
    );

    let manual = config
        .queue
        .open_manual_queue()
        .await
        .context("manual review queue")?;
    let queue = Arc::new(WorkQueue::new(config.queue.capacity));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let cascade =
        StrategyCascade::standard(&config.downloader, &config.ytdlp).context("strategy cascade")?;
    info!(strategies = ?cascade.names(), "Acquisition cascade ready");
    let downloader = Arc::new(
        ResilientDownloader::new(
            config.downloader.clone(),
            cascade,
            Arc::clone(&classifier),
            Arc::clone(&manual),
            Arc::clone(&audit),
        )
        .with_shutdown(shutdown_rx),
    );

    let composer = EffectComposer::new(config.effects.clone(), config.pipeline.edited_dir());
    let producer = Arc::new(FfmpegClipProducer::new(
        config.pipeline.clips_dir(),
        composer,
        config.pipeline.effects.clone(),
    ));
    let pipeline = Arc::new(ItemPipeline::new(
        Arc::clone(&store),
        Arc::clone(&classifier),
        downloader,
        ClipAnalyzer::with_defaults(config.analyzer.clone()),
        config.candidates.clone(),
        ClipSelector::new(config.pipeline.top_k),
        producer,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        config.pipeline.clone(),
        config.publish.clone(),
        Collaborators {
            store,
            source: Arc::new(JsonFeedSource::new(&config.pipeline.feed_path)),
            queue,
            manual,
            classifier,
            pipeline,
            captions: CaptionService::template_only(),
            publisher: Arc::new(LogPublisher::new(&config.publish.log_path)),
        },
        shutdown_tx,
    ));

    // Setup signal handler
    let signal_target = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_target.shutdown();
    });

    Arc::clone(&orchestrator).run().await?;

    match orchestrator.status().await {
        Ok(status) => info!(
            recovery_rate = status.recovery_rate,
            manual_queue = status.manual_queue_size,
            acquired = status.acquisitions.succeeded,
            failed = status.acquisitions.failed,
            "Final status"
        ),
        Err(e) => warn!("Failed to read final status: {}", e),
    }
    Ok(())
}
