use anyhow::Result;
use clap::Parser;
use parley::error::ParleyError;
use parley::session::CoordinatorConfig;
use parley::transcribe::{JsonDocumentStore, NatsTranscriptionProvider};
use parley::{create_router, AppState, Config, IntakePipeline, SessionCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "parley", about = "Real-time meeting transcription coordinator")]
struct Cli {
    /// Path to the configuration file, without extension
    #[arg(long, default_value = "config/parley")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v0.1.0", cfg.service.name);

    let intake = IntakePipeline::new(cfg.audio.clone())?;
    let provider = Arc::new(NatsTranscriptionProvider::connect(&cfg.nats.url).await?);
    let store = Arc::new(JsonDocumentStore::new(&cfg.store.path)?);

    let coordinator_config = CoordinatorConfig {
        liveness_interval: Duration::from_secs(cfg.liveness.interval_secs),
        shutdown_grace: Duration::from_secs(cfg.shutdown.grace_secs),
        processing_timeout: Duration::from_secs(cfg.audio.processing_timeout_secs),
        ..CoordinatorConfig::default()
    };

    let coordinator = SessionCoordinator::new(coordinator_config, intake, provider, store);
    coordinator.start_background(cfg.retention.clone()).await;

    let state = AppState::new(Arc::clone(&coordinator));
    let app = create_router(state);

    // Binding the real-time listener is the only failure allowed to abort
    // the process.
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ParleyError::ListenerBind {
            addr: addr.clone(),
            message: e.to_string(),
        })?;

    info!("Listening on {}", addr);

    let drain = Arc::clone(&coordinator);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received ctrl-c, draining");
            drain.shutdown().await;
        })
        .await?;

    Ok(())
}
