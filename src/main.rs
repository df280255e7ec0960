use anyhow::{Context, Result};
use clap::Parser;
use loqa_callbot::{
    create_router, AppState, AudioWriterPool, Config, HttpNotifier, SessionRegistry,
    SimulatedGateway,
};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "loqa-callbot", version, about = "Joins calls and captures per-speaker audio")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/loqa-callbot")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Loqa Callbot v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Capture root: {}", cfg.capture.root);

    let notifier = Arc::new(HttpNotifier::new(cfg.notifier())?);
    let pool = Arc::new(AudioWriterPool::new(cfg.writer_pool())?);
    let registry = SessionRegistry::new(pool, notifier);

    let gateway = SimulatedGateway::new()
        .with_tone(cfg.gateway.simulated_speakers.clone(), cfg.gateway.frame_ms);
    registry.initialize(Arc::new(gateway));

    let app = create_router(AppState::new(registry.clone()));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    let left = registry.leave_all().await;
    info!("Shutdown complete ({} session(s) closed)", left);

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
