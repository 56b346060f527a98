use quire::{ChromeLauncher, EngineLauncher, Printer, SharedEngine};
use quire_server::{build_router, config::Config, state::AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    tracing::info!("Starting quire server...");

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        "Configuration loaded (browser keepalive {:?}, body limit {} bytes)",
        config.keepalive(),
        config.server.body_limit_bytes
    );

    // The browser itself starts on the first print request
    let launcher: Arc<dyn EngineLauncher> = Arc::new(ChromeLauncher::new(config.chrome()));
    let engine = SharedEngine::new(launcher, config.keepalive());

    let app = build_router(AppState::new(Printer::new(engine.clone()), config.clone()));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("quire listening on {}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  - POST /          (one markup document)");
    tracing::info!("  - POST /url       (newline-separated URLs)");
    tracing::info!("  - POST /multiple  (JSON array of markup documents)");
    tracing::info!("  - GET  /health");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown().await;
    tracing::info!("quire stopped");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown requested"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,quire=debug,quire_engine=debug,quire_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
