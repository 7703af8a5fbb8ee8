use anyhow::Context;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use showtime_booking::{
    config::{Config, LogFormat},
    controllers,
    services::CleanupService,
    AppState,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;

    let registry = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.app.rust_log));
    match config.app.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    info!(
        environment = %config.app.environment,
        backend = ?config.database.backend,
        "Starting showtime booking API"
    );

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("HOST/PORT do not form a socket address")?;
    let sweep_every = Duration::from_secs(config.booking.sweep_interval_secs);

    // Create the shared application state
    let app_state = AppState::new(config).await?;

    // --- Start background tasks ---

    // Expired seat lock sweep
    let cleanup = CleanupService::new(app_state.clone());
    task::spawn(cleanup.run_forever(sweep_every));

    // --- Start the web server ---

    let app = controllers::app(app_state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.viewers.shutdown_all();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
