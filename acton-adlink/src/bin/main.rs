//! acton-adlink server

use acton_adlink::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    acton_adlink::observability::init()?;

    let config = AdlinkConfig::load_for_service("acton-adlink")?;
    let bind_addr = config.server.bind_addr.clone();

    let state = AppState::connect(config).await?;
    let app = acton_adlink::routes::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
