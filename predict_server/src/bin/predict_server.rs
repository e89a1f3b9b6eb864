//! Predict server binary.
//!
use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use clap::Parser;
use env_logger::TimestampPrecision;
use predict_server::{config::Config, endpoints::router, meter::spawn_meter_logger};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let state = Arc::new(config.app_state()?);
    log::info!(
        "Serving model {} from {}",
        state.registry.model_id(),
        state.registry.store_dir().display()
    );

    if config.preload {
        state.registry.get().await?;
    }

    spawn_meter_logger(Duration::from_secs(config.meter_interval_secs.max(1)));

    // Build HTTP server with endpoints
    let app = router(state, config.max_body_bytes);

    // Serve HTTP server
    let addr: SocketAddr = config.server_address.parse()?;
    log::info!("Listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            log::info!("Shutting down");
        })
        .await?;

    Ok(())
}
