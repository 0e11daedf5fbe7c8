//! ormrepo HTTP/JSON gateway binary.

use std::sync::Arc;

use clap::Parser;
use ormrepo_gateway::{create_router, seed_members, AppState, Args, GatewayConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ormrepo_gateway=info,tower_http=debug".into()),
        )
        .init();

    // Parse command line args
    let args = Args::parse();
    let config = GatewayConfig::from(&args);

    info!(
        listen = %config.listen_addr,
        data = %config.data_path.display(),
        temporary = config.temporary,
        "Starting ormrepo gateway"
    );

    if config.default_page_size > config.max_page_size {
        anyhow::bail!("default_page_size cannot exceed max_page_size");
    }

    let state = AppState::open(config.clone())?;

    let factory = Arc::clone(&state.factory);
    let seed = config.seed;
    let seeded = tokio::task::spawn_blocking(move || seed_members(&factory, seed)).await??;
    if seeded == 0 {
        info!("seeding skipped");
    }

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Gateway listening on {}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
