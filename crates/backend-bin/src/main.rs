use anyhow::Result;
use campusmeet_backend_lib::{
    config::Settings, handlers::meetings, store::FlatFileStore, ws_router, AppState,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "campusmeet-server", about = "CampusMeet coordination server")]
struct Args {
    /// Path to the configuration file
    #[arg(long, default_value = "campusmeet.toml")]
    config: PathBuf,

    /// Override the configured bind address
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load_from(&args.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    let bind_addr = args.bind.unwrap_or(settings.bind_addr);
    let storage = FlatFileStore::new(&settings.data_dir)?;
    let state = Arc::new(AppState::new(storage, settings));

    let app = meetings::create_router(Arc::clone(&state))
        .merge(ws_router::create_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
