use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anoviz_server::{handle_websocket, AppState, PostgresWarehouse, ServerConfig};
use axum::{routing::get, Router};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "anoviz-server", about = "Anomaly visualization backend")]
struct Args {
    /// Path to the frontend config file
    #[arg(long, default_value = "frontend_config.json")]
    config: PathBuf,

    /// Override the bind address from the environment
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anoviz_server=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting anomaly visualization backend");

    let mut config = ServerConfig::load(&args.config)?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    info!("Connecting to warehouse...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let addr: SocketAddr = format!("{}:{}", config.bind_addr, config.frontend.port_number).parse()?;

    let state = AppState {
        warehouse: Arc::new(PostgresWarehouse::new(pool)),
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/ws", get(handle_websocket))
        .route("/health", get(health_check))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Listening on {addr}");
    info!("WebSocket endpoint: ws://{addr}/ws");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
