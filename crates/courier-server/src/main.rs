mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use courier_api::auth::{AppState, AppStateInner};
use courier_gateway::dispatcher::Dispatcher;
use courier_messaging::{MessagingService, ServiceConfig, SqliteDirectory, SqliteStore};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(courier_db::Database::open(&PathBuf::from(&config.db_path))?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let service = MessagingService::new(
        Arc::new(SqliteDirectory::new(db.clone())),
        Arc::new(SqliteStore::new(db)),
        Arc::new(dispatcher.clone()),
        ServiceConfig {
            io_timeout: config.io_timeout,
            public_url: config.public_url.clone(),
        },
    );
    let app_state: AppState = Arc::new(AppStateInner {
        service,
        dispatcher,
        jwt_secret: config.jwt_secret.clone(),
    });

    let app = courier_api::router(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Courier server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
