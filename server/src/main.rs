mod composio;
mod db_core;
mod email;
mod error;
mod model;
mod request_tracing;
mod routes;
mod server_config;
#[cfg(test)]
mod testing;
mod util;

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{extract::FromRef, Router};
use composio::{ComposioClient, ConnectorApi};
use mimalloc::MiMalloc;
use routes::AppRouter;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use server_config::{cfg, Settings};
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;
pub type Connector = Arc<dyn ConnectorApi>;

#[derive(Clone, FromRef)]
struct ServerState {
    conn: DatabaseConnection,
    connector: Connector,
    settings: Arc<Settings>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let db_url = env::var("DATABASE_URL").context("DATABASE_URL is not set in .env file")?;
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);

    let conn = Database::connect(db_options)
        .await
        .context("Database connection failed")?;
    db_core::schema::create_tables(&conn)
        .await
        .context("Failed to create tables")?;

    // check config
    println!("{}", *cfg);

    let http_client = reqwest::ClientBuilder::new()
        .use_rustls_tls()
        .timeout(Duration::from_secs(cfg.composio.timeout_secs))
        .build()?;
    let connector: Connector = Arc::new(ComposioClient::new(
        http_client,
        cfg.api_key.clone(),
        cfg.composio.clone(),
    ));

    let state = ServerState {
        conn,
        connector,
        settings: Arc::new(cfg.settings.clone()),
    };

    let router = AppRouter::create(state);
    run_server(router).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}

async fn run_server(router: Router) -> anyhow::Result<()> {
    let port = env::var("PORT")
        .unwrap_or("5006".to_string())
        .parse::<u16>()
        .context("PORT must be a valid port number")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Inbox server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shut down");
    Ok(())
}
