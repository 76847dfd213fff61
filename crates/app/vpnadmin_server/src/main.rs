//! vpnadmin HTTP server binary.
//!
//! Loads configuration from the environment (and `.env`), runs database
//! migrations, then serves the admin API until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vpnadmin_api::AppState;
use vpnadmin_api::config::ApiConfig;
use vpnadmin_core::auth::blacklist::SWEEP_INTERVAL;
use vpnadmin_core::store::PgUserStore;

/// CLI arguments; each falls back to the matching environment variable.
#[derive(Parser, Debug)]
#[command(name = "vpnadmin_server", about = "vpnadmin API server")]
struct Args {
    /// Address to listen on, e.g. `0.0.0.0:8080`.
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,vpnadmin_api=debug,vpnadmin_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(url) = args.database_url {
        config.pg_connection_url = url;
    }

    if config.vpn_token.is_none() {
        warn!("VPN_TOKEN not set; /vpn-auth/authenticate will answer 503");
    }
    if config.vpn_network.is_none() {
        warn!("VPN_NETWORK not set; VPN address allocation is disabled");
    }

    info!(
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        "starting vpnadmin_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    info!("running database migrations");
    vpnadmin_core::migrate::migrate(&pool).await?;

    let store = Arc::new(PgUserStore::new(pool));
    let state = AppState::new(config.clone(), store);

    let shutdown = CancellationToken::new();
    let mut sweepers = vec![state.rate_limiter.spawn_sweeper(shutdown.clone())];
    if let Some(blacklist) = &state.blacklist {
        sweepers.push(blacklist.spawn_sweeper(SWEEP_INTERVAL, shutdown.clone()));
    }

    let app = vpnadmin_api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let serve_result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    shutdown.cancel();
    for handle in sweepers {
        let _ = handle.await;
    }
    info!("server stopped");

    serve_result?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
