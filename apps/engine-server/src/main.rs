//! Process entry point: load configuration, build the module registry,
//! run the boot sequence, serve HTTP, and drain on shutdown signal.

use std::sync::Arc;

use clap::Parser;
use engine_http::rate_limit::RateLimiterLayer;
use engine_http::status::Uptime;
use engine_kit::{Engine, EngineConfig};
use engine_stores::Stores;
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Service engine core: module registry, dispatcher, account fabric,
/// event bus, and HTTP surface in one process.
#[derive(Parser, Debug)]
#[command(name = "engine-server")]
struct Cli {
    /// Override the `PORT` environment variable.
    #[arg(long)]
    port: Option<u16>,
}

fn init_logging() {
    let dev_mode = std::env::var("DEV").is_ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if dev_mode {
        builder.pretty().init();
    } else {
        builder.json().init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        #[allow(clippy::expect_used)]
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[allow(clippy::expect_used)]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    let config = Arc::new(config);

    let stores = Arc::new(Stores::in_memory());

    let engine = Arc::new(Engine::new(
        vec![
            accounts::descriptor(),
            oracle::descriptor(),
            eventbus::descriptor(),
            system_status::descriptor(),
        ],
        Arc::clone(&stores),
        Arc::clone(&config),
    )?);

    engine.start().await?;
    tracing::info!(port = config.port, "engine started");

    let module_routes = engine.router().await.unwrap_or_default();
    let app = engine_http::wrap_router(
        module_routes,
        Arc::clone(&config),
        Arc::clone(&engine),
        Uptime::start_now(),
        RateLimiterLayer::new(100, 200),
    );

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown signal received, draining modules");
    if tokio::time::timeout(config.shutdown_drain_timeout, engine.stop()).await.is_err() {
        tracing::warn!("module shutdown exceeded drain timeout, exiting anyway");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn port_flag_parses() {
        let cli = Cli::parse_from(["engine-server", "--port", "9001"]);
        assert_eq!(cli.port, Some(9001));
    }

    #[test]
    fn port_flag_is_optional() {
        let cli = Cli::parse_from(["engine-server"]);
        assert_eq!(cli.port, None);
    }
}
