//! cipher-relay binary entry point.
//!
//! Usage:
//! ```bash
//! cipher-relay --config relay.toml
//! RELAY_BIND_ADDR=0.0.0.0:9000 cipher-relay
//! ```

use anyhow::Context;
use cipher_relay::config::Config;
use cipher_relay::dispatch::Dispatcher;
use cipher_relay::http;
use cipher_relay::server::Relay;
use cipher_relay::store::SqliteStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config().context("failed to load configuration")?;

    let store = SqliteStore::new(&config.store.database)
        .await
        .with_context(|| {
            format!(
                "failed to open offline store at {}",
                config.store.database.display()
            )
        })?;

    let bind_address = config.server.bind_address.clone();
    let (relay, dispatch_rx) = Relay::new(config, Arc::new(store));
    tokio::spawn(Dispatcher::new(relay.clone(), dispatch_rx).run());

    http::health::init_start_time();
    let app = http::build_router(relay);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    tracing::info!(
        "cipher-relay v{} listening on {bind_address}",
        env!("CARGO_PKG_VERSION")
    );

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

/// Resolve configuration: explicit `--config` path, else `relay.toml` if it
/// exists, else defaults; environment overrides applied last.
fn load_config() -> anyhow::Result<Config> {
    let mut config = match config_path_arg() {
        Some(path) => Config::from_file(&path)?,
        None => {
            let default = PathBuf::from("relay.toml");
            if default.exists() {
                Config::from_file(&default)?
            } else {
                Config::default()
            }
        }
    };
    config.apply_env();
    Ok(config)
}

fn config_path_arg() -> Option<PathBuf> {
    std::env::args()
        .skip_while(|arg| arg != "--config")
        .nth(1)
        .map(PathBuf::from)
}
