//! ==============================================================================
//! main.rs - growtent host entry point
//! ==============================================================================
//!
//! responsibilities:
//!     - load configuration and set up logging
//!     - load (or seed) both zone logs from the data directory
//!     - serve the api, pages, and live channel
//!     - save every few minutes, and once more on SIGINT/SIGTERM
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                     rust host (this file)                     │
//!     │  ┌─────────────┐  ┌──────────────────┐  ┌─────────────────┐   │
//!     │  │ save timer  │  │ web server       │  │ signal handler  │   │
//!     │  │ (5 min)     │  │ http + websocket │  │ (final save)    │   │
//!     │  └──────┬──────┘  └────────┬─────────┘  └────────┬────────┘   │
//!     │         │                  │                     │            │
//!     │         └──────────────────┼─────────────────────┘            │
//!     │                            │                                  │
//!     │              ┌─────────────┴────────────┐                     │
//!     │              │ store (Arc<Mutex<..>>)   │ -> data/*.json      │
//!     │              └─────────────┬────────────┘                     │
//!     │                            │                                  │
//!     │              ┌─────────────┴────────────┐                     │
//!     │              │ hub (broadcast channel)  │ -> live viewers     │
//!     │              └──────────────────────────┘                     │
//!     └──────────────────────────────────────────────────────────────┘
//!
//! ==============================================================================

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use growtent_host::config::{HostConfig, LoggingConfig};
use growtent_host::hub::BroadcastHub;
use growtent_host::server::{self, AppState, HUB_CAPACITY};
use growtent_host::store;

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration and start logging
    let (mut config, mut source) = HostConfig::load_or_default();
    config.apply_env_overrides(&mut source);
    init_tracing(&config.logging);
    source.report();
    config.log_summary();

    // step 2: load both zones, seeding any that come up empty
    let store = store::open_shared(config.storage.data_dir.clone(), config.store_options())
        .await
        .context("failed to load zone data")?;

    // step 3: background save timer
    tokio::spawn(store::run_persist_timer(store.clone(), config.persist_interval()));

    // step 4: web server
    let mut state = AppState::new(store.clone(), BroadcastHub::new(HUB_CAPACITY));
    state.show_readings = config.logging.show_readings;
    let app = server::router(state, &config.pages.root);

    let address = (config.server.bind_address.as_str(), config.server.port);
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("failed to bind {}:{}", config.server.bind_address, config.server.port))?;
    info!(address = %listener.local_addr()?, "server running on port {}", config.server.port);

    // step 5: serve until a termination signal, then save once more
    server::serve_until(listener, app, store, server::shutdown_signal())
        .await
        .context("web server error")
}

/// `RUST_LOG` wins; otherwise the configured level
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}
