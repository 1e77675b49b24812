//! # duplex-server
//!
//! Real-time presence and message-delivery server for Duplex, a
//! two-person direct-messaging application.
//!
//! This binary provides:
//! - **WebSocket gateway** that binds pre-authenticated identities to live
//!   connections
//! - **Presence registry** broadcasting the online set on every change
//! - **Message store** (SQLite) with live push to online recipients and
//!   seen/unseen tracking
//! - **REST API** (axum) for submitting messages, fetching conversations,
//!   and marking them seen

mod api;
mod config;
mod delivery;
mod error;
mod gateway;
mod presence;

use std::sync::{Arc, Mutex};

use tracing::info;
use tracing_subscriber::EnvFilter;

use duplex_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::delivery::Delivery;
use crate::presence::PresenceRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,duplex_server=debug")),
        )
        .init();

    info!("Starting Duplex server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Message store (runs migrations on open).
    let store = Arc::new(Mutex::new(Database::open_at(&config.db_path)?));

    // Presence registry: always starts empty; connections re-register
    // after a restart.
    let presence = Arc::new(PresenceRegistry::new());

    let delivery = Arc::new(Delivery::new(store.clone(), presence.clone()));

    let http_addr = config.http_addr;
    let app_state = AppState {
        store,
        presence,
        delivery,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
